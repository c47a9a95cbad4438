use nix::sys::signal::{Signal, kill};
use nix::unistd::{Pid, Uid, User, getuid};
use procfs::ProcError;
use procfs::process::Process;

use crate::discovery::ProcessEntry;
use crate::error::{DiscoveryError, Error};

/// Signal requesting an agent in listen mode to connect.
const ATTACH_SIGNAL: Signal = Signal::SIGUSR2;

/// Returns the real user ID of the current process.
pub fn current_uid() -> u32 {
    getuid().as_raw()
}

/// Returns the name of the given user, or its ID if unknown.
pub fn user_name(uid: u32) -> String {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

/// Reads the process table from `/proc`.
pub fn process_table() -> Result<Vec<ProcessEntry>, DiscoveryError> {
    let processes = procfs::process::all_processes()
        .map_err(|e| DiscoveryError::Enumerate(std::io::Error::other(e)))?;

    let entries = processes
        .filter_map(|process| match process.and_then(|p| read_entry(&p)) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable process");
                None
            }
        })
        .collect();

    Ok(entries)
}

fn read_entry(process: &Process) -> procfs::ProcResult<ProcessEntry> {
    let stat = process.stat()?;

    Ok(ProcessEntry {
        pid: process.pid as u32,
        ppid: stat.ppid.max(0) as u32,
        uid: process.uid()?,
        name: stat.comm,
        // kernel threads and zombies have no command line
        cmdline: process.cmdline().unwrap_or_default(),
    })
}

/// Checks that `pid` can be asked to load its agent.
///
/// The process must exist, be owned by the caller, and handle the attach
/// signal (which would kill it otherwise).
pub fn check_attachable(pid: u32) -> crate::Result<()> {
    let not_found = |e: ProcError| match e {
        ProcError::NotFound(_) => Error::ProcessNotFound(pid),
        e => Error::Io(std::io::Error::other(e)),
    };

    let process = Process::new(pid as i32).map_err(not_found)?;

    let owner = process.uid().map_err(not_found)?;
    if owner != current_uid() {
        return Err(Error::NotOwned { pid, owner });
    }

    let status = process.status().map_err(not_found)?;
    let mask = 1u64 << (ATTACH_SIGNAL as i32 - 1);

    if status.sigcgt & mask == 0 {
        return Err(Error::Refused {
            pid,
            reason: "no agent listening for attach requests",
        });
    }

    Ok(())
}

/// Asks the agent of `pid` to connect to its attach socket.
pub fn request_attach(pid: u32) -> crate::Result<()> {
    kill(Pid::from_raw(pid as i32), ATTACH_SIGNAL).map_err(|e| match e {
        nix::Error::ESRCH => Error::ProcessNotFound(pid),
        e => Error::Os(e),
    })
}
