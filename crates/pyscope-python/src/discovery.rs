use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::DiscoveryError;
use crate::sys;

/// Process, as read from the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Process ID.
    pub pid: u32,

    /// Parent process ID (0 when none).
    pub ppid: u32,

    /// Real user ID.
    pub uid: u32,

    /// Short name of the process.
    pub name: String,

    /// Command line (empty for kernel threads and zombies).
    pub cmdline: Vec<String>,
}

/// Snapshot of the process table, in enumeration order.
#[derive(Debug, Clone, Default)]
pub struct ProcessTable {
    entries: Vec<ProcessEntry>,
    index: HashMap<u32, usize>,
}

impl ProcessTable {
    /// Creates a table from the given entries.
    pub fn new(entries: Vec<ProcessEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.pid, i))
            .collect();

        Self { entries, index }
    }

    /// Reads the process table of the host.
    ///
    /// Processes which cannot be read (e.g., because they exited during the
    /// scan) are skipped.
    pub fn snapshot() -> Result<Self, DiscoveryError> {
        sys::process_table().map(Self::new)
    }

    /// Returns the entry of the given process.
    pub fn get(&self, pid: u32) -> Option<&ProcessEntry> {
        self.index.get(&pid).map(|&i| &self.entries[i])
    }

    /// Returns an iterator over the entries, in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = &ProcessEntry> {
        self.entries.iter()
    }
}

/// Python process which can be traced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDescriptor {
    /// Process ID.
    pub pid: u32,

    /// Display name.
    pub name: String,

    /// Owning user name.
    pub user: String,

    /// Command line.
    pub cmdline: Vec<String>,
}

/// Returns the ancestors of `pid` (parent first).
pub fn ancestors(table: &ProcessTable, pid: u32) -> Vec<u32> {
    let mut chain = Vec::new();
    let mut seen = HashSet::from([pid]);
    let mut current = table.get(pid);

    while let Some(entry) = current {
        if entry.ppid == 0 || !seen.insert(entry.ppid) {
            break;
        }
        chain.push(entry.ppid);
        current = table.get(entry.ppid);
    }

    chain
}

/// Returns whether the command line is the one of a Python interpreter.
pub fn is_python(cmdline: &[String]) -> bool {
    cmdline
        .first()
        .and_then(|argv0| Path::new(argv0).file_name())
        .is_some_and(|name| name.to_string_lossy().contains("python"))
}

/// Selects the Python processes owned by `uid`.
///
/// Unless `include_self` is set, `caller` and its ancestors are excluded.
pub fn select_candidates(
    table: &ProcessTable,
    caller: u32,
    uid: u32,
    include_self: bool,
    user_name: impl Fn(u32) -> String,
) -> Vec<ProcessDescriptor> {
    let excluded: HashSet<u32> = if include_self {
        HashSet::new()
    } else {
        std::iter::once(caller)
            .chain(ancestors(table, caller))
            .collect()
    };

    table
        .iter()
        .filter(|entry| entry.uid == uid && is_python(&entry.cmdline))
        .filter(|entry| !excluded.contains(&entry.pid))
        .map(|entry| ProcessDescriptor {
            pid: entry.pid,
            name: entry.name.clone(),
            user: user_name(entry.uid),
            cmdline: entry.cmdline.clone(),
        })
        .collect()
}

/// Lists the Python processes run by the current user.
///
/// Unless `include_self` is set, the current process and its ancestors are
/// not listed.
#[tracing::instrument]
pub fn list_candidates(include_self: bool) -> Result<Vec<ProcessDescriptor>, DiscoveryError> {
    let table = ProcessTable::snapshot()?;

    let candidates = select_candidates(
        &table,
        std::process::id(),
        sys::current_uid(),
        include_self,
        sys::user_name,
    );

    tracing::debug!(count = candidates.len(), "candidates found");

    Ok(candidates)
}
