use std::time::Duration;

/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No process with the given ID.
    #[error("no process with pid {0}")]
    ProcessNotFound(u32),

    /// The process is owned by another user.
    #[error("process {pid} is owned by uid {owner}, not by the caller")]
    NotOwned {
        /// Target process.
        pid: u32,

        /// Owner of the process.
        owner: u32,
    },

    /// The process did not opt into being attached.
    #[error("process {pid} refused instrumentation: {reason}")]
    Refused {
        /// Target process.
        pid: u32,

        /// Why the process is considered as refusing.
        reason: &'static str,
    },

    /// The program could not be launched.
    #[error("failed to launch {program}")]
    Launch {
        /// Launched program.
        program: String,

        /// OS error.
        #[source]
        source: std::io::Error,
    },

    /// The spawned process exited before its agent connected.
    #[error("process exited before connecting its agent (exit code: {0:?})")]
    ExitedEarly(Option<i32>),

    /// The agent did not connect in time.
    #[error("agent did not connect within {0:?}")]
    AgentTimeout(Duration),

    /// The agent sent an unexpected record.
    #[error("unexpected agent record: {0}")]
    UnexpectedRecord(String),

    /// The agent sent a malformed record.
    #[error(transparent)]
    Protocol(#[from] serde_json::Error),

    /// Agent stream error.
    #[error(transparent)]
    Stream(#[from] tokio_util::codec::LinesCodecError),

    /// OS error.
    #[cfg(target_os = "linux")]
    #[error("os error: {0}")]
    Os(#[from] nix::Error),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Process discovery error.
#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    /// The process table could not be enumerated.
    #[error("failed to enumerate processes")]
    Enumerate(#[source] std::io::Error),
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
