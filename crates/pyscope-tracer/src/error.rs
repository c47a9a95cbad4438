use crate::publisher::PublishError;
use crate::session::SessionReport;

/// Runtime error.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct RuntimeError<E>(pub E);

/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error<E> {
    /// The hook could not be installed into a running process.
    #[error("failed to attach to pid {pid}")]
    Attach {
        /// Target process.
        pid: u32,

        /// Runtime error.
        #[source]
        source: E,
    },

    /// The process to trace could not be spawned.
    #[error("failed to spawn {program}")]
    Spawn {
        /// Spawned program.
        program: String,

        /// Runtime error.
        #[source]
        source: E,
    },

    /// A runtime error occurred while tracing.
    #[error(transparent)]
    Runtime(#[from] RuntimeError<E>),

    /// The publisher could not be bound to the session.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The session faulted because of the publisher, and was detached.
    #[error("trace session faulted")]
    Faulted {
        /// Report of the faulted session.
        report: Box<SessionReport>,

        /// Publish error responsible for the fault.
        #[source]
        source: PublishError,
    },
}

/// Result type of this crate.
pub type Result<T, E> = core::result::Result<T, Error<E>>;
