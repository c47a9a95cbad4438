use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::event::SessionId;
use crate::publisher::PublisherStats;

/// Process targeted by a trace session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// An already-running process.
    Pid(u32),

    /// A process spawned by the tracer, with its command line.
    Command(Vec<String>),
}

impl Target {
    /// Returns the trace mode implied by this target.
    pub const fn mode(&self) -> TraceMode {
        match self {
            Self::Pid(_) => TraceMode::Attach,
            Self::Command(_) => TraceMode::Spawn,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pid(pid) => write!(f, "pid {pid}"),
            Self::Command(argv) => write!(f, "{}", argv.join(" ")),
        }
    }
}

/// How the hook gets installed into the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceMode {
    /// Hook installed into an already-running process.
    Attach,

    /// Process spawned with the hook installed before user code runs.
    Spawn,
}

impl TraceMode {
    /// Returns the label of this mode, as stored in the local store.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Attach => "attach",
            Self::Spawn => "spawn",
        }
    }
}

/// One attach-or-spawn tracing lifetime bound to one target process.
#[derive(Debug, Clone)]
pub struct TraceSession {
    id: SessionId,
    target: Target,
    started_at_us: u64,
    origin: Instant,
}

impl TraceSession {
    /// Creates a new session (with a fresh ID) for the given target.
    pub fn new(target: Target) -> Self {
        let started_at_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();

        Self {
            id: SessionId::new_random(),
            target,
            started_at_us,
            origin: Instant::now(),
        }
    }

    /// Session ID.
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Traced target.
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// Trace mode.
    pub const fn mode(&self) -> TraceMode {
        self.target.mode()
    }

    /// Wall-clock start of the session, in microseconds since the Unix epoch.
    pub const fn started_at_us(&self) -> u64 {
        self.started_at_us
    }

    /// Monotonic time elapsed since the session start, in microseconds.
    pub fn elapsed_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// State of a trace session.
///
/// ```text
/// Detached -> Attaching -> Tracing -> Detaching -> Detached
///                             |
///                             +-----> Faulted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No hook installed.
    Detached,

    /// Hook being installed.
    Attaching,

    /// Hook installed, events flowing.
    Tracing,

    /// Hook being removed, publisher being flushed.
    Detaching,

    /// Unrecoverable failure, tracing disabled for the target.
    Faulted,
}

impl SessionState {
    /// Returns whether the state machine allows moving to `next`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Detached, Self::Attaching)
                | (Self::Attaching, Self::Tracing)
                | (Self::Attaching, Self::Detached)
                | (Self::Tracing, Self::Detaching)
                | (Self::Tracing, Self::Faulted)
                | (Self::Detaching, Self::Detached)
                | (Self::Detaching, Self::Faulted)
        )
    }

    /// Returns whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Faulted)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Detached => "detached",
            Self::Attaching => "attaching",
            Self::Tracing => "tracing",
            Self::Detaching => "detaching",
            Self::Faulted => "faulted",
        };
        f.write_str(label)
    }
}

/// Summary of a finished trace session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// The finished session.
    pub session: TraceSession,

    /// Final state ([Detached](SessionState::Detached) or
    /// [Faulted](SessionState::Faulted)).
    pub state: SessionState,

    /// Exit code of the target, when known.
    pub exit_code: Option<i32>,

    /// Raw execution events received from the target.
    pub events_seen: u64,

    /// Events accepted by the filter policy and handed to the publisher.
    pub events_forwarded: u64,

    /// Publish calls that failed.
    pub publish_failures: u64,

    /// Final publisher statistics.
    pub publisher: PublisherStats,
}
