use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Snapshot of visible bindings (argument or local variable name to its
/// `repr` string), in declaration order.
pub type Bindings = IndexMap<String, String>;

/// Identifier of a traced session.
///
/// A new random identifier is generated for every attach (or spawn).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a new random session ID.
    pub fn new_random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the session ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of a call activation (frame).
///
/// It is stable for the lifetime of one call, and may be reused by the host
/// runtime once that call has returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Structured observation of the traced program execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Session this event belongs to.
    pub session_id: SessionId,

    /// Monotonic timestamp (in microseconds) relative to the session start.
    pub timestamp_us: u64,

    /// Host thread the frame is running on.
    pub thread_id: u64,

    /// Frame the event relates to.
    pub frame_id: FrameId,

    /// Kind-specific data.
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Kind-specific data of an [Event].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    /// A function was called.
    Call {
        /// Qualified name of the called function.
        function: String,

        /// Source file of the called function.
        file: String,

        /// Line of the function entry.
        line: u32,

        /// Arguments the function was called with.
        arguments: Bindings,
    },

    /// A new source line is about to be executed.
    Line {
        /// Source file of the line.
        file: String,

        /// Line number.
        line: u32,

        /// Local variables before the line executes.
        locals: Bindings,
    },

    /// A function returned normally.
    Return {
        /// `repr` of the returned value.
        value: String,
    },

    /// A function exited because of an exception.
    Exception {
        /// Name of the exception type.
        type_name: String,

        /// Exception message.
        message: String,
    },
}

impl EventKind {
    /// Returns the tag of this event kind, as used on the wire and in the
    /// local store.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Call { .. } => "call",
            Self::Line { .. } => "line",
            Self::Return { .. } => "return",
            Self::Exception { .. } => "exception",
        }
    }

    /// Returns whether this event terminates its frame.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Return { .. } | Self::Exception { .. })
    }
}
