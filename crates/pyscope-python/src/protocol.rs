use std::path::PathBuf;

use pyscope_tracer::event::Bindings;
use pyscope_tracer::filter::FilterConfig;
use serde::{Deserialize, Serialize};

/// Record sent by the agent, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentRecord {
    /// First record, sent once connected.
    Hello(Hello),

    /// A frame was entered (bindings hold the arguments).
    Call(FrameRecord),

    /// A frame is about to execute a line (bindings hold the locals).
    Line(FrameRecord),

    /// A frame returned normally.
    Return {
        /// Thread identifier.
        thread: u64,

        /// Frame identifier.
        frame: u64,

        /// `repr` of the returned value.
        value: String,
    },

    /// A frame exited while an exception raised in it was pending.
    Exception {
        /// Thread identifier.
        thread: u64,

        /// Frame identifier.
        frame: u64,

        /// Name of the exception type.
        type_name: String,

        /// `str` of the exception.
        message: String,
    },
}

/// Interpreter description sent by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Hello {
    /// Process ID of the interpreter.
    pub pid: u32,

    /// Interpreter version (e.g., `3.12.1`).
    pub version: String,

    /// Standard library directories.
    pub stdlib: Vec<PathBuf>,

    /// Third-party package directories.
    pub site: Vec<PathBuf>,
}

/// Snapshot of a frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FrameRecord {
    /// Thread identifier.
    pub thread: u64,

    /// Frame identifier.
    pub frame: u64,

    /// Dotted module name.
    pub module: String,

    /// Qualified name of the code object (e.g., `Greeter.greet`).
    pub qualname: String,

    /// Source file.
    pub file: PathBuf,

    /// Current line.
    pub line: u32,

    /// Arguments (on call) or locals (on line).
    #[serde(default)]
    pub bindings: Bindings,
}

/// Record sent to the agent, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TracerRecord {
    /// Frames accepted by the tracer. The agent starts tracing once it gets
    /// this record (or after a short delay).
    Filter {
        /// Whether standard library frames are accepted.
        stdlib: bool,

        /// Whether third-party package frames are accepted.
        site: bool,

        /// Packages always accepted.
        packages: Vec<String>,
    },
}

impl From<&FilterConfig> for TracerRecord {
    fn from(filter: &FilterConfig) -> Self {
        Self::Filter {
            stdlib: filter.include_stdlib(),
            site: filter.include_site_packages(),
            packages: filter.include_packages().iter().cloned().collect(),
        }
    }
}
