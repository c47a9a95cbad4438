//! This crate provides a default implementation of a Python runtime (to be
//! used with `pyscope-tracer`).
//!
//! The runtime is able to spawn a Python program (on the **same host
//! machine**) as a child, or to attach to a Python process of the current
//! user, and to report its execution.
//!
//! <div class="warning">
//!
//! *This crate is not meant to be used on its own! It merely implements the
//! interface (traits) provided by `pyscope-tracer`, so that the runtime can
//! be used by that crate for tracing processes.*
//!
//! </div>
//!
//! # Attaching to a running interpreter
//!
//! Only interpreters that opted in can be attached to. An interpreter opts in
//! by loading the agent in listen mode at startup:
//!
//! ```text
//! pyscope install-agent ~/.pyscope/agent
//! PYTHONPATH=~/.pyscope/agent PYSCOPE_LISTEN=1 python3 app.py
//! ```
//!
//! # Supported Platforms
//!
//! Linux only (processes are discovered through `/proc`).

/// Module installing the in-target agent.
pub mod agent;

/// Module enumerating the Python processes of the host.
pub mod discovery;

mod error;
mod frame;
mod layout;
mod protocol;
mod runtime;
mod session;
mod sys;

pub use self::discovery::{ProcessDescriptor, list_candidates};
pub use self::error::{DiscoveryError, Error, Result};
pub use self::frame::PythonFrame;
pub use self::layout::InterpreterLayout;
pub use self::runtime::PythonRuntime;
pub use self::session::PythonSession;
