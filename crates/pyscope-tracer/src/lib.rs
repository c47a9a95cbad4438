//! This crate allows to trace the execution of an interpreted program, and
//! to publish the resulting events.
//!
//! Three main components are provided:
//! - A trait to implement a custom publisher, allowing to deliver the trace
//!   events (function calls, executed lines, returns and exceptions) to
//!   arbitrary sinks.
//! - A few traits to implement a host runtime, responsible for installing an
//!   execution hook into a process (either spawned, or already running).
//! - A filter policy, deciding which frames are traced depending on where
//!   their code lives (standard library, third-party packages, application).
//!
//! # Tracing a process
//!
//! ```no_run
//! use pyscope_python::PythonRuntime;
//! use pyscope_publisher::{LocalPublisher, QueueConfig};
//!
//! use pyscope_tracer::Command;
//! use pyscope_tracer::filter::FilterConfig;
//! use pyscope_tracer::tracer::Tracer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let publisher = LocalPublisher::new("trace.db", QueueConfig::default());
//!
//!     // initialize the tracer
//!     let tracer = Tracer::builder()
//!         .with_runtime(PythonRuntime::default())
//!         .with_publisher(publisher)
//!         .filter(FilterConfig::new(false, false, ["foo"]).unwrap())
//!         .build();
//!
//!     // spawn the process to trace
//!     let command = Command::new("python3").args(["-m", "foo"]);
//!     let session = tracer.spawn(command).await.unwrap();
//!
//!     // wait for the traced process to exit
//!     let report = session.trace().await.unwrap();
//!
//!     println!("{} events published", report.events_forwarded);
//! }
//! ```
//!
//! # Implementing a custom runtime
//!
//! The [Runtime](self::runtime::Runtime)/[RuntimeSession](self::runtime::RuntimeSession)
//! traits allow to implement the hook installation logic used for tracing a
//! process. The default implementation for Python is provided by
//! `pyscope-python`.

mod command;
mod error;

/// Module containing the trace event model.
pub mod event;

/// Module implementing the frame filter policy.
pub mod filter;

/// Module containing traits for implementing a custom publisher.
pub mod publisher;

/// Module containing traits for implementing a custom host runtime.
pub mod runtime;

/// Module containing the trace session model.
pub mod session;

/// Module implementing the process tracer.
pub mod tracer;

pub use self::command::Command;
pub use self::error::{Error, Result, RuntimeError};
