mod frame;

use std::future::Future;

pub use self::frame::FrameInspector;
use crate::Command;
use crate::event::FrameId;
use crate::filter::FilterConfig;

/// Trait implementing the hook installation logic of a host runtime.
pub trait Runtime {
    /// Instrumentation session returned by this runtime.
    type Session: RuntimeSession<Error: Into<Self::Error>>;

    /// Error returned by this trait.
    type Error: std::error::Error;

    /// Spawns a process with the given command line, with the execution
    /// hook installed before any user code runs.
    fn spawn(
        &mut self,
        command: Command,
    ) -> impl Future<Output = Result<Self::Session, Self::Error>>;

    /// Installs the execution hook into an already-running process.
    ///
    /// # Note
    ///
    /// The target process must expose an attach point. How a process opts
    /// into being attached is specific to each runtime.
    fn attach(&mut self, pid: u32) -> impl Future<Output = Result<Self::Session, Self::Error>>;
}

/// Trait implementing the event source of an instrumented process.
pub trait RuntimeSession {
    /// Type of the frames reported by this session.
    type Frame: FrameInspector;

    /// Error returned by this trait.
    type Error: std::error::Error;

    /// Returns the ID of the instrumented process.
    fn process_id(&self) -> u32;

    /// Returns the next raw execution event.
    ///
    /// # Note
    ///
    /// Implementors make sure this future is cancel-safe, as it is polled
    /// concurrently with a detach request.
    fn next_event(&mut self) -> impl Future<Output = Result<RuntimeEvent<Self::Frame>, Self::Error>>;

    /// Lets the hook skip the frames rejected by the given filter.
    ///
    /// Called once, before the first event is requested. The tracer still
    /// filters every reported frame, so the hook may report more frames
    /// than the filter accepts, but never fewer.
    fn set_filter(&mut self, filter: &FilterConfig) -> impl Future<Output = Result<(), Self::Error>>;

    /// Uninstalls the execution hook.
    ///
    /// The process keeps running, untraced.
    fn detach(&mut self) -> impl Future<Output = Result<(), Self::Error>>;

    /// Waits for a spawned process to exit, and returns its exit code.
    ///
    /// `None` is returned for processes the runtime did not spawn.
    fn wait_exit(&mut self) -> impl Future<Output = Result<Option<i32>, Self::Error>>;
}

/// Raw execution event reported by the host runtime.
pub enum RuntimeEvent<F> {
    /// A frame was entered.
    Call(F),

    /// A frame is about to execute a new line.
    Line(F),

    /// A frame returned normally.
    Return {
        /// Thread running the frame.
        thread_id: u64,

        /// The returning frame.
        frame_id: FrameId,

        /// `repr` of the returned value.
        value: String,
    },

    /// A frame exited because of an exception.
    Exception {
        /// Thread running the frame.
        thread_id: u64,

        /// The exiting frame.
        frame_id: FrameId,

        /// Name of the exception type.
        type_name: String,

        /// Exception message.
        message: String,
    },

    /// The instrumented process has exited (or dropped the hook).
    Exited {
        /// Exit code of the process, when known.
        exit_code: Option<i32>,
    },
}
