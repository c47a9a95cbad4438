use tokio_util::sync::CancellationToken;

use super::TraceTask;
use crate::publisher::Publisher;
use crate::runtime::RuntimeSession;
use crate::session::{SessionReport, TraceSession};

/// Process with the execution hook installed, ready to be traced.
pub struct TracedSession<S, P> {
    trace_task: TraceTask<S, P>,
}

impl<S: RuntimeSession, P> TracedSession<S, P> {
    pub(super) const fn new(trace_task: TraceTask<S, P>) -> Self {
        Self { trace_task }
    }

    /// The trace session.
    pub const fn session(&self) -> &TraceSession {
        &self.trace_task.info
    }

    /// ID of the traced process.
    pub fn process_id(&self) -> u32 {
        self.trace_task.session.process_id()
    }

    /// Returns a handle for detaching from the process.
    ///
    /// # Note
    ///
    /// You may want to call this function before calling [trace](Self::trace),
    /// so that you can detach from another task while tracing.
    pub fn detach_handle(&self) -> DetachHandle {
        self.trace_task.detach.clone()
    }
}

impl<S, P> TracedSession<S, P>
where
    S: RuntimeSession,
    P: Publisher,
{
    /// Traces the process until it exits or a detach is requested.
    ///
    /// Accepted events are forwarded to the [publisher](crate::publisher::Publisher)
    /// specified when [building the tracer](super::Builder).
    pub async fn trace(self) -> crate::Result<SessionReport, S::Error> {
        self.trace_task.run().await
    }
}

/// Handle for requesting a traced session to detach.
///
/// Requesting a detach more than once is a no-op.
#[derive(Debug, Clone, Default)]
pub struct DetachHandle {
    token: CancellationToken,
}

impl DetachHandle {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Requests the session to detach.
    pub fn detach(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!("detach requested by handle");
        }
        self.token.cancel();
    }

    /// Returns whether a detach was requested.
    pub fn is_detach_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(super) async fn requested(&self) {
        self.token.cancelled().await;
    }
}
