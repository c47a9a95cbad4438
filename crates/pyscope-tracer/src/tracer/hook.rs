use std::collections::HashMap;

use crate::event::{Event, EventKind, FrameId};
use crate::filter::FilterPolicy;
use crate::publisher::{PublishError, Publisher};
use crate::runtime::{FrameInspector, RuntimeEvent};
use crate::session::TraceSession;

type ThreadId = u64;

/// Converts raw runtime events into published events.
///
/// The filter decision of a frame is taken once, when the frame is entered,
/// and applies to all its line steps and to its exit.
pub(crate) struct FrameHook {
    policy: FilterPolicy,

    /// Filter decision of every live frame, per thread.
    decisions: HashMap<(ThreadId, FrameId), bool>,

    /// Maximum number of publish failures tolerated.
    failure_threshold: u64,

    counters: HookCounters,
}

/// Counters maintained by the [FrameHook].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct HookCounters {
    pub seen: u64,
    pub forwarded: u64,
    pub failures: u64,
}

/// What the tracer should do after a raw event was handled.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HookOutcome {
    Continue,
    Fault(PublishError),
}

impl FrameHook {
    pub(crate) fn new(policy: FilterPolicy, failure_threshold: u64) -> Self {
        Self {
            policy,
            decisions: HashMap::new(),
            failure_threshold,
            counters: HookCounters::default(),
        }
    }

    pub(crate) const fn counters(&self) -> HookCounters {
        self.counters
    }

    /// Number of live frames with a cached decision.
    #[cfg(test)]
    pub(crate) fn live_frames(&self) -> usize {
        self.decisions.len()
    }

    /// Handles a raw runtime event, publishing the resulting event (if any).
    pub(crate) fn handle<F, P>(
        &mut self,
        session: &TraceSession,
        event: RuntimeEvent<F>,
        publisher: &mut P,
    ) -> HookOutcome
    where
        F: FrameInspector,
        P: Publisher,
    {
        self.counters.seen += 1;

        let Some((thread_id, frame_id, kind)) = self.accept(event) else {
            return HookOutcome::Continue;
        };

        let event = Event {
            session_id: session.id().clone(),
            timestamp_us: session.elapsed_us(),
            thread_id,
            frame_id,
            kind,
        };

        match publisher.publish(event) {
            Ok(()) => {
                self.counters.forwarded += 1;
                HookOutcome::Continue
            }
            Err(e) => {
                self.counters.failures += 1;

                tracing::warn!(error = %e, failures = self.counters.failures, "publish failed");

                if e.is_persistent() || self.counters.failures > self.failure_threshold {
                    HookOutcome::Fault(e)
                } else {
                    HookOutcome::Continue
                }
            }
        }
    }

    fn accept<F: FrameInspector>(
        &mut self,
        event: RuntimeEvent<F>,
    ) -> Option<(ThreadId, FrameId, EventKind)> {
        match event {
            RuntimeEvent::Call(frame) => {
                let key = (frame.thread_id(), frame.frame_id());
                let accept = self.policy.should_trace(frame.location());

                self.decisions.insert(key, accept);

                accept.then(|| {
                    let kind = EventKind::Call {
                        function: frame.qualified_name().to_owned(),
                        file: frame.location().file.display().to_string(),
                        line: frame.line(),
                        arguments: frame.bindings(),
                    };
                    (key.0, key.1, kind)
                })
            }
            RuntimeEvent::Line(frame) => {
                let key = (frame.thread_id(), frame.frame_id());

                // frames entered before the hook was installed have no decision
                let accept = self.decisions.get(&key).copied().unwrap_or(false);

                accept.then(|| {
                    let kind = EventKind::Line {
                        file: frame.location().file.display().to_string(),
                        line: frame.line(),
                        locals: frame.bindings(),
                    };
                    (key.0, key.1, kind)
                })
            }
            RuntimeEvent::Return {
                thread_id,
                frame_id,
                value,
            } => self
                .decisions
                .remove(&(thread_id, frame_id))
                .unwrap_or(false)
                .then_some((thread_id, frame_id, EventKind::Return { value })),
            RuntimeEvent::Exception {
                thread_id,
                frame_id,
                type_name,
                message,
            } => self
                .decisions
                .remove(&(thread_id, frame_id))
                .unwrap_or(false)
                .then_some((
                    thread_id,
                    frame_id,
                    EventKind::Exception { type_name, message },
                )),
            RuntimeEvent::Exited { .. } => None,
        }
    }
}
