mod builder;
mod hook;
mod tracee;

use std::fmt::Display;
use std::time::Duration;

pub use self::builder::Builder;
use self::builder::NeedsRuntime;
use self::hook::{FrameHook, HookOutcome};
pub use self::tracee::{DetachHandle, TracedSession};
use crate::Command;
use crate::error::{Error, RuntimeError};
use crate::filter::FilterPolicy;
use crate::publisher::{PublishError, Publisher};
use crate::runtime::{Runtime, RuntimeEvent, RuntimeSession};
use crate::session::{SessionReport, SessionState, Target, TraceMode, TraceSession};

/// Default number of publish failures tolerated before a session faults.
pub const DEFAULT_FAILURE_THRESHOLD: u64 = 64;

/// Default time given to a detached spawned target to exit on its own.
pub const DEFAULT_REAP_TIMEOUT: Duration = Duration::from_secs(1);

/// Process tracer.
///
/// A tracer drives a **single** session: it is consumed by
/// [spawn](Self::spawn) or [attach](Self::attach).
pub struct Tracer<R, P> {
    /// Host runtime used for installing the hook.
    pub(super) runtime: R,

    /// Publisher of accepted events.
    pub(super) publisher: P,

    /// Policy deciding which frames are traced.
    pub(super) policy: FilterPolicy,

    /// Maximum number of publish failures tolerated.
    pub(super) failure_threshold: u64,

    /// Time given to a detached spawned target to exit.
    pub(super) reap_timeout: Duration,
}

impl Tracer<(), ()> {
    /// Creates a tracer builder.
    pub const fn builder() -> Builder<NeedsRuntime> {
        Builder::new()
    }
}

impl<R: Runtime, P: Publisher> Tracer<R, P> {
    /// Spawns the process to trace with the given command line.
    ///
    /// The execution hook is installed before any user code runs.
    #[tracing::instrument(name = "Spawn", skip_all, fields(program = %command.program.display()))]
    pub async fn spawn(
        mut self,
        command: Command,
    ) -> crate::Result<TracedSession<R::Session, P>, R::Error> {
        let program = command.program.display().to_string();
        let session = TraceSession::new(Target::Command(command.argv()));

        log_transition(&session, SessionState::Detached, SessionState::Attaching);

        let runtime_session = match self.runtime.spawn(command).await {
            Ok(runtime_session) => runtime_session,
            Err(source) => {
                self.abort(&session).await;
                return Err(Error::Spawn { program, source });
            }
        };

        tracing::info!(pid = runtime_session.process_id(), "spawned");

        self.bind(session, runtime_session).await
    }

    /// Attaches to an already-running process.
    ///
    /// # Note
    ///
    /// The process must expose an attach point, see [Runtime::attach].
    #[tracing::instrument(name = "Attach", skip(self))]
    pub async fn attach(
        mut self,
        pid: u32,
    ) -> crate::Result<TracedSession<R::Session, P>, R::Error> {
        let session = TraceSession::new(Target::Pid(pid));

        log_transition(&session, SessionState::Detached, SessionState::Attaching);

        let runtime_session = match self.runtime.attach(pid).await {
            Ok(runtime_session) => runtime_session,
            Err(source) => {
                self.abort(&session).await;
                return Err(Error::Attach { pid, source });
            }
        };

        tracing::info!("attached");

        self.bind(session, runtime_session).await
    }

    /// Binds the publisher to a session whose hook is installed.
    async fn bind(
        mut self,
        info: TraceSession,
        mut session: R::Session,
    ) -> crate::Result<TracedSession<R::Session, P>, R::Error> {
        if let Err(e) = session.set_filter(self.policy.config()).await {
            tracing::warn!(error = %e, "hook reports unfiltered frames");
        }

        if let Err(e) = self.publisher.begin(&info) {
            tracing::error!(error = %e, "failed to bind publisher");

            if let Err(e) = session.detach().await {
                tracing::warn!(error = %e, "failed to uninstall hook");
            }
            self.abort(&info).await;

            return Err(Error::Publish(e));
        }

        Ok(self.start(info, session))
    }

    async fn abort(&mut self, session: &TraceSession) {
        log_transition(session, SessionState::Attaching, SessionState::Detached);

        if let Err(e) = self.publisher.close().await {
            tracing::warn!(error = %e, "failed to close publisher");
        }
    }

    fn start(self, info: TraceSession, session: R::Session) -> TracedSession<R::Session, P> {
        log_transition(&info, SessionState::Attaching, SessionState::Tracing);

        TracedSession::new(TraceTask {
            info,
            session,
            publisher: self.publisher,
            hook: FrameHook::new(self.policy, self.failure_threshold),
            state: SessionState::Tracing,
            detach: DetachHandle::new(),
            reap_timeout: self.reap_timeout,
        })
    }
}

fn log_transition(session: &TraceSession, from: SessionState, to: SessionState) {
    debug_assert!(from.can_transition_to(to), "{from} -> {to}");
    tracing::debug!(session = %session.id(), %from, %to, "state changed");
}

/// Tracing task.
struct TraceTask<S, P> {
    /// Session being traced.
    info: TraceSession,

    /// Runtime session over the target.
    session: S,

    /// Publisher of accepted events.
    publisher: P,

    /// Raw events to published events conversion.
    hook: FrameHook,

    /// Current state of the session.
    state: SessionState,

    /// Detach requests.
    detach: DetachHandle,

    /// Time given to a detached spawned target to exit.
    reap_timeout: Duration,
}

/// Reason for which the tracing loop stopped.
enum Stop<E> {
    Exited(Option<i32>),
    Detach,
    Fault(PublishError),
    Runtime(E),
}

impl<S, P> TraceTask<S, P>
where
    S: RuntimeSession,
    P: Publisher,
{
    /// Runs the tracing task until the target exits or gets detached.
    #[tracing::instrument(
        name = "Trace",
        skip_all,
        fields(session = %self.info.id(), pid = self.session.process_id())
    )]
    async fn run(mut self) -> crate::Result<SessionReport, S::Error> {
        let detach = self.detach.clone();

        let stop = loop {
            let event = tokio::select! {
                biased;
                () = detach.requested() => {
                    tracing::info!("detach requested");
                    break Stop::Detach;
                }
                event = self.session.next_event() => event,
            };

            match event {
                Ok(RuntimeEvent::Exited { exit_code }) => {
                    tracing::info!(?exit_code, "target has exited");
                    break Stop::Exited(exit_code);
                }
                Ok(event) => {
                    if let HookOutcome::Fault(e) =
                        self.hook.handle(&self.info, event, &mut self.publisher)
                    {
                        tracing::error!(error = %e, "session faulted");
                        break Stop::Fault(e);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "runtime failure");
                    break Stop::Runtime(e);
                }
            }
        };

        self.finish(stop).await
    }

    async fn finish(mut self, stop: Stop<S::Error>) -> crate::Result<SessionReport, S::Error> {
        tracing::debug!(%stop, "tracing loop stopped");

        let mut exit_code = None;
        let mut fault = None;
        let mut runtime_error = None;

        let target_exited = match stop {
            Stop::Exited(code) => {
                exit_code = code;
                true
            }
            Stop::Detach => false,
            Stop::Fault(e) => {
                self.transition(SessionState::Faulted);
                fault = Some(e);
                false
            }
            Stop::Runtime(e) => {
                runtime_error = Some(e);
                false
            }
        };

        if self.state == SessionState::Tracing {
            self.transition(SessionState::Detaching);
        }

        if !target_exited {
            if let Err(e) = self.session.detach().await {
                tracing::warn!(error = %e, "failed to uninstall hook");
            }
        }

        let publisher = match self.publisher.close().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "failed to flush publisher");
                fault.get_or_insert(e);
                self.publisher.stats()
            }
        };

        // a spawned target keeps running untraced, reap it if it exits soon
        if !target_exited && self.info.mode() == TraceMode::Spawn {
            match tokio::time::timeout(self.reap_timeout, self.session.wait_exit()).await {
                Ok(Ok(code)) => exit_code = code,
                Ok(Err(e)) => tracing::warn!(error = %e, "failed to wait for target"),
                Err(_) => tracing::info!(
                    timeout = ?self.reap_timeout,
                    "target keeps running untraced"
                ),
            }
        }

        if self.state != SessionState::Faulted {
            let next = if fault.is_some() {
                SessionState::Faulted
            } else {
                SessionState::Detached
            };
            self.transition(next);
        }

        let counters = self.hook.counters();

        let report = SessionReport {
            session: self.info,
            state: self.state,
            exit_code,
            events_seen: counters.seen,
            events_forwarded: counters.forwarded,
            publish_failures: counters.failures,
            publisher,
        };

        tracing::info!(
            state = %report.state,
            forwarded = report.events_forwarded,
            dropped = report.publisher.dropped,
            "session finished"
        );

        if let Some(e) = runtime_error {
            return Err(Error::Runtime(RuntimeError(e)));
        }

        match fault {
            Some(source) => Err(Error::Faulted {
                report: Box::new(report),
                source,
            }),
            None => Ok(report),
        }
    }

    fn transition(&mut self, next: SessionState) {
        log_transition(&self.info, self.state, next);
        self.state = next;
    }
}

impl<E: Display> Display for Stop<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited ({code:?})"),
            Self::Detach => f.write_str("detached"),
            Self::Fault(e) => write!(f, "faulted ({e})"),
            Self::Runtime(e) => write!(f, "runtime failure ({e})"),
        }
    }
}
