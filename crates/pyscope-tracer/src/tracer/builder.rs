use std::time::Duration;

use super::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_REAP_TIMEOUT, Tracer};
use crate::filter::{FilterConfig, FilterPolicy};
use crate::publisher::Publisher;
use crate::runtime::Runtime;

/// Builder for [Tracer].
///
/// It is usually created by calling [Tracer::builder], and allows to
/// specify which runtime and publisher to use for tracing a process.
pub struct Builder<S> {
    state: S,
}

impl Builder<NeedsRuntime> {
    pub(super) const fn new() -> Self {
        Self {
            state: NeedsRuntime,
        }
    }

    /// Specifies the host runtime used for installing the execution hook.
    pub const fn with_runtime<R: Runtime>(self, runtime: R) -> Builder<NeedsPublisher<R>> {
        Builder {
            state: NeedsPublisher { runtime },
        }
    }
}

impl<R: Runtime> Builder<NeedsPublisher<R>> {
    /// Specifies the publisher of the accepted trace events.
    pub fn with_publisher<P: Publisher>(self, publisher: P) -> Builder<Ready<R, P>> {
        Builder {
            state: Ready {
                runtime: self.state.runtime,
                publisher,
                filter: FilterConfig::default(),
                failure_threshold: DEFAULT_FAILURE_THRESHOLD,
                reap_timeout: DEFAULT_REAP_TIMEOUT,
            },
        }
    }
}

impl<R, P> Builder<Ready<R, P>> {
    /// Specifies which code areas are traced.
    ///
    /// By default, standard library code is skipped while third-party and
    /// application code is traced.
    pub fn filter(mut self, filter: FilterConfig) -> Self {
        self.state.filter = filter;
        self
    }

    /// Specifies how many publish failures are tolerated before the session
    /// faults.
    pub const fn failure_threshold(mut self, threshold: u64) -> Self {
        self.state.failure_threshold = threshold;
        self
    }

    /// Specifies how long a spawned target is waited for once detached.
    ///
    /// A target still running past this delay is left running untraced,
    /// and the session reports no exit code.
    pub const fn reap_timeout(mut self, timeout: Duration) -> Self {
        self.state.reap_timeout = timeout;
        self
    }

    /// Builds the tracer.
    pub fn build(self) -> Tracer<R, P> {
        Tracer {
            runtime: self.state.runtime,
            publisher: self.state.publisher,
            policy: FilterPolicy::new(self.state.filter),
            failure_threshold: self.state.failure_threshold,
            reap_timeout: self.state.reap_timeout,
        }
    }
}

pub struct NeedsRuntime;

pub struct NeedsPublisher<R> {
    runtime: R,
}

pub struct Ready<R, P> {
    runtime: R,
    publisher: P,
    filter: FilterConfig,
    failure_threshold: u64,
    reap_timeout: Duration,
}
