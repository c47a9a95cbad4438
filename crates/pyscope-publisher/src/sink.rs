use std::future::Future;
use std::sync::Arc;

use pyscope_tracer::event::{Event, SessionId};
use pyscope_tracer::publisher::{PublishError, Publisher, PublisherStats};
use pyscope_tracer::session::TraceSession;
use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::queue::OutboundQueue;

/// Maximum number of events delivered at once.
const MAX_BATCH: usize = 256;

/// Trait for implementing the destination of published events.
///
/// A sink is driven by a single worker task, so none of its methods are
/// called concurrently.
pub trait Sink: Send + 'static {
    /// Human-readable location of the sink (endpoint URL, file path).
    fn describe(&self) -> String;

    /// (Re)connects to the sink, on behalf of the given session.
    fn connect(
        &mut self,
        session: &TraceSession,
    ) -> impl Future<Output = crate::Result<()>> + Send;

    /// Delivers a batch of events, in order.
    ///
    /// On error, the whole batch is delivered again after reconnecting.
    fn deliver(&mut self, events: &[Event]) -> impl Future<Output = crate::Result<()>> + Send;

    /// Flushes and releases the sink.
    fn finish(&mut self) -> impl Future<Output = crate::Result<()>> + Send;
}

/// Publisher handing events over to a [Sink] through an [OutboundQueue].
///
/// All the sink I/O happens on a dedicated worker task, started when the
/// publisher is bound to a session.
pub struct QueuedPublisher<K> {
    sink: Option<K>,
    config: QueueConfig,
    queue: Arc<OutboundQueue>,
    bound: Option<SessionId>,
    worker: Option<JoinHandle<()>>,
    closed: bool,
}

impl<K: Sink> QueuedPublisher<K> {
    /// Creates a publisher delivering to a custom sink.
    pub fn with_sink(sink: K, config: QueueConfig) -> Self {
        Self {
            sink: Some(sink),
            queue: Arc::new(OutboundQueue::new(config.capacity)),
            config,
            bound: None,
            worker: None,
            closed: false,
        }
    }
}

impl<K: Sink> Publisher for QueuedPublisher<K> {
    fn begin(&mut self, session: &TraceSession) -> Result<(), PublishError> {
        if let Some(bound) = &self.bound {
            return Err(PublishError::SessionMismatch {
                bound: bound.clone(),
                got: session.id().clone(),
            });
        }

        if self.closed {
            return Err(PublishError::Closed);
        }

        let sink = self.sink.take().ok_or(PublishError::Closed)?;
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| PublishError::Sink(e.to_string()))?;

        let worker = Worker {
            endpoint: sink.describe(),
            sink,
            session: session.clone(),
            queue: self.queue.clone(),
            config: self.config.clone(),
            connected: false,
        };

        tracing::debug!(session = %session.id(), sink = %worker.endpoint, "publisher bound");

        self.worker = Some(handle.spawn(worker.run()));
        self.bound = Some(session.id().clone());

        Ok(())
    }

    fn publish(&mut self, event: Event) -> Result<(), PublishError> {
        let bound = self.bound.as_ref().ok_or(PublishError::NotBound)?;

        if self.closed {
            return Err(PublishError::Closed);
        }

        if event.session_id != *bound {
            return Err(PublishError::SessionMismatch {
                bound: bound.clone(),
                got: event.session_id,
            });
        }

        if let Some(fault) = self.queue.fault() {
            self.queue.count_dropped(1);
            return Err(fault);
        }

        self.queue.push(event);
        Ok(())
    }

    fn stats(&self) -> PublisherStats {
        self.queue.stats()
    }

    async fn close(&mut self) -> Result<PublisherStats, PublishError> {
        self.closed = true;

        if let Some(mut worker) = self.worker.take() {
            self.queue.close();

            match tokio::time::timeout(self.config.close_timeout, &mut worker).await {
                Ok(Ok(())) => (),
                Ok(Err(e)) => tracing::error!(error = %e, "publisher worker failed"),
                Err(_) => {
                    tracing::warn!(timeout = ?self.config.close_timeout, "flush timed out");
                    worker.abort();
                }
            }

            let dropped = self.queue.discard();
            if dropped > 0 {
                tracing::warn!(dropped, "pending events dropped on close");
            }
        }

        match self.queue.fault() {
            Some(fault) => Err(fault),
            None => Ok(self.queue.stats()),
        }
    }
}

/// Worker task delivering the queued events to the sink.
struct Worker<K> {
    sink: K,
    endpoint: String,
    session: TraceSession,
    queue: Arc<OutboundQueue>,
    config: QueueConfig,
    connected: bool,
}

impl<K: Sink> Worker<K> {
    #[tracing::instrument(name = "Publish", skip_all, fields(sink = %self.endpoint))]
    async fn run(mut self) {
        if let Err(e) = self.deliver(&[]).await {
            self.fault(e);
            return;
        }

        loop {
            let batch = self.queue.pop_batch(MAX_BATCH);

            if batch.is_empty() {
                if self.queue.is_closing() {
                    break;
                }
                self.queue.wait().await;
                continue;
            }

            match self.deliver(&batch).await {
                Ok(()) => self.queue.delivered(),
                Err(e) => {
                    self.fault(e);
                    return;
                }
            }
        }

        if let Err(e) = self.sink.finish().await {
            tracing::warn!(error = %e, "failed to finalize sink");
        }
    }

    /// Delivers a batch, reconnecting and retrying with exponential backoff.
    async fn deliver(&mut self, batch: &[Event]) -> Result<(), PublishError> {
        let mut backoff = self.config.backoff;
        let mut attempts = 0;

        loop {
            attempts += 1;

            let Err(e) = self.try_deliver(batch).await else {
                return Ok(());
            };

            self.connected = false;

            if attempts > self.config.retry_budget {
                return Err(PublishError::Unreachable {
                    endpoint: self.endpoint.clone(),
                    attempts,
                });
            }

            tracing::warn!(error = %e, attempts, ?backoff, "delivery failed, retrying");

            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
        }
    }

    async fn try_deliver(&mut self, batch: &[Event]) -> crate::Result<()> {
        if !self.connected {
            self.sink.connect(&self.session).await?;
            self.connected = true;
            tracing::debug!("sink connected");
        }

        if !batch.is_empty() {
            self.sink.deliver(batch).await?;
        }

        Ok(())
    }

    fn fault(&self, error: PublishError) {
        tracing::error!(error = %error, "sink unreachable, dropping events");

        self.queue.set_fault(error);
        self.queue.discard();
    }
}
