//! This crate provides the publishers delivering trace events to their
//! consumers.
//!
//! Two publishers are provided, sharing the same outbound queue and worker:
//! - [RemotePublisher] sends every event as a length-delimited MessagePack
//!   frame over TCP or a Unix domain socket, to a remote monitor.
//! - [LocalPublisher] appends events into a SQLite store, which can be read
//!   back with [LocalStoreReader] (used by `pyscope dump`).
//!
//! Both never block the tracer: events are pushed into a bounded queue
//! (dropping the oldest ones when full), and delivered in order by a
//! dedicated task which retries with exponential backoff.

mod config;
mod error;
mod local;
mod queue;
mod remote;
mod sink;

/// Module implementing the encoding of events.
pub mod wire;

use pyscope_tracer::event::Event;
use pyscope_tracer::publisher::{PublishError, Publisher, PublisherStats};
use pyscope_tracer::session::TraceSession;

pub use self::config::{DEFAULT_DATABASE, DEFAULT_ENDPOINT, Endpoint, PublisherConfig, QueueConfig};
pub use self::error::{Error, Result};
pub use self::local::{LocalPublisher, LocalSink, LocalStoreReader, StoredSession};
pub use self::remote::{RemotePublisher, RemoteSink};
pub use self::sink::{QueuedPublisher, Sink};

/// Publisher selected at runtime from a [PublisherConfig].
pub enum ConfiguredPublisher {
    /// Remote monitor.
    Remote(RemotePublisher),

    /// Local store.
    Local(LocalPublisher),
}

impl ConfiguredPublisher {
    /// Creates the publisher described by `config`.
    pub fn new(config: PublisherConfig, queue: QueueConfig) -> Self {
        match config {
            PublisherConfig::Remote(endpoint) => Self::Remote(RemotePublisher::new(endpoint, queue)),
            PublisherConfig::Local(path) => Self::Local(LocalPublisher::new(path, queue)),
        }
    }
}

impl Publisher for ConfiguredPublisher {
    fn begin(&mut self, session: &TraceSession) -> core::result::Result<(), PublishError> {
        match self {
            Self::Remote(publisher) => publisher.begin(session),
            Self::Local(publisher) => publisher.begin(session),
        }
    }

    fn publish(&mut self, event: Event) -> core::result::Result<(), PublishError> {
        match self {
            Self::Remote(publisher) => publisher.publish(event),
            Self::Local(publisher) => publisher.publish(event),
        }
    }

    fn stats(&self) -> PublisherStats {
        match self {
            Self::Remote(publisher) => publisher.stats(),
            Self::Local(publisher) => publisher.stats(),
        }
    }

    async fn close(&mut self) -> core::result::Result<PublisherStats, PublishError> {
        match self {
            Self::Remote(publisher) => publisher.close().await,
            Self::Local(publisher) => publisher.close().await,
        }
    }
}
