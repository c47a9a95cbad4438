use std::future::Future;

use crate::event::{Event, SessionId};
use crate::session::TraceSession;

/// Trait for implementing an event publisher.
///
/// A publisher delivers the events accepted by the tracer to some sink
/// (e.g., a remote monitor, a local store). It is bound to a **single**
/// session with [begin](Self::begin), and must deliver events in the order
/// [publish](Self::publish) was called.
///
/// # Note
///
/// [publish](Self::publish) is called inline by the tracer for every accepted
/// event, so it must never block. Implementors are expected to hand events
/// over to a background worker through a bounded queue.
pub trait Publisher {
    /// Binds the publisher to the given session.
    ///
    /// Binding a publisher twice is an error.
    fn begin(&mut self, session: &TraceSession) -> Result<(), PublishError>;

    /// Hands an event over to the publisher.
    fn publish(&mut self, event: Event) -> Result<(), PublishError>;

    /// Returns a snapshot of the publisher statistics.
    fn stats(&self) -> PublisherStats;

    /// Flushes pending events (within a bounded time) and releases the sink.
    ///
    /// Closing a publisher twice is a no-op.
    fn close(&mut self) -> impl Future<Output = Result<PublisherStats, PublishError>>;
}

/// Statistics of a [Publisher].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    /// Events accepted into the outbound queue.
    pub queued: u64,

    /// Events delivered to the sink.
    pub delivered: u64,

    /// Events dropped (queue overflow, unreachable sink, close timeout).
    pub dropped: u64,

    /// Whether the sink was declared unreachable.
    pub faulted: bool,
}

/// Publisher error.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The publisher was used before being bound to a session.
    #[error("publisher is not bound to a session")]
    NotBound,

    /// The publisher is bound to another session.
    #[error("publisher is bound to session {bound}, not {got}")]
    SessionMismatch {
        /// Session the publisher is bound to.
        bound: SessionId,

        /// Session of the rejected operation.
        got: SessionId,
    },

    /// The publisher was closed.
    #[error("publisher is closed")]
    Closed,

    /// The sink stayed unreachable after exhausting the retry budget.
    #[error("{endpoint} unreachable after {attempts} attempts")]
    Unreachable {
        /// Endpoint URL or storage path.
        endpoint: String,

        /// Delivery attempts made.
        attempts: u32,
    },

    /// Any other sink-specific error.
    #[error("sink error: {0}")]
    Sink(String),
}

impl PublishError {
    /// Returns whether retrying is pointless (the session must fault).
    pub const fn is_persistent(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Closed)
    }
}
