use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crossbeam::queue::ArrayQueue;
use pyscope_tracer::event::Event;
use pyscope_tracer::publisher::{PublishError, PublisherStats};
use tokio::sync::Notify;

/// Bounded queue of events waiting to be delivered by a worker.
///
/// Pushing never blocks: when the queue is full, the oldest pending event is
/// evicted and counted as dropped.
pub(crate) struct OutboundQueue {
    events: ArrayQueue<Event>,

    /// Wakes the worker up (events pushed, or closing).
    wakeup: Notify,

    closing: AtomicBool,

    /// Events popped by the worker but not delivered yet.
    in_flight: AtomicUsize,

    queued: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,

    fault: Mutex<Option<PublishError>>,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: ArrayQueue::new(capacity.max(1)),
            wakeup: Notify::new(),
            closing: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            queued: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            fault: Mutex::new(None),
        }
    }

    /// Enqueues an event, evicting the oldest one if the queue is full.
    pub fn push(&self, event: Event) {
        self.queued.fetch_add(1, Ordering::Relaxed);

        if self.events.force_push(event).is_some() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped.is_power_of_two() {
                tracing::warn!(dropped, "outbound queue full, dropping oldest events");
            }
        }

        self.wakeup.notify_one();
    }

    /// Pops up to `max` events, marking them in flight.
    pub fn pop_batch(&self, max: usize) -> Vec<Event> {
        let batch: Vec<_> = std::iter::from_fn(|| self.events.pop()).take(max).collect();
        self.in_flight.store(batch.len(), Ordering::Release);
        batch
    }

    /// Marks the in-flight events as delivered.
    pub fn delivered(&self) {
        let count = self.in_flight.swap(0, Ordering::AcqRel);
        self.delivered.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Drops the in-flight and pending events, returning how many were lost.
    pub fn discard(&self) -> u64 {
        let mut count = self.in_flight.swap(0, Ordering::AcqRel) as u64;
        while self.events.pop().is_some() {
            count += 1;
        }

        self.count_dropped(count);
        count
    }

    pub fn count_dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Waits for events to be pushed, or for the queue to be closed.
    pub async fn wait(&self) {
        self.wakeup.notified().await;
    }

    /// Asks the worker to flush what is pending and stop.
    pub fn close(&self) {
        self.closing.store(true, Ordering::Release);
        self.wakeup.notify_one();
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Declares the sink unreachable.
    pub fn set_fault(&self, error: PublishError) {
        if let Ok(mut fault) = self.fault.lock() {
            fault.get_or_insert(error);
        }
    }

    pub fn fault(&self) -> Option<PublishError> {
        self.fault.lock().ok().and_then(|fault| fault.clone())
    }

    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            queued: self.queued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            faulted: self.fault().is_some(),
        }
    }
}
