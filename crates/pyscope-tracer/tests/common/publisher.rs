use std::sync::{Arc, Mutex};

use pyscope_tracer::event::{Event, SessionId};
use pyscope_tracer::publisher::{PublishError, Publisher, PublisherStats};
use pyscope_tracer::session::TraceSession;

/// What a [RecordingPublisher] observed.
#[derive(Debug, Default)]
pub struct Recorded {
    pub session: Option<SessionId>,
    pub events: Vec<Event>,
    pub closed: usize,
}

/// Publisher keeping every event in memory.
#[derive(Default, Clone)]
pub struct RecordingPublisher {
    pub recorded: Arc<Mutex<Recorded>>,

    /// Fail every publish call past this number of accepted events.
    pub fail_after: Option<(usize, PublishError)>,
}

impl RecordingPublisher {
    pub fn failing_after(count: usize, error: PublishError) -> Self {
        Self {
            fail_after: Some((count, error)),
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.recorded.lock().unwrap().events.clone()
    }

    pub fn closed(&self) -> usize {
        self.recorded.lock().unwrap().closed
    }
}

impl Publisher for RecordingPublisher {
    fn begin(&mut self, session: &TraceSession) -> Result<(), PublishError> {
        let mut recorded = self.recorded.lock().unwrap();

        match &recorded.session {
            Some(bound) => Err(PublishError::SessionMismatch {
                bound: bound.clone(),
                got: session.id().clone(),
            }),
            None => {
                recorded.session = Some(session.id().clone());
                Ok(())
            }
        }
    }

    fn publish(&mut self, event: Event) -> Result<(), PublishError> {
        let mut recorded = self.recorded.lock().unwrap();

        if let Some((count, error)) = &self.fail_after {
            if recorded.events.len() >= *count {
                return Err(error.clone());
            }
        }

        recorded.events.push(event);
        Ok(())
    }

    fn stats(&self) -> PublisherStats {
        let recorded = self.recorded.lock().unwrap();
        let delivered = recorded.events.len() as u64;

        PublisherStats {
            queued: delivered,
            delivered,
            dropped: 0,
            faulted: false,
        }
    }

    async fn close(&mut self) -> Result<PublisherStats, PublishError> {
        self.recorded.lock().unwrap().closed += 1;
        Ok(self.stats())
    }
}
