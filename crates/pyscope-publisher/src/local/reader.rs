use std::path::Path;
use std::time::Duration;

use pyscope_tracer::event::{Event, FrameId, SessionId};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::{Error, Result};
use crate::wire;

/// Summary of a session persisted in a local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    /// Session ID.
    pub id: SessionId,

    /// Traced target (pid, or command line).
    pub target: String,

    /// `attach` or `spawn`.
    pub mode: String,

    /// Wall-clock start of the session, in microseconds since the epoch.
    pub started_at_us: u64,

    /// Number of persisted events.
    pub events: u64,
}

/// Reader of a local store written by a [LocalPublisher](crate::LocalPublisher).
pub struct LocalStoreReader {
    pool: SqlitePool,
}

impl LocalStoreReader {
    /// Opens an existing local store, read-only.
    ///
    /// The store is left untouched: no schema migration is applied, and its
    /// journal mode is kept.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .busy_timeout(Duration::from_secs(1));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Returns the persisted sessions, oldest first.
    pub async fn sessions(&self) -> Result<Vec<StoredSession>> {
        let rows: Vec<(String, String, String, i64, i64)> = sqlx::query_as(
            "SELECT s.session_id, s.target, s.mode, s.started_at_us, COUNT(e.seq) \
             FROM sessions s LEFT JOIN events e ON e.session_id = s.session_id \
             GROUP BY s.session_id \
             ORDER BY s.started_at_us, s.session_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, target, mode, started_at_us, events)| StoredSession {
                id: id.into(),
                target,
                mode,
                started_at_us: started_at_us as u64,
                events: events as u64,
            })
            .collect())
    }

    /// Returns the events of a session, in publication order.
    pub async fn events(&self, session: &SessionId) -> Result<Vec<Event>> {
        let rows: Vec<(i64, i64, i64, i64, String, String)> = sqlx::query_as(
            "SELECT seq, timestamp_us, thread_id, frame_id, kind, payload \
             FROM events WHERE session_id = ? ORDER BY seq",
        )
        .bind(session.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(seq, timestamp_us, thread_id, frame_id, kind, payload)| {
                let kind = wire::join_kind(&kind, &payload).map_err(|e| {
                    tracing::debug!(error = %e, seq, "undecodable record");
                    Error::CorruptedRecord {
                        session: session.to_string(),
                        seq,
                    }
                })?;

                Ok(Event {
                    session_id: session.clone(),
                    timestamp_us: timestamp_us as u64,
                    thread_id: thread_id as u64,
                    frame_id: FrameId(frame_id as u64),
                    kind,
                })
            })
            .collect()
    }

    /// Closes the store.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
