mod reader;

use std::path::{Path, PathBuf};
use std::time::Duration;

use pyscope_tracer::event::Event;
use pyscope_tracer::session::TraceSession;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub use self::reader::{LocalStoreReader, StoredSession};
use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::sink::{QueuedPublisher, Sink};
use crate::wire;

/// Publisher persisting events into a local SQLite store.
///
/// The store is created if absent, and may hold many sessions. Events of a
/// session are appended in order, one transaction per delivered batch.
pub type LocalPublisher = QueuedPublisher<LocalSink>;

impl LocalPublisher {
    /// Creates a publisher for the store at `path`.
    ///
    /// The store is only opened once the publisher is bound to a session.
    pub fn new(path: impl Into<PathBuf>, config: QueueConfig) -> Self {
        let sink = LocalSink {
            path: path.into(),
            busy_timeout: config.connect_timeout,
            store: None,
        };

        Self::with_sink(sink, config)
    }
}

/// Opens the store at `path` for writing, creating it and applying the
/// schema migrations if needed.
async fn open_store(path: &Path, busy_timeout: Duration) -> Result<SqlitePool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(sqlx::Error::from)?;

    Ok(pool)
}

/// Session-scoped append stream into a local store.
pub struct LocalSink {
    path: PathBuf,
    busy_timeout: Duration,
    store: Option<OpenStore>,
}

struct OpenStore {
    pool: SqlitePool,
    session_id: String,

    /// Sequence number of the next appended event.
    next_seq: i64,
}

impl Sink for LocalSink {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn connect(&mut self, session: &TraceSession) -> Result<()> {
        if let Some(store) = self.store.take() {
            store.pool.close().await;
        }

        let pool = open_store(&self.path, self.busy_timeout).await?;
        let session_id = session.id().to_string();

        sqlx::query(
            "INSERT OR IGNORE INTO sessions (session_id, target, mode, started_at_us) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(session_id.as_str())
        .bind(session.target().to_string())
        .bind(session.mode().label())
        .bind(session.started_at_us() as i64)
        .execute(&pool)
        .await?;

        let (last_seq,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(seq) FROM events WHERE session_id = ?")
                .bind(session_id.as_str())
                .fetch_one(&pool)
                .await?;

        self.store = Some(OpenStore {
            pool,
            session_id,
            next_seq: last_seq.map_or(0, |seq| seq + 1),
        });

        Ok(())
    }

    async fn deliver(&mut self, events: &[Event]) -> Result<()> {
        let store = self.store.as_mut().ok_or(Error::NotConnected)?;

        let mut tx = store.pool.begin().await?;
        let mut seq = store.next_seq;

        for event in events {
            let (kind, payload) = wire::split_kind(&event.kind)?;

            sqlx::query(
                "INSERT INTO events \
                 (session_id, seq, timestamp_us, thread_id, frame_id, kind, payload) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(store.session_id.as_str())
            .bind(seq)
            .bind(event.timestamp_us as i64)
            .bind(event.thread_id as i64)
            .bind(event.frame_id.0 as i64)
            .bind(kind)
            .bind(payload)
            .execute(&mut *tx)
            .await?;

            seq += 1;
        }

        tx.commit().await?;
        store.next_seq = seq;

        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(store) = self.store.take() {
            store.pool.close().await;
        }
        Ok(())
    }
}
