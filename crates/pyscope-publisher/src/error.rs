/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Endpoint URL could not be parsed.
    #[error("invalid endpoint {0:?} (expected tcp://host:port or ipc:///path)")]
    InvalidEndpoint(String),

    /// The sink was used before being connected.
    #[error("sink is not connected")]
    NotConnected,

    /// Connecting to the sink took too long.
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    /// SQLite error.
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// Wire encoding error.
    #[error(transparent)]
    Encode(#[from] rmp_serde::encode::Error),

    /// Wire decoding error.
    #[error(transparent)]
    Decode(#[from] rmp_serde::decode::Error),

    /// Payload (de)serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Stored row could not be turned back into an event.
    #[error("corrupted record {seq} of session {session}")]
    CorruptedRecord {
        /// Session of the record.
        session: String,

        /// Sequence number of the record.
        seq: i64,
    },

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
