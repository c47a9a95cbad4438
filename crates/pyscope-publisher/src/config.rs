use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

/// Endpoint used when none is specified.
pub const DEFAULT_ENDPOINT: &str = "tcp://127.0.0.1:5556";

/// Database used when none is specified.
pub const DEFAULT_DATABASE: &str = "smiley.db";

/// Tuning of the outbound queue shared by all publishers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum number of pending events. Past this, the oldest is dropped.
    pub capacity: usize,

    /// Delivery retries before the sink is declared unreachable.
    pub retry_budget: u32,

    /// Delay before the first retry. Doubles after each attempt.
    pub backoff: Duration,

    /// Maximum time spent flushing pending events on close.
    pub close_timeout: Duration,

    /// Maximum time spent connecting to the sink.
    pub connect_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            retry_budget: 5,
            backoff: Duration::from_millis(50),
            close_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(1),
        }
    }
}

/// Remote endpoint of a [RemotePublisher](crate::RemotePublisher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `tcp://host:port`
    Tcp {
        /// Host name or address.
        host: String,

        /// TCP port.
        port: u16,
    },

    /// `ipc:///path/to/socket` (Unix domain socket).
    Ipc(PathBuf),
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::Tcp {
            host: "127.0.0.1".to_owned(),
            port: 5556,
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidEndpoint(s.to_owned());

        if let Some(path) = s.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::Ipc(PathBuf::from(path)));
        }

        let addr = s.strip_prefix("tcp://").ok_or_else(invalid)?;
        let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;

        // IPv6 literal, e.g. tcp://[::1]:5556
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if host.is_empty() {
            return Err(invalid());
        }

        Ok(Self::Tcp {
            host: host.to_owned(),
            port: port.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => write!(f, "tcp://[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Self::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}

/// Which publisher to build, see [ConfiguredPublisher](crate::ConfiguredPublisher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublisherConfig {
    /// Publish to a remote monitor.
    Remote(Endpoint),

    /// Persist into a local SQLite store.
    Local(PathBuf),
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self::Remote(Endpoint::default())
    }
}
