use std::time::Duration;

use futures_util::SinkExt;
use pyscope_tracer::event::Event;
use pyscope_tracer::session::TraceSession;
use tokio::io::AsyncWrite;
use tokio::net::{TcpStream, UnixStream};
use tokio_util::bytes::Bytes;
use tokio_util::codec::{FramedWrite, LengthDelimitedCodec};

use crate::config::{Endpoint, QueueConfig};
use crate::error::{Error, Result};
use crate::sink::{QueuedPublisher, Sink};
use crate::wire;

/// Publisher sending events to a remote monitor.
///
/// Every event is sent as one length-delimited frame, see
/// [encode_frame](crate::wire::encode_frame).
pub type RemotePublisher = QueuedPublisher<RemoteSink>;

impl RemotePublisher {
    /// Creates a publisher for the given endpoint.
    ///
    /// The connection is only made once the publisher is bound to a session.
    pub fn new(endpoint: Endpoint, config: QueueConfig) -> Self {
        let sink = RemoteSink {
            connect_timeout: config.connect_timeout,
            endpoint,
            framed: None,
        };

        Self::with_sink(sink, config)
    }
}

type Transport = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, LengthDelimitedCodec>;

/// Message socket connected to a remote monitor.
pub struct RemoteSink {
    endpoint: Endpoint,
    connect_timeout: Duration,
    framed: Option<Transport>,
}

async fn open(endpoint: &Endpoint) -> Result<Box<dyn AsyncWrite + Send + Unpin>> {
    let stream: Box<dyn AsyncWrite + Send + Unpin> = match endpoint {
        Endpoint::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port)).await?;
            stream.set_nodelay(true)?;
            Box::new(stream)
        }
        Endpoint::Ipc(path) => Box::new(UnixStream::connect(path).await?),
    };

    Ok(stream)
}

impl Sink for RemoteSink {
    fn describe(&self) -> String {
        self.endpoint.to_string()
    }

    async fn connect(&mut self, _session: &TraceSession) -> Result<()> {
        self.framed = None;

        let stream = tokio::time::timeout(self.connect_timeout, open(&self.endpoint))
            .await
            .map_err(|_| Error::ConnectTimeout(self.endpoint.to_string()))??;

        self.framed = Some(FramedWrite::new(stream, LengthDelimitedCodec::new()));

        Ok(())
    }

    async fn deliver(&mut self, events: &[Event]) -> Result<()> {
        let framed = self.framed.as_mut().ok_or(Error::NotConnected)?;

        for event in events {
            let frame = wire::encode_frame(event)?;
            SinkExt::<Bytes>::feed(&mut *framed, frame)
                .await
                .map_err(Error::Io)?;
        }

        SinkExt::<Bytes>::flush(&mut *framed).await.map_err(Error::Io)?;

        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(mut framed) = self.framed.take() {
            SinkExt::<Bytes>::close(&mut framed)
                .await
                .map_err(Error::Io)?;
        }
        Ok(())
    }
}
