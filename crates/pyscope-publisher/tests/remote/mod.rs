use std::time::{Duration, Instant};

use futures_util::StreamExt;
use pyscope_publisher::{Endpoint, QueueConfig, RemotePublisher, wire};
use pyscope_tracer::publisher::{PublishError, Publisher};
use pyscope_tracer::session::{Target, TraceSession};
use test_log::test;
use tokio::net::{TcpListener, UnixListener};
use tokio_util::codec::{FramedRead, LengthDelimitedCodec};

use crate::greet_events;

fn fast_config() -> QueueConfig {
    QueueConfig {
        capacity: 1024,
        retry_budget: 2,
        backoff: Duration::from_millis(10),
        close_timeout: Duration::from_secs(1),
        connect_timeout: Duration::from_millis(200),
    }
}

#[test(tokio::test)]
async fn tcp_delivers_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let monitor = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut frames = FramedRead::new(stream, LengthDelimitedCodec::new());

        let mut events = Vec::new();
        while let Some(frame) = frames.next().await {
            events.push(wire::decode_frame(&frame.unwrap()).unwrap());
        }
        events
    });

    let endpoint = Endpoint::Tcp {
        host: "127.0.0.1".to_owned(),
        port,
    };
    let mut publisher = RemotePublisher::new(endpoint, fast_config());
    let session = TraceSession::new(Target::Pid(1234));
    let events = greet_events(&session, 300);

    publisher.begin(&session).unwrap();
    for event in events.clone() {
        publisher.publish(event).unwrap();
    }

    let stats = publisher.close().await.unwrap();
    assert_eq!(stats.queued, 300);
    assert_eq!(stats.delivered, 300);
    assert_eq!(stats.dropped, 0);

    // the connection is closed by the publisher, ending the stream
    let received = monitor.await.unwrap();
    assert_eq!(received, events);
}

#[test(tokio::test)]
async fn ipc_delivers_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monitor.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let monitor = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut frames = FramedRead::new(stream, LengthDelimitedCodec::new());

        let mut events = Vec::new();
        while let Some(frame) = frames.next().await {
            events.push(wire::decode_frame(&frame.unwrap()).unwrap());
        }
        events
    });

    let mut publisher = RemotePublisher::new(Endpoint::Ipc(path), fast_config());
    let session = TraceSession::new(Target::Command(vec!["app.py".to_owned()]));
    let events = greet_events(&session, 10);

    publisher.begin(&session).unwrap();
    for event in events.clone() {
        publisher.publish(event).unwrap();
    }
    publisher.close().await.unwrap();

    assert_eq!(monitor.await.unwrap(), events);
}

#[test(tokio::test)]
async fn unreachable_endpoint_faults() {
    // grab a free port, and make sure nobody listens on it
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let endpoint = Endpoint::Tcp {
        host: "127.0.0.1".to_owned(),
        port,
    };
    let mut publisher = RemotePublisher::new(endpoint.clone(), fast_config());
    let session = TraceSession::new(Target::Pid(1234));
    let events = greet_events(&session, 20);

    publisher.begin(&session).unwrap();

    for event in events {
        // accepted until the worker gives up, rejected afterwards
        let _ = publisher.publish(event);
    }

    // wait for the retry budget to be exhausted
    let start = Instant::now();
    while !publisher.stats().faulted {
        assert!(start.elapsed() < Duration::from_secs(5), "never faulted");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let expected = PublishError::Unreachable {
        endpoint: endpoint.to_string(),
        attempts: 3,
    };

    let late = greet_events(&session, 1).remove(0);
    assert_eq!(publisher.publish(late), Err(expected.clone()));

    let start = Instant::now();
    assert_eq!(publisher.close().await, Err(expected.clone()));
    assert!(start.elapsed() < Duration::from_secs(2));

    let stats = publisher.stats();
    assert!(stats.faulted);
    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.dropped, 21);

    // closing twice is a no-op
    assert_eq!(publisher.close().await, Err(expected));
}
