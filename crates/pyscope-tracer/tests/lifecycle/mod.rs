use std::sync::atomic::Ordering;
use std::time::Duration;

use pyscope_tracer::event::{EventKind, FrameId};
use pyscope_tracer::filter::{CodeArea, FilterConfig};
use pyscope_tracer::publisher::PublishError;
use pyscope_tracer::runtime::RuntimeEvent;
use pyscope_tracer::session::{SessionState, TraceMode};
use pyscope_tracer::tracer::Tracer;
use pyscope_tracer::{Command, Error};
use test_log::test;

use crate::common::{MockFrame, MockRuntime, RecordingPublisher};

fn call(thread_id: u64, frame_id: u64, module: &str, area: CodeArea) -> RuntimeEvent<MockFrame> {
    RuntimeEvent::Call(MockFrame::new(thread_id, frame_id, module, area))
}

fn line(thread_id: u64, frame_id: u64, module: &str, area: CodeArea) -> RuntimeEvent<MockFrame> {
    RuntimeEvent::Line(MockFrame::new(thread_id, frame_id, module, area))
}

fn ret(thread_id: u64, frame_id: u64) -> RuntimeEvent<MockFrame> {
    RuntimeEvent::Return {
        thread_id,
        frame_id: FrameId(frame_id),
        value: "'hi'".to_owned(),
    }
}

#[test(tokio::test)]
async fn spawn_traces_selected_package_only() {
    let (runtime, events) = MockRuntime::new();
    let runtime = runtime.with_exit_code(0);
    let hook_filter = runtime.filter.clone();
    let publisher = RecordingPublisher::default();

    let tracer = Tracer::builder()
        .with_runtime(runtime)
        .with_publisher(publisher.clone())
        .filter(FilterConfig::new(false, false, ["foo"]).unwrap())
        .build();

    let session = tracer
        .spawn(Command::new("python3").args(["-m", "foo"]))
        .await
        .unwrap();

    assert_eq!(session.session().mode(), TraceMode::Spawn);

    // the hook is told what the tracer accepts
    assert_eq!(
        *hook_filter.lock().unwrap(),
        Some(FilterConfig::new(false, false, ["foo"]).unwrap())
    );

    // foo.greet() calls json.dumps()
    for event in [
        call(1, 1, "foo", CodeArea::Application),
        line(1, 1, "foo", CodeArea::Application),
        call(1, 2, "json", CodeArea::Stdlib),
        line(1, 2, "json", CodeArea::Stdlib),
        ret(1, 2),
        ret(1, 1),
    ] {
        events.send(event).unwrap();
    }
    drop(events);

    let report = session.trace().await.unwrap();

    assert_eq!(report.state, SessionState::Detached);
    assert_eq!(report.exit_code, Some(0));
    assert_eq!(report.events_seen, 6);
    assert_eq!(report.events_forwarded, 3);

    let published = publisher.events();
    let kinds: Vec<_> = published.iter().map(|e| e.kind.tag()).collect();
    assert_eq!(kinds, ["call", "line", "return"]);
    assert!(published.iter().all(|e| e.frame_id == FrameId(1)));
    assert!(
        published
            .iter()
            .all(|e| e.session_id == *report.session.id())
    );
    assert!(matches!(
        &published[0].kind,
        EventKind::Call { function, .. } if function == "foo.func_1"
    ));
    assert!(
        published
            .windows(2)
            .all(|w| w[0].timestamp_us <= w[1].timestamp_us)
    );
    assert_eq!(publisher.closed(), 1);
}

#[test(tokio::test)]
async fn detach_is_idempotent() {
    let (runtime, events) = MockRuntime::new();
    let detach_calls = runtime.detach_calls.clone();
    let wait_calls = runtime.wait_calls.clone();
    let publisher = RecordingPublisher::default();

    let tracer = Tracer::builder()
        .with_runtime(runtime)
        .with_publisher(publisher.clone())
        .build();

    let session = tracer.attach(42).await.unwrap();
    assert_eq!(session.process_id(), 42);
    assert_eq!(session.session().mode(), TraceMode::Attach);

    let handle = session.detach_handle();

    events
        .send(call(1, 1, "app", CodeArea::Application))
        .unwrap();

    let (report, ()) = tokio::join!(session.trace(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.detach();
        handle.detach();
    });
    let report = report.unwrap();

    // the session is over, this must be a no-op
    handle.detach();

    assert!(handle.is_detach_requested());
    assert_eq!(report.state, SessionState::Detached);
    assert_eq!(report.exit_code, None);
    assert_eq!(publisher.events().len(), 1);
    assert_eq!(publisher.closed(), 1);
    assert_eq!(detach_calls.load(Ordering::SeqCst), 1);
    assert_eq!(wait_calls.load(Ordering::SeqCst), 0);

    // the target is not notified of anything once detached
    assert!(events.send(ret(1, 1)).is_err());
}

#[test(tokio::test)]
async fn detached_child_is_reaped() {
    let (runtime, _events) = MockRuntime::new();
    let runtime = runtime.with_exit_code(3);
    let wait_calls = runtime.wait_calls.clone();

    let tracer = Tracer::builder()
        .with_runtime(runtime)
        .with_publisher(RecordingPublisher::default())
        .build();

    let session = tracer.spawn(Command::new("app.py")).await.unwrap();
    session.detach_handle().detach();

    let report = session.trace().await.unwrap();

    assert_eq!(report.state, SessionState::Detached);
    assert_eq!(report.exit_code, Some(3));
    assert_eq!(wait_calls.load(Ordering::SeqCst), 1);
}

#[test(tokio::test)]
async fn detached_child_still_running_is_left_alone() {
    let (runtime, _events) = MockRuntime::new();
    let runtime = runtime.keeps_running();
    let wait_calls = runtime.wait_calls.clone();
    let publisher = RecordingPublisher::default();

    let tracer = Tracer::builder()
        .with_runtime(runtime)
        .with_publisher(publisher.clone())
        .reap_timeout(Duration::from_millis(50))
        .build();

    let session = tracer.spawn(Command::new("server.py")).await.unwrap();
    session.detach_handle().detach();

    let report = tokio::time::timeout(Duration::from_secs(5), session.trace())
        .await
        .expect("detach hung")
        .unwrap();

    assert_eq!(report.state, SessionState::Detached);
    assert_eq!(report.exit_code, None);
    assert_eq!(wait_calls.load(Ordering::SeqCst), 1);
    assert_eq!(publisher.closed(), 1);
}

#[test(tokio::test)]
async fn faulted_spawn_does_not_wait_for_child() {
    let (runtime, events) = MockRuntime::new();
    let runtime = runtime.keeps_running();
    let error = PublishError::Unreachable {
        endpoint: "tcp://127.0.0.1:5556".to_owned(),
        attempts: 5,
    };

    let tracer = Tracer::builder()
        .with_runtime(runtime)
        .with_publisher(RecordingPublisher::failing_after(0, error.clone()))
        .reap_timeout(Duration::from_millis(50))
        .build();

    let session = tracer.spawn(Command::new("server.py")).await.unwrap();

    events
        .send(call(1, 1, "app", CodeArea::Application))
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), session.trace())
        .await
        .expect("fault hung");

    let Err(Error::Faulted { report, source }) = result else {
        panic!("session should fault");
    };

    assert_eq!(source, error);
    assert_eq!(report.state, SessionState::Faulted);
    assert_eq!(report.exit_code, None);
}

#[test(tokio::test)]
async fn unreachable_publisher_faults_session() {
    let (runtime, events) = MockRuntime::new();
    let detach_calls = runtime.detach_calls.clone();
    let error = PublishError::Unreachable {
        endpoint: "tcp://127.0.0.1:5556".to_owned(),
        attempts: 5,
    };
    let publisher = RecordingPublisher::failing_after(1, error.clone());

    let tracer = Tracer::builder()
        .with_runtime(runtime)
        .with_publisher(publisher.clone())
        .build();

    let session = tracer.attach(7).await.unwrap();

    events
        .send(call(1, 1, "app", CodeArea::Application))
        .unwrap();
    events
        .send(call(1, 2, "app", CodeArea::Application))
        .unwrap();

    let Err(Error::Faulted { report, source }) = session.trace().await else {
        panic!("session should fault");
    };

    assert_eq!(source, error);
    assert_eq!(report.state, SessionState::Faulted);
    assert_eq!(report.events_forwarded, 1);
    assert_eq!(report.publish_failures, 1);
    assert_eq!(detach_calls.load(Ordering::SeqCst), 1);
    assert_eq!(publisher.closed(), 1);
}

#[test(tokio::test)]
async fn transient_failures_are_tolerated() {
    let (runtime, events) = MockRuntime::new();
    let publisher = RecordingPublisher::failing_after(0, PublishError::Sink("busy".to_owned()));

    let tracer = Tracer::builder()
        .with_runtime(runtime)
        .with_publisher(publisher)
        .failure_threshold(10)
        .build();

    let session = tracer.attach(7).await.unwrap();

    events
        .send(call(1, 1, "app", CodeArea::Application))
        .unwrap();
    events
        .send(line(1, 1, "app", CodeArea::Application))
        .unwrap();
    events.send(ret(1, 1)).unwrap();
    drop(events);

    let report = session.trace().await.unwrap();

    assert_eq!(report.state, SessionState::Detached);
    assert_eq!(report.events_forwarded, 0);
    assert_eq!(report.publish_failures, 3);
}

#[test(tokio::test)]
async fn attach_failure_releases_publisher() {
    let publisher = RecordingPublisher::default();

    let tracer = Tracer::builder()
        .with_runtime(MockRuntime::failing())
        .with_publisher(publisher.clone())
        .build();

    let result = tracer.attach(7).await;

    assert!(matches!(result, Err(Error::Attach { pid: 7, .. })));
    assert_eq!(publisher.closed(), 1);
    assert!(publisher.events().is_empty());

    // the publisher is only bound once the hook is installed
    assert!(publisher.recorded.lock().unwrap().session.is_none());
}

#[test(tokio::test)]
async fn failed_attach_stores_no_session() {
    use pyscope_publisher::{LocalPublisher, LocalStoreReader, QueueConfig};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("smiley.db");

    // a store already holding a traced session
    let (runtime, events) = MockRuntime::new();
    drop(events);
    let tracer = Tracer::builder()
        .with_runtime(runtime)
        .with_publisher(LocalPublisher::new(&path, QueueConfig::default()))
        .build();
    let traced = tracer.attach(1).await.unwrap().trace().await.unwrap();

    let tracer = Tracer::builder()
        .with_runtime(MockRuntime::failing())
        .with_publisher(LocalPublisher::new(&path, QueueConfig::default()))
        .build();
    assert!(matches!(
        tracer.attach(7).await,
        Err(Error::Attach { pid: 7, .. })
    ));

    let reader = LocalStoreReader::open(&path).await.unwrap();
    let sessions = reader.sessions().await.unwrap();
    reader.close().await;

    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, *traced.session.id());
}

#[test(tokio::test)]
async fn bound_publisher_is_rejected() {
    let (runtime, _events) = MockRuntime::new();
    let detach_calls = runtime.detach_calls.clone();
    let publisher = RecordingPublisher::default();
    publisher.recorded.lock().unwrap().session = Some("previous".into());

    let tracer = Tracer::builder()
        .with_runtime(runtime)
        .with_publisher(publisher)
        .build();

    let result = tracer.spawn(Command::new("app.py")).await;

    assert!(matches!(
        result,
        Err(Error::Publish(PublishError::SessionMismatch { .. }))
    ));

    // the hook installed in the meantime is removed
    assert_eq!(detach_calls.load(Ordering::SeqCst), 1);
}

#[test(tokio::test)]
async fn unreachable_monitor_faults_without_hanging() {
    use pyscope_publisher::{Endpoint, QueueConfig, RemotePublisher};

    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let config = QueueConfig {
        retry_budget: 1,
        backoff: Duration::from_millis(10),
        close_timeout: Duration::from_millis(500),
        ..Default::default()
    };
    let endpoint = Endpoint::Tcp {
        host: "127.0.0.1".to_owned(),
        port,
    };

    let (runtime, events) = MockRuntime::new();
    let tracer = Tracer::builder()
        .with_runtime(runtime)
        .with_publisher(RemotePublisher::new(endpoint, config))
        .build();

    let session = tracer.attach(99).await.unwrap();

    let feeder = async {
        for frame_id in 0.. {
            let event = call(1, frame_id, "app", CodeArea::Application);
            if events.send(event).is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        std::future::pending::<()>().await;
    };

    let result = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::select! {
            result = session.trace() => result,
            () = feeder => unreachable!(),
        }
    })
    .await
    .expect("detach hung");

    let Err(Error::Faulted { report, source }) = result else {
        panic!("session should fault");
    };

    assert!(matches!(source, PublishError::Unreachable { attempts: 2, .. }));
    assert_eq!(report.state, SessionState::Faulted);
    assert!(report.publisher.faulted);
    assert!(report.publisher.dropped > 0);
}
