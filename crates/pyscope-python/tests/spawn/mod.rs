use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

use pyscope_publisher::{LocalPublisher, LocalStoreReader, QueueConfig};
use pyscope_python::{Error as PythonError, PythonRuntime};
use pyscope_tracer::event::EventKind;
use pyscope_tracer::filter::{CodeArea, FilterConfig};
use pyscope_tracer::runtime::{FrameInspector, Runtime, RuntimeEvent, RuntimeSession};
use pyscope_tracer::session::{SessionState, TraceMode};
use pyscope_tracer::tracer::Tracer;
use pyscope_tracer::{Command, Error};
use test_log::test;

use crate::{has_python, write_app};

#[test(tokio::test)]
async fn spawn_traces_selected_package_only() {
    if !has_python() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    write_app(dir.path());
    let db = dir.path().join("smiley.db");

    let tracer = Tracer::builder()
        .with_runtime(PythonRuntime::default())
        .with_publisher(LocalPublisher::new(&db, QueueConfig::default()))
        .filter(FilterConfig::new(false, false, ["foo"]).unwrap())
        .build();

    let command = Command::new("python3")
        .arg("main.py")
        .current_dir(dir.path());
    let session = tracer.spawn(command).await.unwrap();
    assert_eq!(session.session().mode(), TraceMode::Spawn);

    let report = session.trace().await.unwrap();
    assert_eq!(report.state, SessionState::Detached);
    assert_eq!(report.exit_code, Some(0));
    // the agent itself skips the rejected frames
    assert_eq!(report.events_seen, report.events_forwarded);
    assert_eq!(report.publisher.delivered, report.events_forwarded);

    let reader = LocalStoreReader::open(&db).await.unwrap();
    let events = reader.events(report.session.id()).await.unwrap();

    let calls: Vec<_> = events
        .iter()
        .filter_map(|event| match &event.kind {
            EventKind::Call {
                function,
                arguments,
                ..
            } => Some((function.as_str(), arguments)),
            _ => None,
        })
        .collect();

    // neither json (stdlib) nor __main__ (application, not selected)
    let names: Vec<_> = calls.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, ["foo.<module>", "foo.greet", "foo.fail"]);

    let greet = calls[1].1;
    assert_eq!(greet.get("name").map(String::as_str), Some("'world'"));
    assert_eq!(greet.get("count").map(String::as_str), Some("2"));

    assert!(events.iter().any(|event| matches!(
        &event.kind,
        EventKind::Return { value } if value.contains("hello world")
    )));
    assert!(events.iter().any(|event| matches!(
        &event.kind,
        EventKind::Exception { type_name, .. } if type_name == "KeyError"
    )));

    reader.close().await;
}

#[test(tokio::test)]
async fn agent_only_reports_accepted_frames() {
    if !has_python() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    write_app(dir.path());

    let mut runtime = PythonRuntime::default();
    let command = Command::new("python3")
        .arg("main.py")
        .current_dir(dir.path());
    let mut session = runtime.spawn(command).await.unwrap();

    session
        .set_filter(&FilterConfig::new(false, false, ["foo"]).unwrap())
        .await
        .unwrap();

    let mut modules = Vec::new();
    let exit_code = loop {
        match session.next_event().await.unwrap() {
            RuntimeEvent::Call(frame) | RuntimeEvent::Line(frame) => {
                modules.push(frame.location().module.clone());
                assert_eq!(frame.location().area, CodeArea::Application);
            }
            RuntimeEvent::Exited { exit_code } => break exit_code,
            _ => (),
        }
    };

    assert_eq!(exit_code, Some(0));
    assert!(!modules.is_empty());
    // neither json nor __main__
    assert!(modules.iter().all(|module| module == "foo"), "{modules:?}");
}

#[test(tokio::test)]
async fn unprintable_exception_is_reported() {
    if !has_python() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("smiley.db");
    std::fs::write(
        dir.path().join("app.py"),
        indoc::indoc! {r#"
            class Broken(Exception):
                def __str__(self):
                    raise RuntimeError("no str")


            def explode():
                raise Broken()


            try:
                explode()
            except Broken:
                pass
        "#},
    )
    .unwrap();

    let tracer = Tracer::builder()
        .with_runtime(PythonRuntime::default())
        .with_publisher(LocalPublisher::new(&db, QueueConfig::default()))
        .build();

    let command = Command::new("python3")
        .arg("app.py")
        .current_dir(dir.path());
    let report = tracer.spawn(command).await.unwrap().trace().await.unwrap();

    // the program is not disturbed by the hook
    assert_eq!(report.exit_code, Some(0));

    let reader = LocalStoreReader::open(&db).await.unwrap();
    let events = reader.events(report.session.id()).await.unwrap();
    reader.close().await;

    assert!(events.iter().any(|event| matches!(
        &event.kind,
        EventKind::Exception { type_name, message }
            if type_name == "Broken" && message == "<unprintable Broken>"
    )));
}

#[test(tokio::test)]
async fn exit_code_is_reported() {
    if !has_python() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();

    let tracer = Tracer::builder()
        .with_runtime(PythonRuntime::default())
        .with_publisher(LocalPublisher::new(
            dir.path().join("smiley.db"),
            QueueConfig::default(),
        ))
        .build();

    let command = Command::new("python3").args(["-c", "import sys; sys.exit(3)"]);
    let report = tracer.spawn(command).await.unwrap().trace().await.unwrap();

    assert_eq!(report.exit_code, Some(3));
}

#[test(tokio::test)]
async fn program_without_agent_exits_early() {
    let dir = tempfile::tempdir().unwrap();

    let tracer = Tracer::builder()
        .with_runtime(PythonRuntime::default())
        .with_publisher(LocalPublisher::new(
            dir.path().join("smiley.db"),
            QueueConfig::default(),
        ))
        .build();

    let Err(e) = tracer.spawn(Command::new("true")).await else {
        panic!("spawn succeeded");
    };

    assert!(
        matches!(e, Error::Spawn { source: PythonError::ExitedEarly(Some(0)), .. }),
        "{e:?}"
    );
}

#[test(tokio::test)]
async fn silent_program_times_out() {
    let dir = tempfile::tempdir().unwrap();

    let runtime = PythonRuntime::default().connect_timeout(Duration::from_millis(200));
    let tracer = Tracer::builder()
        .with_runtime(runtime)
        .with_publisher(LocalPublisher::new(
            dir.path().join("smiley.db"),
            QueueConfig::default(),
        ))
        .build();

    // a script gets its own process name, to find the child back
    let sleeper = dir.path().join("silent-sleeper");
    std::fs::write(&sleeper, "#!/bin/sh\nsleep 30\n").unwrap();
    std::fs::set_permissions(&sleeper, std::fs::Permissions::from_mode(0o755)).unwrap();

    let started = std::time::Instant::now();
    let Err(e) = tracer.spawn(Command::new(&sleeper)).await else {
        panic!("spawn succeeded");
    };

    assert!(
        matches!(e, Error::Spawn { source: PythonError::AgentTimeout(_), .. }),
        "{e:?}"
    );
    // the child was killed rather than waited for
    assert!(started.elapsed() < Duration::from_secs(10));
    // and reaped, no zombie is left behind
    assert!(own_children_named("silent-sleeper").is_empty());
}

/// PIDs of the children of this process (zombies included) named `comm`.
fn own_children_named(comm: &str) -> Vec<i32> {
    let me = std::process::id() as i32;

    procfs::process::all_processes()
        .unwrap()
        .filter_map(Result::ok)
        .filter_map(|p| p.stat().ok())
        .filter(|stat| stat.ppid == me && stat.comm == comm)
        .map(|stat| stat.pid)
        .collect()
}

#[test(tokio::test)]
async fn missing_program_fails_to_launch() {
    let dir = tempfile::tempdir().unwrap();

    let tracer = Tracer::builder()
        .with_runtime(PythonRuntime::default())
        .with_publisher(LocalPublisher::new(
            dir.path().join("smiley.db"),
            QueueConfig::default(),
        ))
        .build();

    let Err(e) = tracer
        .spawn(Command::new("/nonexistent/pyscope-test-program"))
        .await
    else {
        panic!("spawn succeeded");
    };

    assert!(
        matches!(e, Error::Spawn { source: PythonError::Launch { .. }, .. }),
        "{e:?}"
    );
}
