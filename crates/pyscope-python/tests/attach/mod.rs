use std::process::Stdio;
use std::time::Duration;

use indoc::indoc;
use pyscope_publisher::{LocalPublisher, QueueConfig};
use pyscope_python::{Error as PythonError, PythonRuntime, agent};
use pyscope_tracer::Error;
use pyscope_tracer::session::{SessionState, TraceMode};
use pyscope_tracer::tracer::Tracer;
use test_log::test;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::has_python;

fn tracer(
    runtime: PythonRuntime,
    dir: &std::path::Path,
) -> Tracer<PythonRuntime, LocalPublisher> {
    Tracer::builder()
        .with_runtime(runtime)
        .with_publisher(LocalPublisher::new(
            dir.join("smiley.db"),
            QueueConfig::default(),
        ))
        .build()
}

#[test(tokio::test)]
async fn process_without_agent_is_refused() {
    let dir = tempfile::tempdir().unwrap();

    let mut sleeper = tokio::process::Command::new("sleep")
        .arg("30")
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let pid = sleeper.id().unwrap();

    let Err(e) = tracer(PythonRuntime::default(), dir.path()).attach(pid).await else {
        panic!("attach succeeded");
    };
    assert!(
        matches!(e, Error::Attach { source: PythonError::Refused { .. }, .. }),
        "{e:?}"
    );

    // the target was left untouched
    assert!(sleeper.try_wait().unwrap().is_none());
}

#[test(tokio::test)]
async fn unknown_process_is_not_found() {
    let dir = tempfile::tempdir().unwrap();

    // pid_max is at most 2^22 on Linux
    let pid = 1 << 23;

    let Err(e) = tracer(PythonRuntime::default(), dir.path()).attach(pid).await else {
        panic!("attach succeeded");
    };
    assert!(
        matches!(e, Error::Attach { source: PythonError::ProcessNotFound(p), .. } if p == pid),
        "{e:?}"
    );
}

#[test(tokio::test)]
async fn attach_then_detach_leaves_target_running() {
    if !has_python() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let agent_dir = dir.path().join("agent");
    let control_dir = dir.path().join("control");
    agent::install(&agent_dir).await.unwrap();
    std::fs::create_dir_all(&control_dir).unwrap();

    let script = indoc! {r#"
        import time


        def tick(i):
            return i * 2


        print("ready", flush=True)
        i = 0
        while True:
            tick(i)
            i += 1
            time.sleep(0.01)
    "#};

    let mut target = tokio::process::Command::new("python3")
        .args(["-c", script])
        .env("PYTHONPATH", &agent_dir)
        .env(agent::LISTEN_ENV, "1")
        .env(agent::CONTROL_DIR_ENV, &control_dir)
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let pid = target.id().unwrap();

    // the agent listens before user code runs
    let stdout = target.stdout.take().unwrap();
    let mut lines = BufReader::new(stdout).lines();
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ready"));

    let runtime = PythonRuntime::default().control_dir(&control_dir);
    let session = tracer(runtime, dir.path()).attach(pid).await.unwrap();
    assert_eq!(session.session().mode(), TraceMode::Attach);
    assert_eq!(session.process_id(), pid);

    let detach = session.detach_handle();
    let trace = tokio::spawn(session.trace());

    tokio::time::sleep(Duration::from_millis(500)).await;
    detach.detach();

    let report = trace.await.unwrap().unwrap();
    assert_eq!(report.state, SessionState::Detached);
    assert_eq!(report.exit_code, None);
    assert!(report.events_forwarded > 0);

    // the target keeps running, untraced
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(target.try_wait().unwrap().is_none());
    assert!(!agent::attach_socket(&control_dir, pid).exists());

    target.kill().await.unwrap();
}
