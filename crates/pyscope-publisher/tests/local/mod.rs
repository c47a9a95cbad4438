use pyscope_publisher::{LocalPublisher, LocalStoreReader, QueueConfig};
use pyscope_tracer::event::SessionId;
use pyscope_tracer::publisher::{PublishError, Publisher};
use pyscope_tracer::session::{Target, TraceSession};
use test_log::test;

use crate::greet_events;

#[test(tokio::test)]
async fn store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traces").join("smiley.db");

    let session = TraceSession::new(Target::Pid(4242));
    let events = greet_events(&session, 50);

    let mut publisher = LocalPublisher::new(&path, QueueConfig::default());
    publisher.begin(&session).unwrap();
    for event in events.clone() {
        publisher.publish(event).unwrap();
    }

    let stats = publisher.close().await.unwrap();
    assert_eq!(stats.delivered, 50);

    let reader = LocalStoreReader::open(&path).await.unwrap();

    let sessions = reader.sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, *session.id());
    assert_eq!(sessions[0].target, "pid 4242");
    assert_eq!(sessions[0].mode, "attach");
    assert_eq!(sessions[0].started_at_us, session.started_at_us());
    assert_eq!(sessions[0].events, 50);

    assert_eq!(reader.events(session.id()).await.unwrap(), events);
}

#[test(tokio::test)]
async fn sessions_are_kept_apart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("smiley.db");

    let first = TraceSession::new(Target::Pid(1));
    let second = TraceSession::new(Target::Command(vec!["app.py".to_owned()]));

    for (session, count) in [(&first, 3), (&second, 6)] {
        let mut publisher = LocalPublisher::new(&path, QueueConfig::default());
        publisher.begin(session).unwrap();
        for event in greet_events(session, count) {
            publisher.publish(event).unwrap();
        }
        publisher.close().await.unwrap();
    }

    let reader = LocalStoreReader::open(&path).await.unwrap();

    let counts: Vec<_> = reader
        .sessions()
        .await
        .unwrap()
        .into_iter()
        .map(|s| (s.id, s.events))
        .collect();
    assert!(counts.contains(&(first.id().clone(), 3)));
    assert!(counts.contains(&(second.id().clone(), 6)));

    let events = reader.events(second.id()).await.unwrap();
    assert_eq!(events, greet_events(&second, 6));
    assert!(reader.events(&SessionId::from("unknown")).await.unwrap().is_empty());
}

#[test(tokio::test)]
async fn publisher_is_bound_to_one_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut publisher = LocalPublisher::new(dir.path().join("smiley.db"), QueueConfig::default());

    let session = TraceSession::new(Target::Pid(1));
    let other = TraceSession::new(Target::Pid(2));

    let event = greet_events(&session, 1).remove(0);
    assert_eq!(publisher.publish(event), Err(PublishError::NotBound));

    publisher.begin(&session).unwrap();
    assert!(matches!(
        publisher.begin(&other),
        Err(PublishError::SessionMismatch { .. })
    ));

    let foreign = greet_events(&other, 1).remove(0);
    assert_eq!(
        publisher.publish(foreign),
        Err(PublishError::SessionMismatch {
            bound: session.id().clone(),
            got: other.id().clone(),
        })
    );

    publisher.close().await.unwrap();

    let event = greet_events(&session, 1).remove(0);
    assert_eq!(publisher.publish(event), Err(PublishError::Closed));
}

#[test(tokio::test)]
async fn missing_store_is_not_created_by_reader() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.db");

    assert!(LocalStoreReader::open(&path).await.is_err());
    assert!(!path.exists());
}

#[test(tokio::test)]
async fn reader_leaves_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("smiley.db");

    let session = TraceSession::new(Target::Pid(7));
    let mut publisher = LocalPublisher::new(&path, QueueConfig::default());
    publisher.begin(&session).unwrap();
    for event in greet_events(&session, 6) {
        publisher.publish(event).unwrap();
    }
    publisher.close().await.unwrap();

    let before = std::fs::read(&path).unwrap();

    let reader = LocalStoreReader::open(&path).await.unwrap();
    assert_eq!(reader.sessions().await.unwrap().len(), 1);
    assert_eq!(reader.events(session.id()).await.unwrap().len(), 6);
    reader.close().await;

    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test(tokio::test)]
async fn reader_does_not_migrate_foreign_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("other.db");

    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let pool = sqlx::SqlitePool::connect_with(options).await.unwrap();
    sqlx::query("CREATE TABLE notes (body TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let reader = LocalStoreReader::open(&path).await.unwrap();
    assert!(reader.sessions().await.is_err());
    reader.close().await;

    let pool = sqlx::SqlitePool::connect_with(
        sqlx::sqlite::SqliteConnectOptions::new().filename(&path),
    )
    .await
    .unwrap();
    let (tables,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(tables, 1);
}
