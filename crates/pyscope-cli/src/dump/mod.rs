mod call_tree;
mod sessions;

use std::io::Write;
use std::path::Path;

use miette::IntoDiagnostic;
use pyscope_publisher::LocalStoreReader;
use pyscope_tracer::event::SessionId;

/// Runs the subcommand for dumping the content of a local trace store.
pub async fn evaluate_dump(
    database: &Path,
    session: Option<String>,
    mut output: impl Write,
) -> miette::Result<()> {
    let reader = LocalStoreReader::open(database).await.into_diagnostic()?;

    let res = match session {
        Some(session) => dump_session(&reader, SessionId::from(session)).await,
        None => reader
            .sessions()
            .await
            .into_diagnostic()
            .map(|sessions| self::sessions::dump_to_kdl(&sessions)),
    };

    reader.close().await;

    let mut kdl = res?;

    kdl.autoformat();

    output
        .write_all(kdl.to_string().as_bytes())
        .into_diagnostic()?;

    Ok(())
}

async fn dump_session(
    reader: &LocalStoreReader,
    session: SessionId,
) -> miette::Result<kdl::KdlDocument> {
    let sessions = reader.sessions().await.into_diagnostic()?;

    miette::ensure!(
        sessions.iter().any(|stored| stored.id == session),
        "Session {session} not found"
    );

    let events = reader.events(&session).await.into_diagnostic()?;

    Ok(self::call_tree::dump_to_kdl(&events))
}
