use std::io::Write;
use std::sync::Arc;

use miette::IntoDiagnostic;
use pyscope_tracer::session::SessionReport;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cli::CliTraceArgs;
use crate::config::TraceSettings;
use crate::session::{build_tracer, error_chain, summary, trace_until};

/// Runs the subcommand for attaching to running processes.
///
/// Every process is traced by its own task, so that one failing process
/// does not prevent the others from being traced.
pub async fn evaluate_attach(
    trace_args: CliTraceArgs,
    pids: Vec<u32>,
    shutdown: CancellationToken,
    mut output: impl Write,
) -> miette::Result<()> {
    let settings = Arc::new(TraceSettings::from_args(&trace_args)?);

    let mut tasks = JoinSet::new();

    for pid in pids.iter().copied() {
        let settings = Arc::clone(&settings);
        let shutdown = shutdown.clone();

        tasks.spawn(async move { (pid, attach_and_trace(&settings, pid, shutdown).await) });
    }

    let mut failed = 0;

    while let Some(joined) = tasks.join_next().await {
        let (pid, res) = joined.into_diagnostic()?;

        let line = match res {
            Ok(report) => summary(&report),
            Err(Outcome::Faulted(report, error)) => {
                failed += 1;
                format!("{} ({error})", summary(&report))
            }
            Err(Outcome::Failed(error)) => {
                failed += 1;
                format!("failed: {error}")
            }
        };

        writeln!(output, "pid {pid}: {line}").into_diagnostic()?;
    }

    if failed > 0 {
        miette::bail!("{failed} of {} sessions failed", pids.len());
    }

    Ok(())
}

enum Outcome {
    Faulted(Box<SessionReport>, String),
    Failed(String),
}

#[tracing::instrument(skip(settings, shutdown))]
async fn attach_and_trace(
    settings: &TraceSettings,
    pid: u32,
    shutdown: CancellationToken,
) -> Result<SessionReport, Outcome> {
    let tracer = build_tracer(settings);

    let session = tracer
        .attach(pid)
        .await
        .map_err(|e| Outcome::Failed(error_chain(&e)))?;

    tracing::info!(session = %session.session().id(), "attached");

    match trace_until(session, shutdown).await {
        Ok(report) => Ok(report),
        Err(pyscope_tracer::Error::Faulted { report, source }) => {
            Err(Outcome::Faulted(report, error_chain(&source)))
        }
        Err(e) => Err(Outcome::Failed(error_chain(&e))),
    }
}
