use miette::IntoDiagnostic;
use pyscope_tracer::Command;
use tokio_util::sync::CancellationToken;

use crate::cli::CliTraceArgs;
use crate::config::TraceSettings;
use crate::session::{build_tracer, error_chain, summary, trace_until};

/// Runs the subcommand for spawning and tracing a process.
///
/// Returns the exit code of the traced process.
pub async fn evaluate_run(
    trace_args: CliTraceArgs,
    command: Vec<String>,
    shutdown: CancellationToken,
) -> miette::Result<i32> {
    let settings = TraceSettings::from_args(&trace_args)?;

    let command = Command::from_argv(command).ok_or_else(|| miette::miette!("no command to run"))?;

    let session = build_tracer(&settings)
        .spawn(command)
        .await
        .into_diagnostic()?;

    tracing::info!(
        pid = session.process_id(),
        session = %session.session().id(),
        "tracing"
    );

    let report = match trace_until(session, shutdown).await {
        Ok(report) => {
            tracing::info!("session {}", summary(&report));
            report
        }
        Err(pyscope_tracer::Error::Faulted { report, source }) => {
            tracing::error!(error = %error_chain(&source), "session {}", summary(&report));
            *report
        }
        Err(e) => return Err(e).into_diagnostic(),
    };

    // killed by a signal, or left running untraced
    Ok(report.exit_code.unwrap_or(1))
}
