use std::io::Write;
use std::path::Path;

use miette::IntoDiagnostic;
use pyscope_python::agent;

/// Runs the subcommand for installing the agent.
pub async fn evaluate_install_agent(dir: &Path, mut output: impl Write) -> miette::Result<()> {
    agent::install(dir).await.into_diagnostic()?;

    writeln!(
        output,
        "Agent installed. Start the processes to attach to with:\n\n    PYTHONPATH={} {}=1 python3 ...",
        dir.display(),
        agent::LISTEN_ENV,
    )
    .into_diagnostic()
}
