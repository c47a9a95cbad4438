use std::io::Write;

use miette::IntoDiagnostic;
use pyscope_python::{DiscoveryError, ProcessDescriptor};

/// Runs the subcommand for listing the processes which can be traced.
///
/// Discovery failures are logged, and reported as an empty list.
pub fn evaluate_list_proc(include_self: bool, output: impl Write) -> miette::Result<()> {
    list_with(|| pyscope_python::list_candidates(include_self), output)
}

fn list_with(
    discover: impl FnOnce() -> Result<Vec<ProcessDescriptor>, DiscoveryError>,
    output: impl Write,
) -> miette::Result<()> {
    let candidates = discover().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "process discovery failed");
        Vec::new()
    });

    write_candidates(&candidates, output).into_diagnostic()
}

fn write_candidates(
    candidates: &[ProcessDescriptor],
    mut output: impl Write,
) -> std::io::Result<()> {
    if candidates.is_empty() {
        return writeln!(output, "No Python process found");
    }

    let width = candidates
        .iter()
        .map(|c| c.pid.to_string().len())
        .max()
        .unwrap_or_default()
        .max("PID".len());

    writeln!(output, "{:<width$}  NAME", "PID")?;

    for candidate in candidates {
        writeln!(output, "{:<width$}  {}", candidate.pid, candidate.name)?;
    }

    Ok(())
}
