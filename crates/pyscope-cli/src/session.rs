use pyscope_publisher::ConfiguredPublisher;
use pyscope_python::PythonRuntime;
use pyscope_tracer::publisher::Publisher;
use pyscope_tracer::runtime::RuntimeSession;
use pyscope_tracer::session::SessionReport;
use pyscope_tracer::tracer::{TracedSession, Tracer};
use tokio_util::sync::CancellationToken;

use crate::config::TraceSettings;

/// Builds a tracer publishing according to `settings`.
pub fn build_tracer(settings: &TraceSettings) -> Tracer<PythonRuntime, ConfiguredPublisher> {
    let publisher =
        ConfiguredPublisher::new(settings.publisher.clone(), settings.tuning.queue_config());

    Tracer::builder()
        .with_runtime(settings.tuning.runtime())
        .with_publisher(publisher)
        .filter(settings.filter.clone())
        .failure_threshold(settings.tuning.failure_threshold)
        .reap_timeout(settings.tuning.reap_timeout())
        .build()
}

/// Traces until the target exits, or `shutdown` is cancelled.
pub async fn trace_until<S, P>(
    session: TracedSession<S, P>,
    shutdown: CancellationToken,
) -> pyscope_tracer::Result<SessionReport, S::Error>
where
    S: RuntimeSession,
    P: Publisher,
{
    let detach = session.detach_handle();

    let trace = session.trace();
    tokio::pin!(trace);

    tokio::select! {
        res = &mut trace => res,
        () = shutdown.cancelled() => {
            detach.detach();
            trace.await
        }
    }
}

/// One-line summary of a finished session.
pub fn summary(report: &SessionReport) -> String {
    let mut line = format!(
        "{}, {} events published ({} delivered, {} dropped)",
        report.state,
        report.events_forwarded,
        report.publisher.delivered,
        report.publisher.dropped,
    );

    if let Some(code) = report.exit_code {
        line.push_str(&format!(", exit code {code}"));
    }

    line
}

/// Message of an error, followed by its sources.
pub fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();

    while let Some(e) = source {
        message.push_str(": ");
        message.push_str(&e.to_string());
        source = e.source();
    }

    message
}

/// Returns a token cancelled on Ctrl-C.
pub fn detach_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, detaching");
            cancel.cancel();
        }
    });

    token
}
