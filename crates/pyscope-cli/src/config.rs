use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::IntoDiagnostic;
use pyscope_publisher::{DEFAULT_DATABASE, Endpoint, PublisherConfig, QueueConfig};
use pyscope_python::PythonRuntime;
use pyscope_tracer::filter::FilterConfig;
use pyscope_tracer::tracer::DEFAULT_FAILURE_THRESHOLD;

use crate::cli::CliTraceArgs;

/// Tuning of a trace session.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct TuningConfig {
    /// Maximum number of events waiting to be published.
    #[knus(child, default = 4096, unwrap(argument))]
    pub queue_capacity: usize,

    /// Delivery retries before the publisher gives up.
    #[knus(child, default = 5, unwrap(argument))]
    pub retry_budget: u32,

    /// Delay before the first delivery retry.
    #[knus(child, default = 50, unwrap(argument))]
    pub backoff_ms: u64,

    /// Maximum time spent flushing pending events on detach.
    #[knus(child, default = 2000, unwrap(argument))]
    pub close_timeout_ms: u64,

    /// Maximum time spent connecting to the publisher's sink.
    #[knus(child, default = 1000, unwrap(argument))]
    pub connect_timeout_ms: u64,

    /// Maximum time for a spawned interpreter to connect its agent.
    #[knus(child, default = 10000, unwrap(argument))]
    pub agent_timeout_ms: u64,

    /// Maximum time for a running interpreter to answer an attach request.
    #[knus(child, default = 5000, unwrap(argument))]
    pub attach_timeout_ms: u64,

    /// Publish failures tolerated before the session faults.
    #[knus(child, default = DEFAULT_FAILURE_THRESHOLD, unwrap(argument))]
    pub failure_threshold: u64,

    /// Time given to a spawned program to exit once detached.
    #[knus(child, default = 1000, unwrap(argument))]
    pub reap_timeout_ms: u64,

    /// Packages always traced, merged with `--include-package`.
    #[knus(children(name = "include-package"))]
    pub include_packages: Vec<IncludePackage>,
}

/// Package always traced.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct IncludePackage {
    /// Dotted package name.
    #[knus(argument)]
    pub name: String,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            retry_budget: 5,
            backoff_ms: 50,
            close_timeout_ms: 2000,
            connect_timeout_ms: 1000,
            agent_timeout_ms: 10000,
            attach_timeout_ms: 5000,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reap_timeout_ms: 1000,
            include_packages: Vec::new(),
        }
    }
}

impl TuningConfig {
    /// Parses the tuning configuration given on the command line.
    ///
    /// A value ending with `.kdl` is read as a file, anything else is parsed
    /// as inline KDL.
    pub fn parse(config: Option<&str>) -> miette::Result<Self> {
        let Some(config) = config else {
            return Ok(Self::default());
        };

        let path = Path::new(config);

        let config = if let Some((filename, "kdl")) = path
            .file_name()
            .and_then(OsStr::to_str)
            .zip(path.extension().and_then(OsStr::to_str))
        {
            let content = std::fs::read_to_string(path).into_diagnostic()?;
            knus::parse(filename, &content)?
        } else {
            knus::parse("<content>", config)?
        };

        Ok(config)
    }

    /// Outbound queue configuration of the publisher.
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            capacity: self.queue_capacity,
            retry_budget: self.retry_budget,
            backoff: Duration::from_millis(self.backoff_ms),
            close_timeout: Duration::from_millis(self.close_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    /// Time given to a spawned program to exit once detached.
    pub const fn reap_timeout(&self) -> Duration {
        Duration::from_millis(self.reap_timeout_ms)
    }

    /// Python runtime with the configured timeouts.
    pub fn runtime(&self) -> PythonRuntime {
        PythonRuntime::default()
            .connect_timeout(Duration::from_millis(self.agent_timeout_ms))
            .attach_timeout(Duration::from_millis(self.attach_timeout_ms))
    }
}

/// Fully resolved configuration of a trace session.
#[derive(Debug, PartialEq)]
pub struct TraceSettings {
    /// Where events are published.
    pub publisher: PublisherConfig,

    /// Which frames are traced.
    pub filter: FilterConfig,

    /// Tuning of the session.
    pub tuning: TuningConfig,
}

impl TraceSettings {
    /// Resolves the settings from the command line flags.
    pub fn from_args(args: &CliTraceArgs) -> miette::Result<Self> {
        let tuning = TuningConfig::parse(args.config.as_deref())?;

        let publisher = if args.local || args.database.is_some() {
            let path = args
                .database
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));
            PublisherConfig::Local(path)
        } else {
            let endpoint = match &args.socket {
                Some(url) => url.parse::<Endpoint>().into_diagnostic()?,
                None => Endpoint::default(),
            };
            PublisherConfig::Remote(endpoint)
        };

        let filter = FilterConfig::new(
            args.include_stdlib,
            !args.no_include_site_packages,
            args.include_packages
                .iter()
                .chain(tuning.include_packages.iter().map(|package| &package.name))
                .cloned(),
        )
        .into_diagnostic()?;

        Ok(Self {
            publisher,
            filter,
            tuning,
        })
    }
}
