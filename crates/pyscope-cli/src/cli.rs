use std::path::PathBuf;

/// The pyscope tracer.
#[derive(clap::Parser)]
pub struct CliOpts {
    /// The command to run.
    #[clap(subcommand)]
    pub action: CliAction,
}

/// The command to run.
#[derive(clap::Subcommand)]
pub enum CliAction {
    /// Command to list the Python processes which can be attached to.
    ListProc {
        /// Also list this process and its ancestors.
        #[clap(long)]
        list_current_process: bool,
    },

    /// Command to attach to running Python processes and trace them.
    ///
    /// The processes must have their agent listening for attach requests
    /// (see `install-agent`).
    Attach {
        /// Tracing configuration.
        #[clap(flatten)]
        trace_args: CliTraceArgs,

        /// IDs of the processes to trace.
        #[clap(required = true, value_name = "PID")]
        pids: Vec<u32>,
    },

    /// Command to spawn a new Python process and trace it.
    Run {
        /// Tracing configuration.
        #[clap(flatten)]
        trace_args: CliTraceArgs,

        /// Command line to run (program first).
        #[clap(required = true, trailing_var_arg = true, value_name = "COMMAND")]
        command: Vec<String>,
    },

    /// Command to dump the content of a local trace store.
    ///
    /// Without a session ID, the stored sessions are listed. Otherwise the
    /// call tree of the given session is dumped.
    Dump {
        /// Path to the local trace store.
        #[clap(short, long, value_name = "PATH", default_value = pyscope_publisher::DEFAULT_DATABASE)]
        database: PathBuf,

        /// Path to the optional destination of the dump.
        #[clap(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// ID of the session to dump.
        session: Option<String>,
    },

    /// Command to install the agent, for running processes to be attachable.
    ///
    /// A process is attachable once started with the agent directory in its
    /// `PYTHONPATH`, and `PYSCOPE_LISTEN=1` in its environment.
    InstallAgent {
        /// Directory where to install the agent.
        dir: PathBuf,
    },
}

/// Tracing configuration shared by `attach` and `run`.
#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct CliTraceArgs {
    /// Publish to a local trace store.
    #[clap(long, conflicts_with_all = ["remote", "socket"])]
    pub local: bool,

    /// Publish to a remote monitor (default).
    #[clap(long, conflicts_with = "database")]
    pub remote: bool,

    /// Path to the local trace store (implies `--local`).
    #[clap(long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Endpoint of the remote monitor (`tcp://host:port` or `ipc:///path`).
    #[clap(long, value_name = "URL", conflicts_with = "database")]
    pub socket: Option<String>,

    /// Trace the standard library.
    #[clap(long)]
    pub include_stdlib: bool,

    /// Do not trace the standard library (default).
    #[clap(long, conflicts_with = "include_stdlib")]
    pub no_include_stdlib: bool,

    /// Trace third-party packages (default).
    #[clap(long, conflicts_with = "no_include_site_packages")]
    pub include_site_packages: bool,

    /// Do not trace third-party packages.
    #[clap(long)]
    pub no_include_site_packages: bool,

    /// Trace this package (repeatable).
    ///
    /// Once a package is given, application code outside of the included
    /// packages is no longer traced.
    #[clap(long = "include-package", value_name = "NAME")]
    pub include_packages: Vec<String>,

    /// Tuning configuration (KDL format).
    ///
    /// If it ends with `.kdl`, it is treated as a path to a configuration
    /// file. Otherwise it is directly parsed as inline KDL-formatted
    /// configuration.
    #[clap(short, long, value_name = "CONTENT/PATH")]
    pub config: Option<String>,
}

impl CliOpts {
    /// Parses the CLI from the command-line.
    ///
    /// # Warning
    ///
    /// Exits on error.
    pub fn parse_from_cmdline() -> Self {
        <Self as clap::Parser>::parse()
    }
}
