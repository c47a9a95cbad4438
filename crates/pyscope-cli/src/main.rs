#![allow(missing_docs)]
#![allow(clippy::print_stderr)]

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use miette::IntoDiagnostic;
use pyscope_cli::{CliAction, CliOpts};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = CliOpts::parse_from_cmdline();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("PYSCOPE_LOG")
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    match evaluate(cli.action) {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            eprintln!("{e:?}");
            std::process::exit(1);
        }
    }
}

fn evaluate(action: CliAction) -> miette::Result<i32> {
    match action {
        CliAction::ListProc {
            list_current_process,
        } => pyscope_cli::evaluate_list_proc(list_current_process, std::io::stdout()).map(|_| 0),
        CliAction::Attach { trace_args, pids } => block_on(async move {
            let shutdown = pyscope_cli::detach_on_ctrl_c();
            pyscope_cli::evaluate_attach(trace_args, pids, shutdown, std::io::stdout()).await
        })
        .map(|_| 0),
        CliAction::Run {
            trace_args,
            command,
        } => block_on(async move {
            let shutdown = pyscope_cli::detach_on_ctrl_c();
            pyscope_cli::evaluate_run(trace_args, command, shutdown).await
        }),
        CliAction::Dump {
            database,
            output,
            session,
        } => block_on(evaluate_dump(database, output, session)).map(|_| 0),
        CliAction::InstallAgent { dir } => {
            block_on(async move { pyscope_cli::evaluate_install_agent(&dir, std::io::stdout()).await })
                .map(|_| 0)
        }
    }
}

fn block_on<T>(future: impl Future<Output = miette::Result<T>>) -> miette::Result<T> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?
        .block_on(future)
}

async fn evaluate_dump(
    database: PathBuf,
    output: Option<PathBuf>,
    session: Option<String>,
) -> miette::Result<()> {
    let output: Box<dyn Write + Send> = match output {
        Some(output) => Box::new(File::create(output).into_diagnostic()?),
        None => Box::new(std::io::stdout()),
    };

    pyscope_cli::evaluate_dump(&database, session, output).await
}
