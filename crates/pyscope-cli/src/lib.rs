//! Crate implementing the CLI commands.

mod attach;
mod cli;
mod config;
mod dump;
mod install_agent;
mod list_proc;
mod run;
mod session;

pub use self::attach::evaluate_attach;
pub use self::cli::{CliAction, CliOpts, CliTraceArgs};
pub use self::config::{IncludePackage, TraceSettings, TuningConfig};
pub use self::dump::evaluate_dump;
pub use self::install_agent::evaluate_install_agent;
pub use self::list_proc::evaluate_list_proc;
pub use self::run::evaluate_run;
pub use self::session::detach_on_ctrl_c;
