//! In-target agent, loaded by the traced interpreter.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Source of the agent module.
pub const AGENT_SOURCE: &str = include_str!("pyscope_agent.py");

/// Source of the `sitecustomize` module loading the agent at startup.
pub const SITECUSTOMIZE_SOURCE: &str = include_str!("sitecustomize.py");

/// Environment variable holding the socket a spawned agent connects to.
pub const SOCKET_ENV: &str = "PYSCOPE_SOCKET";

/// Environment variable making the agent wait for attach requests.
pub const LISTEN_ENV: &str = "PYSCOPE_LISTEN";

/// Environment variable overriding the directory of attach sockets.
pub const CONTROL_DIR_ENV: &str = "PYSCOPE_CONTROL_DIR";

/// Writes the agent modules into `dir`.
///
/// Prepending `dir` to `PYTHONPATH` makes any interpreter load the agent at
/// startup. The agent then connects to [SOCKET_ENV] if set, and waits for
/// attach requests if [LISTEN_ENV] is `1`.
pub async fn install(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join("pyscope_agent.py"), AGENT_SOURCE).await?;
    tokio::fs::write(dir.join("sitecustomize.py"), SITECUSTOMIZE_SOURCE).await?;

    tracing::debug!(dir = %dir.display(), "agent installed");

    Ok(())
}

/// Returns `PYTHONPATH` with `dir` prepended to `current`.
pub fn python_path(dir: &Path, current: Option<OsString>) -> std::io::Result<OsString> {
    let mut paths = vec![dir.to_path_buf()];
    paths.extend(
        current
            .iter()
            .flat_map(std::env::split_paths)
            .filter(|p| !p.as_os_str().is_empty()),
    );

    std::env::join_paths(paths).map_err(std::io::Error::other)
}

/// Directory holding the attach sockets.
///
/// `PYSCOPE_CONTROL_DIR`, then `XDG_RUNTIME_DIR`, then the temporary
/// directory. The agent resolves it the same way from its own environment.
pub fn control_dir() -> PathBuf {
    [CONTROL_DIR_ENV, "XDG_RUNTIME_DIR"]
        .into_iter()
        .filter_map(std::env::var_os)
        .find(|dir| !dir.is_empty())
        .map_or_else(std::env::temp_dir, PathBuf::from)
}

/// Path of the socket the agent of `pid` connects to on an attach request.
pub fn attach_socket(control_dir: &Path, pid: u32) -> PathBuf {
    control_dir.join(format!("pyscope-{pid}.sock"))
}
