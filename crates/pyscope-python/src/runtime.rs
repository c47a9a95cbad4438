use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use pyscope_tracer::Command;
use tokio::net::{UnixListener, UnixStream};
use tokio::process::Child;

use crate::agent;
use crate::error::{Error, Result};
use crate::session::PythonSession;
use crate::sys;

/// Python runtime, installing the execution hook through the in-target
/// agent.
///
/// - Spawned interpreters load the agent at startup (as `sitecustomize`),
///   before any user code runs.
/// - Running interpreters must have loaded the agent in listen mode (see
///   [attach](pyscope_tracer::runtime::Runtime::attach)).
#[derive(Debug, Clone)]
pub struct PythonRuntime {
    connect_timeout: Duration,
    attach_timeout: Duration,
    control_dir: Option<PathBuf>,
}

impl Default for PythonRuntime {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            attach_timeout: Duration::from_secs(5),
            control_dir: None,
        }
    }
}

impl PythonRuntime {
    /// Creates a runtime with the default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum time for a spawned interpreter to connect its agent.
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Maximum time for a running interpreter to answer an attach request.
    pub const fn attach_timeout(mut self, timeout: Duration) -> Self {
        self.attach_timeout = timeout;
        self
    }

    /// Directory of the attach sockets (see [control_dir](agent::control_dir)).
    pub fn control_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.control_dir = Some(dir.into());
        self
    }
}

impl pyscope_tracer::runtime::Runtime for PythonRuntime {
    type Session = PythonSession;
    type Error = Error;

    #[tracing::instrument(skip_all, fields(program = %command.program.display()))]
    async fn spawn(&mut self, command: Command) -> Result<Self::Session> {
        let workdir = tempfile::Builder::new().prefix("pyscope-").tempdir()?;
        agent::install(workdir.path()).await?;

        let socket_path = workdir.path().join("agent.sock");
        let listener = UnixListener::bind(&socket_path)?;

        let python_path = agent::python_path(
            workdir.path(),
            command
                .env
                .get("PYTHONPATH")
                .map(Into::into)
                .or_else(|| std::env::var_os("PYTHONPATH")),
        )?;

        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .env("PYTHONPATH", python_path)
            .env(agent::SOCKET_ENV, &socket_path)
            .stdin(Stdio::inherit())
            .kill_on_drop(false);

        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| Error::Launch {
            program: command.program.display().to_string(),
            source,
        })?;

        let pid = child.id().ok_or(Error::ExitedEarly(None))?;
        tracing::debug!(pid, "process spawned, waiting for agent");

        let stream = match accept_agent(&listener, &mut child, self.connect_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                kill_and_reap(&mut child).await;
                return Err(e);
            }
        };

        PythonSession::open(stream, pid, Some(child), Some(workdir)).await
    }

    /// Asks a running interpreter to load its execution hook.
    ///
    /// The interpreter must have its agent listening for attach requests,
    /// i.e., the agent directory on its `PYTHONPATH` and `PYSCOPE_LISTEN=1`
    /// in its environment (or an explicit `pyscope_agent.listen()`).
    #[tracing::instrument(skip(self))]
    async fn attach(&mut self, pid: u32) -> Result<Self::Session> {
        sys::check_attachable(pid)?;

        let control_dir = self.control_dir.clone().unwrap_or_else(agent::control_dir);
        let socket_path = agent::attach_socket(&control_dir, pid);

        // stale socket of a previous attach
        match tokio::fs::remove_file(&socket_path).await {
            Ok(()) => tracing::debug!(path = %socket_path.display(), "stale socket removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(&socket_path)?;
        let accepted = request_agent(&listener, pid, self.attach_timeout).await;

        drop(listener);
        if let Err(e) = tokio::fs::remove_file(&socket_path).await {
            tracing::debug!(error = %e, "failed to remove attach socket");
        }

        PythonSession::open(accepted?, pid, None, None).await
    }
}

async fn request_agent(listener: &UnixListener, pid: u32, timeout: Duration) -> Result<UnixStream> {
    sys::request_attach(pid)?;

    match tokio::time::timeout(timeout, listener.accept()).await {
        Ok(accepted) => Ok(accepted?.0),
        Err(_) => Err(Error::Refused {
            pid,
            reason: "agent did not answer the attach request",
        }),
    }
}

async fn accept_agent(
    listener: &UnixListener,
    child: &mut Child,
    timeout: Duration,
) -> Result<UnixStream> {
    tokio::select! {
        accepted = tokio::time::timeout(timeout, listener.accept()) => match accepted {
            Ok(accepted) => Ok(accepted?.0),
            Err(_) => Err(Error::AgentTimeout(timeout)),
        },
        status = child.wait() => Err(Error::ExitedEarly(status?.code())),
    }
}

/// Kills a spawned process which cannot be traced, and reaps it.
pub(crate) async fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "failed to kill process");
    }

    match child.wait().await {
        Ok(status) => tracing::debug!(%status, "process reaped"),
        Err(e) => tracing::debug!(error = %e, "failed to reap process"),
    }
}
