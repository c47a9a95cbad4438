use std::collections::BTreeMap;
use std::path::PathBuf;

/// Command line of a process to spawn and trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Program to spawn (e.g., a script, or the interpreter itself).
    pub program: PathBuf,

    /// Program arguments.
    pub args: Vec<String>,

    /// Environment variables set in addition to the inherited ones.
    pub env: BTreeMap<String, String>,

    /// Working directory for the process to spawn.
    pub current_dir: Option<PathBuf>,
}

impl Command {
    /// Constructs a new `Command` for launching `program`, with no
    /// arguments, and inheriting the current environment and working
    /// directory.
    ///
    /// If `program` is not an absolute path, the `PATH` will be searched in
    /// an OS-defined way.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            current_dir: None,
        }
    }

    /// Builds a command from a full command line (program first).
    ///
    /// Returns `None` if the command line is empty.
    pub fn from_argv<I, S>(argv: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next()?;

        Some(Self::new(program).args(argv))
    }

    /// Adds an argument to pass to the program.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments to pass to the program.
    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        args.into_iter().fold(self, |cmd, arg| cmd.arg(arg))
    }

    /// Inserts or updates an environment variable of the process to spawn.
    ///
    /// Explicitly set variables take precedence over inherited ones.
    pub fn env(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        self.env.insert(key.into(), val.into());
        self
    }

    /// Sets the working directory for the process to spawn.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Returns the full command line, program first.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}
