use std::time::Duration;

use futures_util::StreamExt;
use pyscope_tracer::event::FrameId;
use pyscope_tracer::filter::FilterConfig;
use pyscope_tracer::runtime::{RuntimeEvent, RuntimeSession};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::process::Child;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::error::{Error, Result};
use crate::frame::PythonFrame;
use crate::layout::InterpreterLayout;
use crate::protocol::{AgentRecord, Hello, TracerRecord};
use crate::runtime::kill_and_reap;

/// Longest accepted agent record.
const MAX_RECORD_LENGTH: usize = 1 << 20;

/// Maximum time for a connected agent to introduce itself.
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// Python interpreter with the agent connected.
pub struct PythonSession {
    pid: u32,
    child: Option<Child>,
    records: Option<FramedRead<OwnedReadHalf, LinesCodec>>,
    writer: Option<OwnedWriteHalf>,
    layout: InterpreterLayout,
    hello: Hello,
    exit_code: Option<Option<i32>>,

    // holds the agent modules of a spawned interpreter
    _workdir: Option<TempDir>,
}

impl PythonSession {
    pub(crate) async fn open(
        stream: UnixStream,
        pid: u32,
        mut child: Option<Child>,
        workdir: Option<TempDir>,
    ) -> Result<Self> {
        let (reader, writer) = stream.into_split();
        let mut records =
            FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_RECORD_LENGTH));

        let hello = match read_hello(&mut records).await {
            Ok(hello) => hello,
            Err(e) => {
                if let Some(child) = child.as_mut() {
                    kill_and_reap(child).await;
                }
                return Err(e);
            }
        };

        if hello.pid != pid {
            tracing::debug!(pid, agent_pid = hello.pid, "agent runs in a child process");
        }

        tracing::info!(
            pid,
            version = %hello.version,
            "agent connected"
        );

        Ok(Self {
            pid,
            child,
            records: Some(records),
            writer: Some(writer),
            layout: InterpreterLayout::from(&hello),
            hello,
            exit_code: None,
            _workdir: workdir,
        })
    }

    /// Version of the traced interpreter.
    pub fn interpreter_version(&self) -> &str {
        &self.hello.version
    }

    /// Installation layout of the traced interpreter.
    pub const fn layout(&self) -> &InterpreterLayout {
        &self.layout
    }

    fn convert(&self, record: AgentRecord) -> Option<RuntimeEvent<PythonFrame>> {
        let event = match record {
            AgentRecord::Call(frame) => RuntimeEvent::Call(PythonFrame::new(frame, &self.layout)),
            AgentRecord::Line(frame) => RuntimeEvent::Line(PythonFrame::new(frame, &self.layout)),
            AgentRecord::Return {
                thread,
                frame,
                value,
            } => RuntimeEvent::Return {
                thread_id: thread,
                frame_id: FrameId(frame),
                value,
            },
            AgentRecord::Exception {
                thread,
                frame,
                type_name,
                message,
            } => RuntimeEvent::Exception {
                thread_id: thread,
                frame_id: FrameId(frame),
                type_name,
                message,
            },
            AgentRecord::Hello(hello) => {
                tracing::debug!(agent_pid = hello.pid, "ignoring repeated hello");
                return None;
            }
        };

        Some(event)
    }

    async fn reap(&mut self) -> Result<Option<i32>> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }

        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };

        let code = child.wait().await?.code();
        tracing::debug!(pid = self.pid, exit_code = ?code, "process exited");

        self.exit_code = Some(code);
        Ok(code)
    }
}

impl RuntimeSession for PythonSession {
    type Frame = PythonFrame;
    type Error = Error;

    fn process_id(&self) -> u32 {
        self.pid
    }

    async fn next_event(&mut self) -> Result<RuntimeEvent<Self::Frame>> {
        loop {
            let next = match self.records.as_mut() {
                Some(records) => records.next().await,
                None => None,
            };

            let Some(line) = next else {
                // the agent is gone, either with its process or on its own
                self.records = None;
                let exit_code = self.reap().await?;
                return Ok(RuntimeEvent::Exited { exit_code });
            };

            let line = match line {
                Ok(line) => line,
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    tracing::warn!(max = MAX_RECORD_LENGTH, "skipping oversized agent record");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let record: AgentRecord = serde_json::from_str(&line)?;

            if let Some(event) = self.convert(record) {
                return Ok(event);
            }
        }
    }

    async fn set_filter(&mut self, filter: &FilterConfig) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        let mut line = serde_json::to_string(&TracerRecord::from(filter))?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;

        tracing::debug!(pid = self.pid, "filter sent to agent");

        Ok(())
    }

    async fn detach(&mut self) -> Result<()> {
        // the agent uninstalls its trace functions on EOF
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!(error = %e, "agent socket already closed");
            }
        }
        self.records = None;

        tracing::debug!(pid = self.pid, "agent released");

        Ok(())
    }

    async fn wait_exit(&mut self) -> Result<Option<i32>> {
        self.reap().await
    }
}

async fn read_hello(records: &mut FramedRead<OwnedReadHalf, LinesCodec>) -> Result<Hello> {
    let line = match tokio::time::timeout(HELLO_TIMEOUT, records.next()).await {
        Ok(Some(line)) => line?,
        Ok(None) => return Err(Error::UnexpectedRecord("connection closed".to_owned())),
        Err(_) => return Err(Error::AgentTimeout(HELLO_TIMEOUT)),
    };

    match serde_json::from_str(&line)? {
        AgentRecord::Hello(hello) => Ok(hello),
        record => Err(Error::UnexpectedRecord(format!("{record:?}"))),
    }
}
