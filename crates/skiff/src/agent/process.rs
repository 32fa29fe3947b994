//! Child-process plumbing shared by the CLI bridges.
//!
//! Spawns the agent executable with piped stdio and runs three background
//! tasks: a stdin writer fed by a command channel, a stdout reader that
//! forwards raw lines to the bridge's translator, and a stderr reader that
//! logs diagnostics. Process teardown flows through line-channel closure: the
//! translator observes EOF when the child exits.

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc};

/// Longest prefix of a wire line echoed into logs.
const LOG_LINE_PREFIX: usize = 200;

pub(crate) struct AgentProcess {
    command_tx: mpsc::Sender<String>,
    child: Arc<Mutex<Child>>,
    _handles: Vec<tokio::task::JoinHandle<()>>,
}

impl AgentProcess {
    /// Spawn the child and wire up the stdio tasks. Returns the process
    /// handle and the raw stdout line stream.
    pub fn spawn(
        mut cmd: Command,
        command_buffer: usize,
        line_buffer: usize,
    ) -> Result<(Self, mpsc::Receiver<String>)> {
        cmd.stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn agent process: {cmd:?}"))?;

        let stdin = child.stdin.take().context("agent process has no stdin")?;
        let stdout = child.stdout.take().context("agent process has no stdout")?;
        let stderr = child.stderr.take().context("agent process has no stderr")?;

        let (command_tx, command_rx) = mpsc::channel::<String>(command_buffer);
        let (line_tx, line_rx) = mpsc::channel::<String>(line_buffer);

        let handles = vec![
            tokio::spawn(Self::stdin_writer_task(stdin, command_rx)),
            tokio::spawn(Self::stdout_reader_task(stdout, line_tx)),
            tokio::spawn(Self::stderr_reader_task(stderr)),
        ];

        Ok((
            Self {
                command_tx,
                child: Arc::new(Mutex::new(child)),
                _handles: handles,
            },
            line_rx,
        ))
    }

    /// Queue one line for the child's stdin.
    pub async fn write_line(&self, line: String) -> Result<()> {
        self.command_tx
            .send(line)
            .await
            .context("agent stdin channel closed")
    }

    /// Force the child down. Best effort; the stdout reader observes EOF and
    /// closes the line stream.
    pub async fn kill(&self) {
        let mut child = self.child.lock().await;
        if let Err(err) = child.start_kill() {
            debug!("agent process already gone: {err}");
        }
    }

    async fn stdin_writer_task(
        mut stdin: tokio::process::ChildStdin,
        mut command_rx: mpsc::Receiver<String>,
    ) {
        debug!("agent stdin writer task started");
        while let Some(command) = command_rx.recv().await {
            let display: String = command.chars().take(LOG_LINE_PREFIX).collect();
            debug!("sending to agent: {display}");
            let line = format!("{command}\n");
            if let Err(err) = stdin.write_all(line.as_bytes()).await {
                error!("failed to write to agent stdin: {err}");
                break;
            }
            if let Err(err) = stdin.flush().await {
                error!("failed to flush agent stdin: {err}");
                break;
            }
        }
        debug!("agent stdin writer task ended");
    }

    async fn stdout_reader_task(
        stdout: tokio::process::ChildStdout,
        line_tx: mpsc::Sender<String>,
    ) {
        let reader = BufReader::new(stdout);
        let mut lines = reader.lines();

        debug!("agent stdout reader task started");
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            let display: String = line.chars().take(LOG_LINE_PREFIX).collect();
            debug!("received from agent: {display}");
            if line_tx.send(line).await.is_err() {
                // Translator gone; drain quietly until the process exits.
                break;
            }
        }
        info!("agent stdout closed");
    }

    async fn stderr_reader_task(stderr: tokio::process::ChildStderr) {
        let reader = BufReader::new(stderr);
        let mut lines = reader.lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if !line.trim().is_empty() {
                warn!("agent stderr: {line}");
            }
        }
    }
}
