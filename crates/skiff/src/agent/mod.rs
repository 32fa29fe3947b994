//! Agent backend bridges.
//!
//! A bridge owns the lifecycle of one agent CLI process per turn and
//! translates its native line-delimited JSON stream into typed
//! [`BridgeEvent`]s. The rest of the core never sees backend wire formats.
//!
//! Two interchangeable backends are provided:
//!
//! - [`claude::ClaudeBridge`] — drives the Claude CLI in stream-JSON mode.
//! - [`codex::CodexBridge`] — drives the Codex CLI in proto mode.

pub mod claude;
pub mod codex;
mod process;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skiff_protocol::{ChatMessage, PermissionDecision, PermissionRequest};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, SkiffError};

/// Which agent CLI a bridge drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Claude,
    Codex,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Claude => write!(f, "claude"),
            Self::Codex => write!(f, "codex"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// One user turn handed to a backend.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub prompt: String,
    /// Backend session to resume; `None` starts a fresh one.
    pub session_id: Option<String>,
    pub working_dir: PathBuf,
    pub model: Option<String>,
}

/// Typed messages streamed back from a backend during a turn.
///
/// Every turn stream ends with exactly one `TurnCompleted`.
#[derive(Debug)]
pub enum BridgeEvent {
    /// Backend assigned or confirmed its session id.
    SessionStarted { session_id: String },
    /// A transcript entry produced by the backend.
    Message(ChatMessage),
    /// Reasoning-in-progress toggle.
    Thinking(bool),
    /// A gated tool call. The decision must be sent on `responder`; dropping
    /// it counts as a denial.
    PermissionRequested {
        request: PermissionRequest,
        responder: oneshot::Sender<PermissionDecision>,
    },
    /// Turn finished. `error` is set when the backend failed; an interrupted
    /// turn completes without an error.
    TurnCompleted { error: Option<String> },
}

/// Backend bridge contract: start a turn, stream typed messages, cancel.
#[async_trait]
pub trait AgentBridge: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Verify the backend executable is reachable. Surfaced to the user as an
    /// environment error with a remediation path on failure.
    async fn check_environment(&self) -> Result<()>;

    /// Begin a turn. Events arrive on the returned stream, terminated by
    /// [`BridgeEvent::TurnCompleted`]. Rejects when a turn is already in
    /// flight.
    async fn send(&self, turn: TurnRequest) -> Result<mpsc::Receiver<BridgeEvent>>;

    /// Ask the backend to cancel the in-flight turn. Completes the active
    /// stream with `TurnCompleted`; a no-op when idle.
    async fn interrupt(&self) -> Result<()>;

    /// Override the executable path (remediation for environment failures).
    /// `None` restores the configured default.
    fn set_executable(&self, path: Option<String>);

    /// The executable path currently in effect.
    fn executable(&self) -> String;
}

/// Probe for an executable with `which`/`where`.
pub(crate) async fn probe_executable(executable: &str) -> Result<()> {
    #[cfg(unix)]
    let check_cmd = "which";
    #[cfg(windows)]
    let check_cmd = "where";

    let output = Command::new(check_cmd)
        .arg(executable)
        .output()
        .await
        .map_err(|err| SkiffError::Environment {
            executable: executable.to_string(),
            message: format!("failed to probe: {err}"),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(SkiffError::Environment {
            executable: executable.to_string(),
            message: "not found in PATH".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_and_displays() {
        assert_eq!("claude".parse::<BackendKind>().unwrap(), BackendKind::Claude);
        assert_eq!("codex".parse::<BackendKind>().unwrap(), BackendKind::Codex);
        assert!("gemini".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Codex.to_string(), "codex");
    }
}
