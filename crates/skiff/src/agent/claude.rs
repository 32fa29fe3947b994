//! Claude CLI bridge.
//!
//! Each turn spawns `claude -p` in stream-JSON mode with stdio piped. The
//! stdout stream carries the transcript (`system`/`assistant`/`user`/`result`
//! records) plus out-of-band `control_request` records for gated tool calls;
//! decisions go back over stdin as `control_response` lines.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use serde_json::{Value, json};
use skiff_protocol::{ChatMessage, MessageKind, PermissionDecision, PermissionRequest};
use tokio::process::Command;
use tokio::sync::{Mutex, mpsc, oneshot};
use uuid::Uuid;

use super::process::AgentProcess;
use super::{AgentBridge, BackendKind, BridgeEvent, TurnRequest, probe_executable};
use crate::config::BridgeConfig;
use crate::error::{Result, SkiffError};

pub struct ClaudeBridge {
    default_executable: String,
    executable_override: std::sync::RwLock<Option<String>>,
    event_buffer_size: usize,
    command_buffer_size: usize,
    active: Arc<Mutex<Option<ActiveTurn>>>,
}

struct ActiveTurn {
    process: Arc<AgentProcess>,
    interrupted: Arc<AtomicBool>,
}

impl ClaudeBridge {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            default_executable: config.claude_executable.clone(),
            executable_override: std::sync::RwLock::new(None),
            event_buffer_size: config.event_buffer_size,
            command_buffer_size: config.command_buffer_size,
            active: Arc::new(Mutex::new(None)),
        }
    }

    fn build_command(&self, turn: &TurnRequest) -> Command {
        let mut cmd = Command::new(self.executable());
        cmd.arg("-p")
            .arg(&turn.prompt)
            .arg("--output-format")
            .arg("stream-json")
            .arg("--input-format")
            .arg("stream-json")
            .arg("--verbose");
        if let Some(model) = &turn.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(session_id) = &turn.session_id {
            cmd.arg("--resume").arg(session_id);
        }
        cmd.current_dir(&turn.working_dir);
        cmd
    }

    async fn translate(
        mut line_rx: mpsc::Receiver<String>,
        event_tx: mpsc::Sender<BridgeEvent>,
        process: Arc<AgentProcess>,
        interrupted: Arc<AtomicBool>,
        active: Arc<Mutex<Option<ActiveTurn>>>,
    ) {
        let mut completed = false;

        while let Some(line) = line_rx.recv().await {
            let value: Value = match serde_json::from_str(&line) {
                Ok(value) => value,
                Err(err) => {
                    let display: String = line.chars().take(200).collect();
                    warn!("unparseable claude record: {err}: {display}");
                    continue;
                }
            };

            let event = match value.get("type").and_then(Value::as_str) {
                Some("system") => Self::translate_system(&value),
                Some("assistant") => Some(BridgeEvent::Message(transcript_message(
                    MessageKind::Assistant,
                    &value,
                ))),
                Some("user") => Some(BridgeEvent::Message(transcript_message(
                    MessageKind::User,
                    &value,
                ))),
                Some("control_request") => {
                    Self::translate_control_request(&value, &process)
                }
                Some("result") => {
                    completed = true;
                    let error = if value
                        .get("is_error")
                        .and_then(Value::as_bool)
                        .unwrap_or(false)
                    {
                        Some(
                            value
                                .get("result")
                                .and_then(Value::as_str)
                                .unwrap_or("turn failed")
                                .to_string(),
                        )
                    } else {
                        None
                    };
                    Some(BridgeEvent::TurnCompleted { error })
                }
                other => {
                    debug!("ignoring claude record type {other:?}");
                    None
                }
            };

            if let Some(event) = event {
                let done = matches!(event, BridgeEvent::TurnCompleted { .. });
                if event_tx.send(event).await.is_err() {
                    // Consumer gone; take the process down with it.
                    process.kill().await;
                    break;
                }
                if done {
                    break;
                }
            }
        }

        if !completed {
            let error = if interrupted.load(Ordering::Acquire) {
                None
            } else {
                Some("agent process exited before completing the turn".to_string())
            };
            let _ = event_tx.send(BridgeEvent::TurnCompleted { error }).await;
        }

        active.lock().await.take();
    }

    fn translate_system(value: &Value) -> Option<BridgeEvent> {
        if value.get("subtype").and_then(Value::as_str) != Some("init") {
            return None;
        }
        let session_id = value.get("session_id").and_then(Value::as_str)?;
        Some(BridgeEvent::SessionStarted {
            session_id: session_id.to_string(),
        })
    }

    /// Map a `can_use_tool` control request to a permission event, wiring the
    /// decision back to the process as a `control_response` line.
    fn translate_control_request(value: &Value, process: &Arc<AgentProcess>) -> Option<BridgeEvent> {
        let request_id = value.get("request_id").and_then(Value::as_str)?.to_string();
        let request = value.get("request")?;
        if request.get("subtype").and_then(Value::as_str) != Some("can_use_tool") {
            debug!("ignoring control request {request_id}");
            return None;
        }

        let tool_name = request
            .get("tool_name")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let inputs = request
            .get("input")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let (responder, decision_rx) = oneshot::channel::<PermissionDecision>();
        let process = Arc::clone(process);
        let response_id = request_id.clone();
        tokio::spawn(async move {
            // A dropped responder counts as a denial.
            let decision = decision_rx.await.unwrap_or(PermissionDecision::Deny);
            let behavior = if decision.approved() { "allow" } else { "deny" };
            let line = json!({
                "type": "control_response",
                "response": {
                    "subtype": "success",
                    "request_id": response_id,
                    "response": { "behavior": behavior },
                },
            });
            if let Err(err) = process.write_line(line.to_string()).await {
                warn!("failed to deliver permission decision: {err}");
            }
        });

        Some(BridgeEvent::PermissionRequested {
            request: PermissionRequest {
                request_id,
                tool_name,
                inputs,
            },
            responder,
        })
    }
}

#[async_trait]
impl AgentBridge for ClaudeBridge {
    fn kind(&self) -> BackendKind {
        BackendKind::Claude
    }

    async fn check_environment(&self) -> Result<()> {
        probe_executable(&self.executable()).await
    }

    async fn send(&self, turn: TurnRequest) -> Result<mpsc::Receiver<BridgeEvent>> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(SkiffError::Busy);
        }

        let cmd = self.build_command(&turn);
        let (process, line_rx) =
            AgentProcess::spawn(cmd, self.command_buffer_size, self.event_buffer_size)?;
        let process = Arc::new(process);
        let interrupted = Arc::new(AtomicBool::new(false));

        *active = Some(ActiveTurn {
            process: Arc::clone(&process),
            interrupted: Arc::clone(&interrupted),
        });
        drop(active);

        info!("claude turn started in {}", turn.working_dir.display());

        let (event_tx, event_rx) = mpsc::channel(self.event_buffer_size);
        tokio::spawn(Self::translate(
            line_rx,
            event_tx,
            process,
            interrupted,
            Arc::clone(&self.active),
        ));

        Ok(event_rx)
    }

    async fn interrupt(&self) -> Result<()> {
        let active = self.active.lock().await;
        let Some(turn) = active.as_ref() else {
            return Ok(());
        };

        turn.interrupted.store(true, Ordering::Release);
        let line = json!({
            "type": "control_request",
            "request_id": format!("req-{}", Uuid::new_v4()),
            "request": { "subtype": "interrupt" },
        });
        if let Err(err) = turn.process.write_line(line.to_string()).await {
            warn!("interrupt request failed, killing agent process: {err}");
            turn.process.kill().await;
        }
        Ok(())
    }

    fn set_executable(&self, path: Option<String>) {
        *self.executable_override.write().expect("executable lock") = path;
    }

    fn executable(&self) -> String {
        self.executable_override
            .read()
            .expect("executable lock")
            .clone()
            .unwrap_or_else(|| self.default_executable.clone())
    }
}

/// Build a transcript entry from a streamed record, keeping the full record
/// as the opaque raw payload.
fn transcript_message(kind: MessageKind, value: &Value) -> ChatMessage {
    let content = value.get("message").map(message_text).unwrap_or_default();
    ChatMessage::new(kind, Utc::now().timestamp_millis(), content).with_raw(value.clone())
}

/// Pull display text out of a backend message body: either a plain string
/// `content` or the concatenated `text` blocks.
fn message_text(message: &Value) -> String {
    match message.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|block| {
                if block.get("type").and_then(Value::as_str) == Some("text") {
                    block.get("text").and_then(Value::as_str)
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_override_takes_effect() {
        let bridge = ClaudeBridge::new(&BridgeConfig::default());
        assert_eq!(bridge.executable(), "claude");
        bridge.set_executable(Some("/opt/bin/claude".to_string()));
        assert_eq!(bridge.executable(), "/opt/bin/claude");
        bridge.set_executable(None);
        assert_eq!(bridge.executable(), "claude");
    }

    #[test]
    fn extracts_text_from_block_content() {
        let message = json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "tool_use", "name": "Bash"},
                {"type": "text", "text": "second"},
            ]
        });
        assert_eq!(message_text(&message), "first\nsecond");
    }

    #[test]
    fn system_init_yields_session_id() {
        let value = json!({"type": "system", "subtype": "init", "session_id": "abc-123"});
        match ClaudeBridge::translate_system(&value) {
            Some(BridgeEvent::SessionStarted { session_id }) => assert_eq!(session_id, "abc-123"),
            other => panic!("unexpected translation: {other:?}"),
        }
    }

    #[test]
    fn non_init_system_records_are_ignored() {
        let value = json!({"type": "system", "subtype": "status"});
        assert!(ClaudeBridge::translate_system(&value).is_none());
    }
}
