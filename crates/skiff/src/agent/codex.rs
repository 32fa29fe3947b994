//! Codex CLI bridge.
//!
//! Each turn spawns `codex proto` with stdio piped and submits the prompt as
//! a `user_input` op. Codex reports usage through standalone `token_count`
//! events rather than on the message itself, so the bridge folds the latest
//! counts into the canonical `message.usage` shape when it emits an assistant
//! message.

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

pub struct CodexBridge {
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

impl CodexBridge {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            default_executable: config.codex_executable.clone(),
            executable_override: std::sync::RwLock::new(None),
            event_buffer_size: config.event_buffer_size,
            command_buffer_size: config.command_buffer_size,
            active: Arc::new(Mutex::new(None)),
        }
    }

    fn build_command(&self, turn: &TurnRequest) -> Command {
        let mut cmd = Command::new(self.executable());
        cmd.arg("proto");
        if let Some(model) = &turn.model {
            cmd.arg("-c").arg(format!("model={model}"));
        }
        if let Some(session_id) = &turn.session_id {
            cmd.arg("-c").arg(format!("experimental_resume={session_id}"));
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
        let mut thinking = false;
        // Latest token_count event, already mapped to canonical usage keys.
        let mut last_usage: Option<Value> = None;

        while let Some(line) = line_rx.recv().await {
            let value: Value = match serde_json::from_str(&line) {
                Ok(value) => value,
                Err(err) => {
                    let display: String = line.chars().take(200).collect();
                    warn!("unparseable codex record: {err}: {display}");
                    continue;
                }
            };

            let event_id = value.get("id").and_then(Value::as_str).unwrap_or_default();
            let Some(msg) = value.get("msg") else {
                debug!("codex record without msg field");
                continue;
            };

            let mut events: Vec<BridgeEvent> = Vec::new();
            match msg.get("type").and_then(Value::as_str) {
                Some("session_configured") => {
                    if let Some(session_id) = msg.get("session_id").and_then(Value::as_str) {
                        events.push(BridgeEvent::SessionStarted {
                            session_id: session_id.to_string(),
                        });
                    }
                }
                Some("agent_reasoning") | Some("agent_reasoning_delta") => {
                    if !thinking {
                        thinking = true;
                        events.push(BridgeEvent::Thinking(true));
                    }
                }
                Some("agent_message") => {
                    if thinking {
                        thinking = false;
                        events.push(BridgeEvent::Thinking(false));
                    }
                    events.push(BridgeEvent::Message(assistant_message(
                        msg,
                        last_usage.as_ref(),
                    )));
                }
                Some("token_count") => {
                    last_usage = Some(canonical_usage(msg));
                }
                Some("exec_approval_request") => {
                    events.push(Self::approval_event(
                        event_id, "exec_approval", "Exec", msg, &process,
                    ));
                }
                Some("apply_patch_approval_request") => {
                    events.push(Self::approval_event(
                        event_id,
                        "patch_approval",
                        "ApplyPatch",
                        msg,
                        &process,
                    ));
                }
                Some("task_complete") => {
                    completed = true;
                    if thinking {
                        events.push(BridgeEvent::Thinking(false));
                    }
                    events.push(BridgeEvent::TurnCompleted { error: None });
                }
                Some("error") => {
                    completed = true;
                    let message = msg
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("turn failed")
                        .to_string();
                    events.push(BridgeEvent::TurnCompleted {
                        error: Some(message),
                    });
                }
                other => {
                    debug!("ignoring codex event type {other:?}");
                }
            }

            let mut consumer_gone = false;
            for event in events {
                if event_tx.send(event).await.is_err() {
                    consumer_gone = true;
                    break;
                }
            }
            if consumer_gone || completed {
                // Per-turn process: bring it down once the turn is over.
                process.kill().await;
                break;
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

    /// Wire an approval request to a permission event; the decision goes back
    /// as an approval op correlated by the originating event id.
    fn approval_event(
        event_id: &str,
        op_type: &'static str,
        tool_name: &str,
        msg: &Value,
        process: &Arc<AgentProcess>,
    ) -> BridgeEvent {
        let request_id = if event_id.is_empty() {
            format!("req-{}", Uuid::new_v4())
        } else {
            event_id.to_string()
        };

        let inputs = msg.as_object().cloned().unwrap_or_default();

        let (responder, decision_rx) = oneshot::channel::<PermissionDecision>();
        let process = Arc::clone(process);
        let response_id = request_id.clone();
        tokio::spawn(async move {
            let decision = decision_rx.await.unwrap_or(PermissionDecision::Deny);
            let verdict = if decision.approved() {
                "approved"
            } else {
                "denied"
            };
            let line = json!({
                "id": response_id,
                "op": { "type": op_type, "decision": verdict },
            });
            if let Err(err) = process.write_line(line.to_string()).await {
                warn!("failed to deliver approval decision: {err}");
            }
        });

        BridgeEvent::PermissionRequested {
            request: PermissionRequest {
                request_id,
                tool_name: tool_name.to_string(),
                inputs,
            },
            responder,
        }
    }
}

#[async_trait]
impl AgentBridge for CodexBridge {
    fn kind(&self) -> BackendKind {
        BackendKind::Codex
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

        let submit = json!({
            "id": format!("sub-{}", Uuid::new_v4()),
            "op": {
                "type": "user_input",
                "items": [{ "type": "text", "text": turn.prompt }],
            },
        });
        process.write_line(submit.to_string()).await?;

        *active = Some(ActiveTurn {
            process: Arc::clone(&process),
            interrupted: Arc::clone(&interrupted),
        });
        drop(active);

        info!("codex turn started in {}", turn.working_dir.display());

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
            "id": format!("sub-{}", Uuid::new_v4()),
            "op": { "type": "interrupt" },
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

/// Build an assistant transcript entry, folding the latest token counts into
/// the canonical `message.usage` shape.
fn assistant_message(msg: &Value, last_usage: Option<&Value>) -> ChatMessage {
    let content = msg
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut message = json!({ "content": content.clone() });
    if let Some(usage) = last_usage {
        message["usage"] = usage.clone();
    }
    let raw = json!({ "message": message, "native": msg });

    ChatMessage::new(MessageKind::Assistant, Utc::now().timestamp_millis(), content).with_raw(raw)
}

/// Map a codex `token_count` event onto the canonical usage keys.
fn canonical_usage(msg: &Value) -> Value {
    let input = msg.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
    let cached = msg
        .get("cached_input_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let output = msg.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
    json!({
        "input_tokens": input.saturating_sub(cached),
        "cache_read_input_tokens": cached,
        "output_tokens": output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_token_count_to_canonical_usage() {
        let msg = json!({
            "type": "token_count",
            "input_tokens": 120,
            "cached_input_tokens": 100,
            "output_tokens": 9,
        });
        let usage = canonical_usage(&msg);
        assert_eq!(usage["input_tokens"], 20);
        assert_eq!(usage["cache_read_input_tokens"], 100);
        assert_eq!(usage["output_tokens"], 9);
    }

    #[test]
    fn assistant_message_carries_folded_usage() {
        let msg = json!({"type": "agent_message", "message": "done"});
        let usage = json!({"input_tokens": 7, "cache_read_input_tokens": 3});
        let message = assistant_message(&msg, Some(&usage));

        assert_eq!(message.kind, MessageKind::Assistant);
        assert_eq!(message.content, "done");
        let extracted = message.usage().unwrap();
        assert_eq!(extracted.input_tokens, 7);
        assert_eq!(extracted.context_tokens(), 10);
    }

    #[test]
    fn assistant_message_without_usage_has_no_block() {
        let msg = json!({"type": "agent_message", "message": "done"});
        let message = assistant_message(&msg, None);
        assert!(message.usage().is_none());
    }

    #[test]
    fn executable_override_takes_effect() {
        let bridge = CodexBridge::new(&BridgeConfig::default());
        assert_eq!(bridge.executable(), "codex");
        bridge.set_executable(Some("/usr/local/bin/codex".to_string()));
        assert_eq!(bridge.executable(), "/usr/local/bin/codex");
    }
}
