//! Shared fixtures for integration tests: a scriptable bridge, a recording
//! UI surface, and a canned history source.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use skiff::agent::{AgentBridge, BackendKind, BridgeEvent, TurnRequest};
use skiff::error::{Result, SkiffError};
use skiff::history::HistorySource;
use skiff::ui::UiSurface;
use skiff_protocol::{ChatMessage, MessageKind, PermissionDecision, PermissionRequest};
use tokio::sync::{mpsc, oneshot};

/// Cloneable description of a bridge event, materialized at send time.
#[derive(Debug, Clone)]
pub enum ScriptEvent {
    SessionId(String),
    Assistant {
        content: String,
        usage: Option<(u64, u64, u64)>,
    },
    Thinking(bool),
    Permission {
        id: String,
        tool: String,
    },
}

/// Script for one turn.
#[derive(Debug, Clone)]
pub enum Turn {
    /// Deliver events, then complete.
    Complete {
        events: Vec<ScriptEvent>,
        error: Option<String>,
    },
    /// Deliver events, then stay open until interrupted. `on_interrupt`
    /// simulates late backend output racing the cancellation.
    Hang {
        events: Vec<ScriptEvent>,
        on_interrupt: Vec<ScriptEvent>,
    },
}

impl Default for Turn {
    fn default() -> Self {
        Self::Complete {
            events: Vec::new(),
            error: None,
        }
    }
}

/// Bridge that replays scripted turns and records interactions.
pub struct ScriptedBridge {
    turns: Mutex<VecDeque<Turn>>,
    active: Mutex<Option<(mpsc::Sender<BridgeEvent>, Vec<ScriptEvent>)>>,
    pub sends: AtomicUsize,
    pub interrupts: AtomicUsize,
    /// Permission decisions the "backend" received, in arrival order.
    pub decisions: Arc<Mutex<Vec<(String, PermissionDecision)>>>,
}

impl ScriptedBridge {
    pub fn new(turns: Vec<Turn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            active: Mutex::new(None),
            sends: AtomicUsize::new(0),
            interrupts: AtomicUsize::new(0),
            decisions: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn materialize(&self, event: ScriptEvent) -> BridgeEvent {
        match event {
            ScriptEvent::SessionId(session_id) => BridgeEvent::SessionStarted { session_id },
            ScriptEvent::Assistant { content, usage } => {
                let mut message = ChatMessage::new(MessageKind::Assistant, 1, content);
                if let Some((input, cache_creation, cache_read)) = usage {
                    message = message.with_raw(json!({
                        "message": {
                            "usage": {
                                "input_tokens": input,
                                "cache_creation_input_tokens": cache_creation,
                                "cache_read_input_tokens": cache_read,
                            }
                        }
                    }));
                }
                BridgeEvent::Message(message)
            }
            ScriptEvent::Thinking(thinking) => BridgeEvent::Thinking(thinking),
            ScriptEvent::Permission { id, tool } => {
                let (responder, decision_rx) = oneshot::channel();
                let decisions = Arc::clone(&self.decisions);
                let request_id = id.clone();
                tokio::spawn(async move {
                    if let Ok(decision) = decision_rx.await {
                        decisions.lock().unwrap().push((request_id, decision));
                    }
                });
                BridgeEvent::PermissionRequested {
                    request: PermissionRequest {
                        request_id: id,
                        tool_name: tool,
                        inputs: Default::default(),
                    },
                    responder,
                }
            }
        }
    }
}

#[async_trait]
impl AgentBridge for ScriptedBridge {
    fn kind(&self) -> BackendKind {
        BackendKind::Claude
    }

    async fn check_environment(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, _turn: TurnRequest) -> Result<mpsc::Receiver<BridgeEvent>> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let turn = self.turns.lock().unwrap().pop_front().unwrap_or_default();
        let (tx, rx) = mpsc::channel(64);

        match turn {
            Turn::Complete { events, error } => {
                for event in events {
                    tx.try_send(self.materialize(event)).unwrap();
                }
                tx.try_send(BridgeEvent::TurnCompleted { error }).unwrap();
            }
            Turn::Hang {
                events,
                on_interrupt,
            } => {
                for event in events {
                    tx.try_send(self.materialize(event)).unwrap();
                }
                *self.active.lock().unwrap() = Some((tx, on_interrupt));
            }
        }
        Ok(rx)
    }

    async fn interrupt(&self) -> Result<()> {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        let taken = self.active.lock().unwrap().take();
        if let Some((tx, late)) = taken {
            for event in late {
                let _ = tx.try_send(self.materialize(event));
            }
            let _ = tx.try_send(BridgeEvent::TurnCompleted { error: None });
        }
        Ok(())
    }

    fn set_executable(&self, _path: Option<String>) {}

    fn executable(&self) -> String {
        "scripted".to_string()
    }
}

/// UI surface that records every call.
#[derive(Default)]
pub struct RecordingUi {
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingUi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, function: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == function)
            .count()
    }

    pub fn last_arg(&self, function: &str) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(name, _)| name == function)
            .and_then(|(_, args)| args.first().cloned())
    }
}

impl UiSurface for RecordingUi {
    fn invoke(&self, function: &str, args: &[String]) {
        self.calls
            .lock()
            .unwrap()
            .push((function.to_string(), args.to_vec()));
    }
}

/// Canned history source.
pub struct StaticHistory {
    pub messages: Vec<ChatMessage>,
    pub fail: bool,
}

impl StaticHistory {
    pub fn with_messages(messages: Vec<ChatMessage>) -> Arc<Self> {
        Arc::new(Self {
            messages,
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            messages: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl HistorySource for StaticHistory {
    async fn load(&self, _session_id: &str, _working_dir: &Path) -> Result<Vec<ChatMessage>> {
        if self.fail {
            Err(SkiffError::history("canned failure"))
        } else {
            Ok(self.messages.clone())
        }
    }
}

/// Poll until `cond` holds, panicking after two seconds.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}
