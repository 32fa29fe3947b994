//! Conversation session state machine.
//!
//! A `Session` binds one conversation's identity, transcript, and backend
//! bridge. It is `IDLE` until a turn starts (`busy`), with a parallel
//! `loading` flag for history fetches. At most one backend turn is in flight
//! per session; a second `send` is rejected, never queued.
//!
//! All notifications leave through a single ordered event stream
//! ([`SessionEvent`]); interruption is modeled as a cancellation token plus a
//! completion channel so callers can treat `interrupt().await` as the
//! cancellation barrier before replacing or discarding the session.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use skiff_protocol::{ChatMessage, MessageKind, SessionEvent, SessionEventPayload};
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentBridge, BridgeEvent, TurnRequest};
use crate::error::{Result, SkiffError};
use crate::history::HistorySource;
use crate::permission::PermissionCoordinator;

/// How long a forced cancellation waits for the driver to wind down.
const FORCED_CANCEL_GRACE: Duration = Duration::from_secs(1);

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

pub struct Session {
    /// Monotonic instance tag carried on every emitted event.
    instance: u64,
    bridge: Arc<dyn AgentBridge>,
    history: Arc<dyn HistorySource>,
    permissions: Arc<PermissionCoordinator>,

    /// `set_session_info` is one-time initialization, not a toggle.
    info_set: AtomicBool,
    session_id: std::sync::RwLock<Option<String>>,
    working_dir: std::sync::RwLock<Option<PathBuf>>,

    messages: RwLock<Vec<ChatMessage>>,
    busy: AtomicBool,
    loading: AtomicBool,

    /// Single event subscriber; replaced wholesale, never fanned out.
    events: std::sync::RwLock<Option<mpsc::UnboundedSender<SessionEvent>>>,
    active_turn: Mutex<Option<ActiveTurn>>,
    interrupt_timeout: Duration,
}

#[derive(Clone)]
struct ActiveTurn {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
    /// Guarantees exactly one backend cancellation request per turn even
    /// under concurrent `interrupt` calls.
    interrupt_sent: Arc<AtomicBool>,
}

impl Session {
    pub fn new(
        bridge: Arc<dyn AgentBridge>,
        history: Arc<dyn HistorySource>,
        permissions: Arc<PermissionCoordinator>,
        interrupt_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            bridge,
            history,
            permissions,
            info_set: AtomicBool::new(false),
            session_id: std::sync::RwLock::new(None),
            working_dir: std::sync::RwLock::new(None),
            messages: RwLock::new(Vec::new()),
            busy: AtomicBool::new(false),
            loading: AtomicBool::new(false),
            events: std::sync::RwLock::new(None),
            active_turn: Mutex::new(None),
            interrupt_timeout,
        })
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Bind the single event subscriber.
    pub fn set_event_sink(&self, sink: mpsc::UnboundedSender<SessionEvent>) {
        *self.events.write().expect("event sink lock") = Some(sink);
    }

    /// One-time initialization: a `None` session id means a fresh,
    /// unpersisted conversation.
    pub fn set_session_info(
        &self,
        session_id: Option<String>,
        working_dir: PathBuf,
    ) -> Result<()> {
        if self.info_set.swap(true, Ordering::AcqRel) {
            return Err(SkiffError::internal("session info already set"));
        }
        *self.session_id.write().expect("session id lock") = session_id;
        *self.working_dir.write().expect("working dir lock") = Some(working_dir);
        Ok(())
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().expect("session id lock").clone()
    }

    pub fn working_dir(&self) -> Option<PathBuf> {
        self.working_dir.read().expect("working dir lock").clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.messages.read().await.clone()
    }

    /// Start a turn. Valid only from idle; callers must interrupt first if a
    /// turn is in flight.
    pub async fn send(
        self: Arc<Self>,
        prompt: impl Into<String>,
        model: Option<String>,
    ) -> Result<()> {
        let prompt = prompt.into();
        let working_dir = self
            .working_dir()
            .ok_or_else(|| SkiffError::internal("session info not set"))?;

        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(SkiffError::Busy);
        }

        // The user's input enters the transcript before the backend replies.
        {
            let mut messages = self.messages.write().await;
            messages.push(ChatMessage::new(
                MessageKind::User,
                Utc::now().timestamp_millis(),
                prompt.clone(),
            ));
            let snapshot = messages.clone();
            drop(messages);
            self.emit(SessionEventPayload::MessagesUpdated { messages: snapshot });
        }
        self.emit_state(None);

        let turn = TurnRequest {
            prompt,
            session_id: self.session_id(),
            working_dir,
            model,
        };

        let event_rx = match self.bridge.send(turn).await {
            Ok(rx) => rx,
            Err(err) => {
                self.busy.store(false, Ordering::Release);
                self.emit_state(Some(err.to_string()));
                return Err(err);
            }
        };

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        {
            let mut active = self.active_turn.lock().await;
            *active = Some(ActiveTurn {
                cancel: cancel.clone(),
                done: done_rx,
                interrupt_sent: Arc::new(AtomicBool::new(false)),
            });
        }

        tokio::spawn(Arc::clone(&self).drive_turn(event_rx, cancel, done_tx));
        Ok(())
    }

    /// Consume the bridge stream until the turn completes or is forced down.
    async fn drive_turn(
        self: Arc<Self>,
        mut events: mpsc::Receiver<BridgeEvent>,
        cancel: CancellationToken,
        done_tx: watch::Sender<bool>,
    ) {
        let mut turn_error: Option<String> = None;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("turn forced down without backend confirmation");
                    break;
                }
                event = events.recv() => event,
            };

            let Some(event) = event else {
                // Bridges terminate every stream with TurnCompleted; a bare
                // close means the translator died.
                turn_error = Some("bridge stream ended unexpectedly".to_string());
                break;
            };

            match event {
                BridgeEvent::SessionStarted { session_id } => {
                    self.adopt_session_id(session_id);
                }
                BridgeEvent::Message(message) => {
                    let mut messages = self.messages.write().await;
                    messages.push(message);
                    let snapshot = messages.clone();
                    drop(messages);
                    self.emit(SessionEventPayload::MessagesUpdated { messages: snapshot });
                }
                BridgeEvent::Thinking(thinking) => {
                    self.emit(SessionEventPayload::ThinkingChanged { thinking });
                }
                BridgeEvent::PermissionRequested { request, responder } => {
                    self.permissions.register(&request, responder);
                    self.emit(SessionEventPayload::PermissionRequested { request });
                }
                BridgeEvent::TurnCompleted { error } => {
                    turn_error = error;
                    break;
                }
            }
        }

        if let Some(err) = &turn_error {
            warn!("turn ended with error: {err}");
        }

        self.busy.store(false, Ordering::Release);
        self.active_turn.lock().await.take();
        // Emit the final state before signaling completion so the event is
        // queued ahead of anything a replacement session produces.
        self.emit_state(turn_error);
        let _ = done_tx.send(true);
    }

    /// Request cancellation of the in-flight turn and wait for confirmation.
    ///
    /// Idempotent: on an idle session this completes immediately with no side
    /// effect, and concurrent calls produce a single backend cancellation
    /// request. Completion of this future — not its invocation — is the
    /// cancellation barrier.
    pub async fn interrupt(&self) -> Result<()> {
        let turn = { self.active_turn.lock().await.clone() };
        let Some(turn) = turn else {
            return Ok(());
        };

        if !turn.interrupt_sent.swap(true, Ordering::AcqRel) {
            if let Err(err) = self.bridge.interrupt().await {
                warn!("backend interrupt request failed, forcing the turn down: {err}");
                turn.cancel.cancel();
            }
        }

        if !await_done(turn.done.clone(), self.interrupt_timeout).await {
            warn!(
                "backend did not confirm interruption within {:?}, forcing the turn down",
                self.interrupt_timeout
            );
            turn.cancel.cancel();
            await_done(turn.done.clone(), FORCED_CANCEL_GRACE).await;
        }
        Ok(())
    }

    /// Fetch persisted history and replace the transcript wholesale.
    ///
    /// Valid on a freshly constructed session carrying a persisted id. On
    /// failure the transcript is left empty, never partially populated.
    pub async fn load_from_server(&self) -> Result<()> {
        let session_id = self.session_id().ok_or(SkiffError::NoSessionId)?;
        let working_dir = self
            .working_dir()
            .ok_or_else(|| SkiffError::internal("session info not set"))?;

        if self.loading.swap(true, Ordering::AcqRel) {
            return Err(SkiffError::Loading);
        }
        self.emit(SessionEventPayload::StateChanged {
            busy: self.is_busy(),
            loading: true,
            error: None,
        });

        let outcome = match self.history.load(&session_id, &working_dir).await {
            Ok(history) => {
                info!("loaded {} messages for session {session_id}", history.len());
                let mut messages = self.messages.write().await;
                *messages = history;
                let snapshot = messages.clone();
                drop(messages);
                self.emit(SessionEventPayload::MessagesUpdated { messages: snapshot });
                Ok(())
            }
            Err(err) => {
                self.messages.write().await.clear();
                self.emit(SessionEventPayload::MessagesUpdated {
                    messages: Vec::new(),
                });
                Err(err)
            }
        };

        self.loading.store(false, Ordering::Release);
        self.emit(SessionEventPayload::StateChanged {
            busy: self.is_busy(),
            loading: false,
            error: outcome.as_ref().err().map(ToString::to_string),
        });
        outcome
    }

    fn adopt_session_id(&self, session_id: String) {
        let was_unset = {
            let mut current = self.session_id.write().expect("session id lock");
            let was_unset = current.is_none();
            *current = Some(session_id.clone());
            was_unset
        };
        if was_unset {
            info!("backend assigned session id {session_id}");
            self.emit(SessionEventPayload::SessionIdAssigned { session_id });
        }
    }

    fn emit_state(&self, error: Option<String>) {
        self.emit(SessionEventPayload::StateChanged {
            busy: self.is_busy(),
            loading: self.is_loading(),
            error,
        });
    }

    fn emit(&self, payload: SessionEventPayload) {
        let sink = self.events.read().expect("event sink lock");
        if let Some(sink) = sink.as_ref() {
            let event = SessionEvent {
                origin: self.instance,
                ts: Utc::now().timestamp_millis(),
                payload,
            };
            if sink.send(event).is_err() {
                debug!("event sink closed, dropping session event");
            }
        }
    }
}

/// Wait until the completion channel reads `true`. Returns `false` on
/// timeout.
async fn await_done(mut done: watch::Receiver<bool>, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, async {
        while !*done.borrow_and_update() {
            if done.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .is_ok()
}
