//! Per-project window controller.
//!
//! Owns one session, one handler context, and one dispatcher for a logical
//! project, plus the single event pump that marshals session events into UI
//! calls. The pump is the only consumer of the event stream, which gives the
//! ordering guarantees a cooperative UI thread would: events are applied one
//! at a time, in emission order, with the disposed flag checked immediately
//! before each UI call.
//!
//! Session replacement follows a strict order: clear the UI, interrupt the
//! outgoing session *and wait for confirmation*, only then construct and
//! install the replacement. Skipping the wait lets late callbacks from the
//! old session bleed into state attributed to the new one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, error, info, warn};
use skiff_protocol::{Envelope, SessionEvent, SessionEventPayload};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent::claude::ClaudeBridge;
use crate::agent::codex::CodexBridge;
use crate::agent::{AgentBridge, BackendKind};
use crate::config::BridgeConfig;
use crate::context::HandlerContext;
use crate::dispatch::MessageDispatcher;
use crate::error::Result;
use crate::handlers::{HistoryHandler, PermissionHandler, SessionHandler, SettingsHandler};
use crate::history::HistorySource;
use crate::permission::PermissionCoordinator;
use crate::session::Session;
use crate::settings::{AGENT_EXECUTABLE_KEY, SettingsStore};
use crate::ui::UiSurface;
use crate::usage::UsageSnapshot;

/// Reserved fallback command, applied when no registered handler matches.
const FALLBACK_NEW_SESSION: &str = "create_new_session";

pub struct WindowController {
    project_id: String,
    config: BridgeConfig,
    ctx: Arc<HandlerContext>,
    dispatcher: MessageDispatcher,
    history: Arc<dyn HistorySource>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    pump: std::sync::Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl WindowController {
    pub async fn new(
        project_id: impl Into<String>,
        config: BridgeConfig,
        settings: Arc<dyn SettingsStore>,
        history: Arc<dyn HistorySource>,
        ui: Arc<dyn UiSurface>,
    ) -> Arc<Self> {
        let claude: Arc<dyn AgentBridge> = Arc::new(ClaudeBridge::new(&config));
        let codex: Arc<dyn AgentBridge> = Arc::new(CodexBridge::new(&config));
        Self::with_bridges(project_id, config, settings, history, ui, claude, codex).await
    }

    /// Construct with caller-supplied bridges. This is the full constructor;
    /// [`WindowController::new`] wires in the real CLI bridges.
    pub async fn with_bridges(
        project_id: impl Into<String>,
        config: BridgeConfig,
        settings: Arc<dyn SettingsStore>,
        history: Arc<dyn HistorySource>,
        ui: Arc<dyn UiSurface>,
        claude: Arc<dyn AgentBridge>,
        codex: Arc<dyn AgentBridge>,
    ) -> Arc<Self> {
        let project_id = project_id.into();

        // Sync the active provider into the agent CLI's settings. Failures
        // are logged and the window keeps working.
        if let Err(err) = settings.apply_active_provider() {
            warn!("failed to sync active provider: {err}");
        }

        // A manually configured executable path overrides detection.
        if let Some(path) = settings.get(AGENT_EXECUTABLE_KEY) {
            let path = path.trim();
            if !path.is_empty() {
                info!("using manually configured agent executable: {path}");
                let bridge = match config.backend {
                    BackendKind::Claude => &claude,
                    BackendKind::Codex => &codex,
                };
                bridge.set_executable(Some(path.to_string()));
            }
        }

        let permissions = Arc::new(PermissionCoordinator::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let bridge = match config.backend {
            BackendKind::Claude => Arc::clone(&claude),
            BackendKind::Codex => Arc::clone(&codex),
        };
        let session = Session::new(
            bridge,
            Arc::clone(&history),
            Arc::clone(&permissions),
            config.interrupt_timeout,
        );
        let working_dir = resolve_working_dir(config.project_path.as_deref());
        if let Err(err) = session.set_session_info(None, working_dir.clone()) {
            error!("failed to initialize session: {err}");
        }
        session.set_event_sink(events_tx.clone());
        info!("window for project {project_id} rooted at {}", working_dir.display());

        let ctx = Arc::new(HandlerContext::new(
            session,
            claude,
            codex,
            settings,
            Arc::clone(&permissions),
            ui,
            config.model.clone(),
            config.backend,
        ));

        let controller = Arc::new(Self {
            project_id,
            config,
            ctx: Arc::clone(&ctx),
            dispatcher: MessageDispatcher::new(),
            history,
            events_tx,
            pump: std::sync::Mutex::new(None),
            disposed: AtomicBool::new(false),
        });

        Self::register_handlers(&controller);

        // Denial always cancels whatever turn is in flight at resolution
        // time, which may belong to a newer session than the request.
        {
            let ctx = Arc::downgrade(&ctx);
            permissions.set_deny_hook(move || {
                if let Some(ctx) = ctx.upgrade() {
                    let session = ctx.session();
                    tokio::spawn(async move {
                        if let Err(err) = session.interrupt().await {
                            warn!("interrupt after permission denial failed: {err}");
                        }
                    });
                }
            });
        }

        // Environment probe: non-fatal, surfaced with a remediation path.
        let active = controller.ctx.active_bridge();
        if let Err(err) = active.check_environment().await {
            warn!("environment check failed: {err}");
            controller
                .ctx
                .show_environment_error(&active.executable(), &err.to_string());
        }

        let pump = tokio::spawn(Self::pump_events(Arc::downgrade(&ctx), events_rx));
        *controller.pump.lock().expect("pump lock") = Some(pump);

        controller
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.ctx
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Registration order is dispatch policy: first match wins.
    fn register_handlers(this: &Arc<Self>) {
        this.dispatcher.register(Arc::new(SessionHandler));
        this.dispatcher.register(Arc::new(PermissionHandler));
        this.dispatcher.register(Arc::new(SettingsHandler));

        let controller = Arc::downgrade(this);
        this.dispatcher
            .register(Arc::new(HistoryHandler::new(move |session_id, path| {
                let Some(controller) = controller.upgrade() else {
                    return;
                };
                tokio::spawn(async move {
                    if let Err(err) = controller
                        .open_history_session(&session_id, path.as_deref())
                        .await
                    {
                        error!("failed to open history session {session_id}: {err}");
                    }
                });
            })));

        info!(
            "registered {} message handlers",
            this.dispatcher.handler_count()
        );
    }

    /// Entry point for raw events from the UI surface.
    pub async fn handle_ui_event(&self, raw: &str) {
        if self.is_disposed() {
            return;
        }

        let Some(envelope) = Envelope::parse(raw) else {
            error!("invalid message format: {raw:?}");
            return;
        };

        if self
            .dispatcher
            .dispatch(&self.ctx, envelope.kind, envelope.content)
            .await
        {
            return;
        }

        // Session replacement needs the controller itself, so it lives
        // outside the registry as the reserved fallback.
        if envelope.kind == FALLBACK_NEW_SESSION {
            if let Err(err) = self.create_new_session().await {
                error!("failed to create new session: {err}");
                self.ctx
                    .update_status(&format!("failed to create new session: {err}"));
            }
            return;
        }

        warn!("unknown message type: {}", envelope.kind);
    }

    /// Replace the current session with a fresh, unpersisted one.
    pub async fn create_new_session(&self) -> Result<()> {
        info!("creating new session for project {}", self.project_id);

        self.ctx.call_ui("clearMessages", &[]);

        // The outgoing session must be fully interrupted before the new one
        // is installed; its completion is the barrier.
        let outgoing = self.ctx.session();
        outgoing.interrupt().await?;
        debug!("outgoing session {} wound down", outgoing.instance());

        let session = self.build_session();
        session.set_session_info(None, self.working_dir())?;
        session.set_event_sink(self.events_tx.clone());
        self.ctx.replace_session(Arc::clone(&session));

        self.ctx.update_status("new session ready");
        self.push_usage_reset();
        Ok(())
    }

    /// Replace the current session with a persisted one and load its history.
    pub async fn open_history_session(
        &self,
        session_id: &str,
        project_path: Option<&Path>,
    ) -> Result<()> {
        info!("opening history session {session_id}");

        self.ctx.call_ui("clearMessages", &[]);

        let outgoing = self.ctx.session();
        outgoing.interrupt().await?;

        let session = self.build_session();
        let working_dir = project_path
            .filter(|path| path.exists())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.working_dir());
        session.set_session_info(Some(session_id.to_string()), working_dir)?;
        session.set_event_sink(self.events_tx.clone());
        self.ctx.replace_session(Arc::clone(&session));

        if let Err(err) = session.load_from_server().await {
            self.ctx
                .add_error_message(&format!("failed to load session: {err}"));
            return Err(err);
        }
        Ok(())
    }

    /// Push an editor selection from the host application into the panel.
    pub fn push_selection(&self, selection: &str) {
        if selection.is_empty() {
            return;
        }
        self.ctx.call_ui("addSelectionInfo", &[selection]);
    }

    /// Tear down the window. Idempotent; everything after this is a no-op.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("disposing window for project {}", self.project_id);

        self.ctx.set_disposed();
        self.ctx.permissions().dispose();

        let session = self.ctx.session();
        if let Err(err) = session.interrupt().await {
            warn!("failed to wind down session during disposal: {err}");
        }

        self.dispatcher.clear();
        if let Some(pump) = self.pump.lock().expect("pump lock").take() {
            pump.abort();
        }
    }

    fn build_session(&self) -> Arc<Session> {
        Session::new(
            self.ctx.active_bridge(),
            Arc::clone(&self.history),
            Arc::clone(self.ctx.permissions()),
            self.config.interrupt_timeout,
        )
    }

    fn working_dir(&self) -> PathBuf {
        resolve_working_dir(self.config.project_path.as_deref())
    }

    fn push_usage_reset(&self) {
        push_usage(&self.ctx, UsageSnapshot::zero(&self.ctx.model()));
    }

    /// Single consumer of the session event stream. Events from superseded
    /// sessions are dropped by origin tag; the disposed flag gates every UI
    /// call.
    async fn pump_events(
        ctx: Weak<HandlerContext>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let Some(ctx) = ctx.upgrade() else {
                break;
            };
            if ctx.is_disposed() {
                continue;
            }

            let origin = event.origin;
            let delivered = ctx.with_current_session(origin, || match event.payload {
                SessionEventPayload::MessagesUpdated { messages } => {
                    match serde_json::to_string(&messages) {
                        Ok(json) => ctx.call_ui("updateMessages", &[&json]),
                        Err(err) => error!("failed to encode transcript: {err}"),
                    }
                    push_usage(&ctx, UsageSnapshot::from_messages(&messages, &ctx.model()));
                }
                SessionEventPayload::StateChanged {
                    busy,
                    loading,
                    error,
                } => {
                    ctx.call_ui("showLoading", &[bool_str(busy || loading)]);
                    if let Some(error) = error {
                        ctx.update_status(&format!("Error: {error}"));
                    }
                }
                SessionEventPayload::SessionIdAssigned { session_id } => {
                    info!("session id assigned: {session_id}");
                }
                SessionEventPayload::PermissionRequested { request } => {
                    match serde_json::to_string(&request) {
                        Ok(json) => ctx.call_ui("showPermissionRequest", &[&json]),
                        Err(err) => error!("failed to encode permission request: {err}"),
                    }
                }
                SessionEventPayload::ThinkingChanged { thinking } => {
                    ctx.call_ui("showThinkingStatus", &[bool_str(thinking)]);
                }
            });
            if !delivered {
                debug!("dropping event from superseded session {origin}");
            }
        }
    }
}

fn push_usage(ctx: &HandlerContext, snapshot: UsageSnapshot) {
    match serde_json::to_string(&snapshot) {
        Ok(json) => ctx.call_ui("onUsageUpdate", &[&json]),
        Err(err) => error!("failed to encode usage snapshot: {err}"),
    }
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Project base path when it exists, otherwise the user's home directory.
fn resolve_working_dir(project_path: Option<&Path>) -> PathBuf {
    if let Some(path) = project_path {
        if path.exists() {
            return path.to_path_buf();
        }
        warn!("project path {} does not exist", path.display());
    }
    match dirs::home_dir() {
        Some(home) => {
            warn!("falling back to home directory: {}", home.display());
            home
        }
        None => PathBuf::from("."),
    }
}
