//! Shared handler dependencies.
//!
//! One `HandlerContext` exists per window controller. It is the single point
//! of mutable shared state across handlers: the current session lives behind
//! an indirection that is replaced wholesale on session swap, so every
//! handler observes replacement atomically by re-reading it per dispatched
//! event. Caching a session reference across events is a bug.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::agent::{AgentBridge, BackendKind};
use crate::permission::PermissionCoordinator;
use crate::session::Session;
use crate::settings::SettingsStore;
use crate::ui::{UiSurface, escape_arg};

pub struct HandlerContext {
    session: std::sync::RwLock<Arc<Session>>,
    claude: Arc<dyn AgentBridge>,
    codex: Arc<dyn AgentBridge>,
    settings: Arc<dyn SettingsStore>,
    permissions: Arc<PermissionCoordinator>,
    ui: Arc<dyn UiSurface>,
    model: std::sync::RwLock<String>,
    backend: std::sync::RwLock<BackendKind>,
    disposed: AtomicBool,
}

impl HandlerContext {
    pub fn new(
        session: Arc<Session>,
        claude: Arc<dyn AgentBridge>,
        codex: Arc<dyn AgentBridge>,
        settings: Arc<dyn SettingsStore>,
        permissions: Arc<PermissionCoordinator>,
        ui: Arc<dyn UiSurface>,
        model: String,
        backend: BackendKind,
    ) -> Self {
        Self {
            session: std::sync::RwLock::new(session),
            claude,
            codex,
            settings,
            permissions,
            ui,
            model: std::sync::RwLock::new(model),
            backend: std::sync::RwLock::new(backend),
            disposed: AtomicBool::new(false),
        }
    }

    /// The current session. Re-read this per event; never hold it across an
    /// event boundary.
    pub fn session(&self) -> Arc<Session> {
        self.session.read().expect("session lock").clone()
    }

    /// Install a replacement session. The outgoing session must already be
    /// interrupted (see the replacement protocol in the controller).
    pub fn replace_session(&self, session: Arc<Session>) {
        *self.session.write().expect("session lock") = session;
    }

    /// Run `deliver` only when `origin` identifies the current session,
    /// holding the session slot for the duration. Replacement cannot
    /// interleave mid-delivery, so an event from a superseded session can
    /// never land after its successor was installed.
    pub fn with_current_session(&self, origin: u64, deliver: impl FnOnce()) -> bool {
        let session = self.session.read().expect("session lock");
        if session.instance() != origin {
            return false;
        }
        deliver();
        true
    }

    /// Bridge for the given backend.
    pub fn bridge(&self, kind: BackendKind) -> Arc<dyn AgentBridge> {
        match kind {
            BackendKind::Claude => Arc::clone(&self.claude),
            BackendKind::Codex => Arc::clone(&self.codex),
        }
    }

    /// Bridge new sessions will bind to.
    pub fn active_bridge(&self) -> Arc<dyn AgentBridge> {
        self.bridge(self.backend())
    }

    pub fn backend(&self) -> BackendKind {
        *self.backend.read().expect("backend lock")
    }

    /// Takes effect for the next session; the current one keeps its bridge.
    pub fn set_backend(&self, kind: BackendKind) {
        *self.backend.write().expect("backend lock") = kind;
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    pub fn permissions(&self) -> &Arc<PermissionCoordinator> {
        &self.permissions
    }

    pub fn model(&self) -> String {
        self.model.read().expect("model lock").clone()
    }

    pub fn set_model(&self, model: String) {
        *self.model.write().expect("model lock") = model;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn set_disposed(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// Deliver a UI call with each argument escaped. The disposed flag is
    /// checked at the last possible point so nothing reaches a torn-down
    /// surface.
    pub fn call_ui(&self, function: &str, args: &[&str]) {
        if self.is_disposed() {
            return;
        }
        let escaped: Vec<String> = args.iter().map(|arg| escape_arg(arg)).collect();
        self.ui.invoke(function, &escaped);
    }

    pub fn update_status(&self, message: &str) {
        self.call_ui("updateStatus", &[message]);
    }

    pub fn add_error_message(&self, message: &str) {
        self.call_ui("addErrorMessage", &[message]);
    }

    /// Environment failure panel with the probed executable, so the user can
    /// fix the path manually.
    pub fn show_environment_error(&self, executable: &str, message: &str) {
        self.call_ui("showEnvironmentError", &[executable, message]);
    }
}
