//! Controller registry keyed by project.
//!
//! One window controller exists per logical project at a time. The registry
//! is an explicit value owned by the application context and threaded through
//! constructors, not ambient global state. Host-side entry points (selection
//! injection, session-load requests) route through it.

use std::sync::Arc;

use dashmap::DashMap;
use log::{error, info, warn};

use crate::controller::WindowController;

#[derive(Default)]
pub struct ControllerRegistry {
    controllers: DashMap<String, Arc<WindowController>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller for its project. A previous controller for the
    /// same project is superseded and disposed.
    pub fn insert(&self, controller: Arc<WindowController>) {
        let project_id = controller.project_id().to_string();
        if let Some(old) = self.controllers.insert(project_id.clone(), controller) {
            warn!("project {project_id} already had a window; replacing it");
            tokio::spawn(async move { old.dispose().await });
        }
    }

    pub fn get(&self, project_id: &str) -> Option<Arc<WindowController>> {
        self.controllers
            .get(project_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Detach a controller without disposing it; the caller owns teardown.
    pub fn remove(&self, project_id: &str) -> Option<Arc<WindowController>> {
        self.controllers.remove(project_id).map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Push an editor selection into a project's panel. Disposed windows are
    /// evicted on contact; unknown projects are logged and dropped.
    pub fn push_selection(&self, project_id: &str, selection: &str) {
        let Some(controller) = self.get(project_id) else {
            warn!("no window registered for project {project_id}");
            return;
        };
        if controller.is_disposed() {
            self.controllers
                .remove_if(project_id, |_, c| c.is_disposed());
            return;
        }
        controller.push_selection(selection);
    }

    /// Host-side request to open a persisted session in a project's window.
    /// Returns whether a window accepted the request.
    pub fn request_session_load(
        &self,
        project_id: &str,
        session_id: &str,
        project_path: Option<std::path::PathBuf>,
    ) -> bool {
        let Some(controller) = self.get(project_id) else {
            warn!("no window registered for project {project_id}");
            return false;
        };
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = controller
                .open_history_session(&session_id, project_path.as_deref())
                .await
            {
                error!("session load request failed: {err}");
            }
        });
        true
    }

    /// Dispose and drop every controller. Used at application shutdown.
    pub async fn dispose_all(&self) {
        let drained: Vec<_> = {
            let keys: Vec<String> = self
                .controllers
                .iter()
                .map(|entry| entry.key().clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| self.controllers.remove(&key).map(|(_, c)| c))
                .collect()
        };
        for controller in drained {
            info!("disposing window for project {}", controller.project_id());
            controller.dispose().await;
        }
    }
}
