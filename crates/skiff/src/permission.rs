//! Permission request/decision correlation.
//!
//! Bridges hand gated tool calls here together with a one-shot responder; the
//! UI answers through [`PermissionCoordinator::resolve`]. Every request gets
//! exactly one decision: explicit, default-deny on disposal, or implicit deny
//! when a responder is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use log::{info, warn};
use skiff_protocol::{PermissionDecision, PermissionRequest};
use tokio::sync::oneshot;

type DenyHook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct PermissionCoordinator {
    pending: Mutex<HashMap<String, oneshot::Sender<PermissionDecision>>>,
    /// Invoked on every denial. The controller installs a hook that
    /// interrupts whichever session is current at resolution time.
    deny_hook: RwLock<Option<DenyHook>>,
    disposed: AtomicBool,
}

impl PermissionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_deny_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.deny_hook.write().expect("deny hook lock") = Some(Box::new(hook));
    }

    /// Track a request until the UI answers it.
    ///
    /// After disposal there is no UI left to ask, so the request is denied on
    /// the spot rather than leaving the bridge blocked.
    pub fn register(
        &self,
        request: &PermissionRequest,
        responder: oneshot::Sender<PermissionDecision>,
    ) {
        if self.disposed.load(Ordering::Acquire) {
            warn!(
                "permission request {} arrived after disposal, denying",
                request.request_id
            );
            let _ = responder.send(PermissionDecision::Deny);
            return;
        }

        let mut pending = self.pending.lock().expect("pending lock");
        if let Some(stale) = pending.insert(request.request_id.clone(), responder) {
            warn!(
                "duplicate permission request id {}, denying the stale one",
                request.request_id
            );
            let _ = stale.send(PermissionDecision::Deny);
        }
    }

    /// Deliver the user's decision. Returns whether a pending request matched.
    pub fn resolve(&self, request_id: &str, decision: PermissionDecision) -> bool {
        let responder = {
            let mut pending = self.pending.lock().expect("pending lock");
            pending.remove(request_id)
        };

        let Some(responder) = responder else {
            warn!("no pending permission request for id {request_id}");
            return false;
        };

        info!("permission {request_id} resolved: {decision:?}");
        // The bridge side may already be gone (turn over); that is fine.
        let _ = responder.send(decision);

        if !decision.approved() {
            let hook = self.deny_hook.read().expect("deny hook lock");
            if let Some(hook) = hook.as_ref() {
                hook();
            }
        }
        true
    }

    /// Deny everything still pending and refuse future registrations.
    /// Safe to call more than once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<_> = {
            let mut pending = self.pending.lock().expect("pending lock");
            pending.drain().collect()
        };
        for (request_id, responder) in drained {
            info!("denying pending permission {request_id} on disposal");
            let _ = responder.send(PermissionDecision::Deny);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending lock").len()
    }
}
