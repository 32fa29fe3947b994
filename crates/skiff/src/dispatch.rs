//! Inbound UI event dispatch.
//!
//! Handlers register in a fixed order; dispatch walks the list and the first
//! handler whose accepted type set contains the event's tag processes it.
//! Registration order is therefore a policy decision, not an accident: a
//! later registration for an already-claimed tag is never reached.

use std::sync::Arc;

use async_trait::async_trait;
use log::error;

use crate::context::HandlerContext;
use crate::error::Result;

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Type tags this handler accepts.
    fn accepts(&self) -> &[&str];

    /// Process one event. Only invoked when `accepts` contains `kind`.
    async fn handle(&self, ctx: &HandlerContext, kind: &str, content: &str) -> Result<()>;
}

/// Ordered, first-match handler registry.
///
/// Stateless beyond its handler list; all side effects happen inside the
/// invoked handler.
#[derive(Default)]
pub struct MessageDispatcher {
    handlers: std::sync::RwLock<Vec<Arc<dyn MessageHandler>>>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler. No de-duplication.
    pub fn register(&self, handler: Arc<dyn MessageHandler>) {
        self.handlers.write().expect("handler lock").push(handler);
    }

    /// Route one event. Returns whether any handler claimed it; the caller
    /// applies its fallback (and logs) on `false`.
    ///
    /// Handler failures never propagate: they are logged and surfaced to the
    /// user as a status message, and the event still counts as handled.
    pub async fn dispatch(&self, ctx: &HandlerContext, kind: &str, content: &str) -> bool {
        let handler = {
            let handlers = self.handlers.read().expect("handler lock");
            handlers
                .iter()
                .find(|handler| handler.accepts().contains(&kind))
                .cloned()
        };

        let Some(handler) = handler else {
            return false;
        };

        if let Err(err) = handler.handle(ctx, kind, content).await {
            error!("handler for '{kind}' failed: {err}");
            ctx.update_status(&format!("Error: {err}"));
        }
        true
    }

    /// Empty the registry. Used during disposal; no dispatches are expected
    /// afterward.
    pub fn clear(&self) {
        self.handlers.write().expect("handler lock").clear();
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().expect("handler lock").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::agent::claude::ClaudeBridge;
    use crate::agent::codex::CodexBridge;
    use crate::config::BridgeConfig;
    use crate::history::JsonlHistorySource;
    use crate::permission::PermissionCoordinator;
    use crate::session::Session;
    use crate::settings::MemorySettings;
    use crate::ui::UiSurface;

    struct NullUi;

    impl UiSurface for NullUi {
        fn invoke(&self, _function: &str, _args: &[String]) {}
    }

    fn test_context() -> HandlerContext {
        let config = BridgeConfig::default();
        let claude = Arc::new(ClaudeBridge::new(&config));
        let codex = Arc::new(CodexBridge::new(&config));
        let permissions = Arc::new(PermissionCoordinator::new());
        let session = Session::new(
            claude.clone(),
            Arc::new(JsonlHistorySource::new(PathBuf::from("/nonexistent"))),
            Arc::clone(&permissions),
            Duration::from_secs(1),
        );
        HandlerContext::new(
            session,
            claude,
            codex,
            Arc::new(MemorySettings::new()),
            permissions,
            Arc::new(NullUi),
            "claude-sonnet-4-5".to_string(),
            crate::agent::BackendKind::Claude,
        )
    }

    struct CountingHandler {
        tags: Vec<&'static str>,
        hits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        fn accepts(&self) -> &[&str] {
            &self.tags
        }

        async fn handle(&self, _ctx: &HandlerContext, _kind: &str, _content: &str) -> Result<()> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn empty_registry_handles_nothing() {
        let dispatcher = MessageDispatcher::new();
        let ctx = test_context();
        assert!(!dispatcher.dispatch(&ctx, "anything", "").await);
        assert_eq!(dispatcher.handler_count(), 0);
    }

    #[tokio::test]
    async fn first_registered_match_wins() {
        let dispatcher = MessageDispatcher::new();
        let ctx = test_context();

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        dispatcher.register(Arc::new(CountingHandler {
            tags: vec!["ping"],
            hits: Arc::clone(&first),
        }));
        dispatcher.register(Arc::new(CountingHandler {
            tags: vec!["ping", "pong"],
            hits: Arc::clone(&second),
        }));

        assert!(dispatcher.dispatch(&ctx, "ping", "").await);
        assert!(dispatcher.dispatch(&ctx, "ping", "").await);
        assert!(dispatcher.dispatch(&ctx, "pong", "").await);

        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tag_is_not_handled() {
        let dispatcher = MessageDispatcher::new();
        let ctx = test_context();
        dispatcher.register(Arc::new(CountingHandler {
            tags: vec!["known"],
            hits: Arc::new(AtomicUsize::new(0)),
        }));
        assert!(!dispatcher.dispatch(&ctx, "unknown", "payload").await);
    }

    #[tokio::test]
    async fn clear_empties_the_registry() {
        let dispatcher = MessageDispatcher::new();
        let ctx = test_context();
        dispatcher.register(Arc::new(CountingHandler {
            tags: vec!["known"],
            hits: Arc::new(AtomicUsize::new(0)),
        }));
        dispatcher.clear();
        assert_eq!(dispatcher.handler_count(), 0);
        assert!(!dispatcher.dispatch(&ctx, "known", "").await);
    }
}
