//! History-load command.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::context::HandlerContext;
use crate::dispatch::MessageHandler;
use crate::error::Result;

#[derive(Debug, Deserialize)]
struct LoadSessionCommand {
    session_id: String,
    #[serde(default)]
    project_path: Option<PathBuf>,
}

type LoadCallback = Box<dyn Fn(String, Option<PathBuf>) + Send + Sync>;

/// Parses `load_session` commands and forwards them to the controller, which
/// owns the session replacement protocol.
pub struct HistoryHandler {
    on_load: LoadCallback,
}

impl HistoryHandler {
    pub fn new(on_load: impl Fn(String, Option<PathBuf>) + Send + Sync + 'static) -> Self {
        Self {
            on_load: Box::new(on_load),
        }
    }
}

#[async_trait]
impl MessageHandler for HistoryHandler {
    fn accepts(&self) -> &[&str] {
        &["load_session"]
    }

    async fn handle(&self, _ctx: &HandlerContext, _kind: &str, content: &str) -> Result<()> {
        let command: LoadSessionCommand = serde_json::from_str(content)?;
        (self.on_load)(command.session_id, command.project_path);
        Ok(())
    }
}
