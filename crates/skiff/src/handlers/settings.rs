//! Model, backend, and executable configuration commands.

use async_trait::async_trait;
use log::info;

use crate::agent::BackendKind;
use crate::context::HandlerContext;
use crate::dispatch::MessageHandler;
use crate::error::{Result, SkiffError};
use crate::settings::AGENT_EXECUTABLE_KEY;

pub struct SettingsHandler;

#[async_trait]
impl MessageHandler for SettingsHandler {
    fn accepts(&self) -> &[&str] {
        &["set_model", "set_backend", "set_agent_executable"]
    }

    async fn handle(&self, ctx: &HandlerContext, kind: &str, content: &str) -> Result<()> {
        match kind {
            "set_model" => {
                let model = content.trim();
                if model.is_empty() {
                    return Err(SkiffError::internal("empty model id"));
                }
                info!("model set to {model}");
                ctx.set_model(model.to_string());
                Ok(())
            }
            "set_backend" => {
                let backend: BackendKind = content
                    .trim()
                    .parse()
                    .map_err(SkiffError::Internal)?;
                info!("backend for new sessions set to {backend}");
                ctx.set_backend(backend);
                Ok(())
            }
            "set_agent_executable" => {
                let path = content.trim();
                let value = (!path.is_empty()).then(|| path.to_string());
                ctx.settings().set(AGENT_EXECUTABLE_KEY, value.clone())?;

                let bridge = ctx.active_bridge();
                bridge.set_executable(value);
                match bridge.check_environment().await {
                    Ok(()) => {
                        info!("agent executable verified: {}", bridge.executable());
                        ctx.update_status("agent runtime found");
                    }
                    Err(err) => {
                        ctx.show_environment_error(&bridge.executable(), &err.to_string());
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
