//! Permission decision routing.

use async_trait::async_trait;
use log::warn;
use skiff_protocol::permission::PermissionReply;

use crate::context::HandlerContext;
use crate::dispatch::MessageHandler;
use crate::error::Result;

/// Feeds UI permission decisions back into the coordinator.
pub struct PermissionHandler;

#[async_trait]
impl MessageHandler for PermissionHandler {
    fn accepts(&self) -> &[&str] {
        &["permission_response"]
    }

    async fn handle(&self, ctx: &HandlerContext, _kind: &str, content: &str) -> Result<()> {
        let reply: PermissionReply = serde_json::from_str(content)?;
        if !ctx.permissions().resolve(&reply.request_id, reply.decision()) {
            warn!(
                "permission response for unknown request {}",
                reply.request_id
            );
        }
        Ok(())
    }
}
