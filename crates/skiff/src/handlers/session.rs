//! Turn lifecycle commands.

use async_trait::async_trait;

use crate::context::HandlerContext;
use crate::dispatch::MessageHandler;
use crate::error::Result;

/// Starts and interrupts turns on the current session.
pub struct SessionHandler;

#[async_trait]
impl MessageHandler for SessionHandler {
    fn accepts(&self) -> &[&str] {
        &["send_message", "interrupt_session"]
    }

    async fn handle(&self, ctx: &HandlerContext, kind: &str, content: &str) -> Result<()> {
        // Always re-read the session: it may have been replaced since the
        // previous event.
        let session = ctx.session();
        match kind {
            "send_message" => match session.send(content, Some(ctx.model())).await {
                Ok(()) => Ok(()),
                Err(err) if err.is_busy() => {
                    // Policy: reject, never queue. The user interrupts first.
                    ctx.update_status("a turn is already in flight; interrupt it first");
                    Ok(())
                }
                Err(err) => Err(err),
            },
            "interrupt_session" => session.interrupt().await,
            _ => Ok(()),
        }
    }
}
