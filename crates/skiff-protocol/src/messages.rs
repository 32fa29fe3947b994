//! Canonical transcript message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who (or what) produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Input submitted by the user.
    User,
    /// Output produced by the agent.
    Assistant,
    /// Bridge- or session-originated notice.
    System,
    /// A failure surfaced into the transcript.
    Error,
}

/// A single entry in a conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub kind: MessageKind,
    /// Unix ms timestamp.
    pub timestamp: i64,
    /// Display text. May be empty for entries that only carry `raw`.
    #[serde(default)]
    pub content: String,
    /// Backend-native payload, opaque to everything except usage accounting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl ChatMessage {
    pub fn new(kind: MessageKind, timestamp: i64, content: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp,
            content: content.into(),
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Extract the `message.usage` block from the backend-native payload.
    ///
    /// Returns `None` when there is no raw payload, the payload has no usage
    /// block, or the block does not deserialize.
    pub fn usage(&self) -> Option<TokenUsage> {
        let usage = self.raw.as_ref()?.get("message")?.get("usage")?;
        serde_json::from_value(usage.clone()).ok()
    }
}

/// Token usage block carried on assistant messages.
///
/// Field names match the backend wire format; absent fields count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Tokens occupying the context window: prompt input plus both cache
    /// classes.
    pub fn context_tokens(&self) -> u64 {
        self.input_tokens + self.cache_creation_input_tokens + self.cache_read_input_tokens
    }
}
