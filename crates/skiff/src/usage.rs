//! Context-window usage accounting.
//!
//! Usage is derived from the most recent assistant message carrying a
//! `message.usage` block in its backend-native payload, against a per-model
//! context limit. Unknown models fall back to 200k.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;
use skiff_protocol::{ChatMessage, MessageKind, TokenUsage};

/// Context limit assumed for models absent from the table.
pub const DEFAULT_CONTEXT_LIMIT: u64 = 200_000;

static MODEL_CONTEXT_LIMITS: Lazy<HashMap<&'static str, u64>> = Lazy::new(|| {
    HashMap::from([
        ("claude-sonnet-4-5", 200_000),
        ("claude-opus-4-5-20251101", 200_000),
        ("gpt-5-codex", 272_000),
    ])
});

/// Context limit for a model id.
pub fn context_limit(model: &str) -> u64 {
    MODEL_CONTEXT_LIMITS
        .get(model)
        .copied()
        .unwrap_or(DEFAULT_CONTEXT_LIMIT)
}

/// Flat usage record pushed to the UI surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub used_tokens: u64,
    pub max_tokens: u64,
    /// 0–100, clamped.
    pub percentage: u8,
}

impl UsageSnapshot {
    /// Empty usage against a model's limit. Pushed on new-session creation.
    pub fn zero(model: &str) -> Self {
        Self {
            used_tokens: 0,
            max_tokens: context_limit(model),
            percentage: 0,
        }
    }

    /// Scan the transcript backward for the last assistant message with a
    /// usage block; no block anywhere means zero usage.
    pub fn from_messages(messages: &[ChatMessage], model: &str) -> Self {
        let usage = messages
            .iter()
            .rev()
            .filter(|m| m.kind == MessageKind::Assistant)
            .find_map(ChatMessage::usage)
            .unwrap_or_default();

        Self::compute(usage, context_limit(model))
    }

    fn compute(usage: TokenUsage, limit: u64) -> Self {
        let used = usage.context_tokens();
        let percentage = if limit == 0 {
            0
        } else {
            let pct = (used as f64 * 100.0 / limit as f64).round() as u64;
            pct.min(100) as u8
        };
        Self {
            used_tokens: used,
            max_tokens: limit,
            percentage,
        }
    }
}
