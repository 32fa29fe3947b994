//! Error types for the skiff core.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkiffError>;

/// Shared error type for the session/dispatch core.
///
/// Nothing here is fatal to the hosting process: every variant is scoped to
/// the current session or window instance and surfaces as a user-visible
/// message.
#[derive(Error, Debug)]
pub enum SkiffError {
    /// The agent runtime could not be found or probed. Carries the probed
    /// executable so the remediation prompt can show it.
    #[error("agent runtime unavailable ({executable}): {message}")]
    Environment { executable: String, message: String },

    /// A turn is already in flight; the caller must interrupt first.
    #[error("a turn is already in flight")]
    Busy,

    /// History is already being fetched.
    #[error("a history load is already in flight")]
    Loading,

    /// The session has no backend session id to load history for.
    #[error("session has no persisted id to load")]
    NoSessionId,

    /// Backend bridge failure (spawn, I/O, or protocol).
    #[error("bridge error: {0}")]
    Bridge(String),

    /// History fetch failure.
    #[error("history load failed: {0}")]
    History(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invariant violation (should not happen in normal operation).
    #[error("internal error: {0}")]
    Internal(String),
}

impl SkiffError {
    pub fn bridge(message: impl Into<String>) -> Self {
        Self::Bridge(message.into())
    }

    pub fn history(message: impl Into<String>) -> Self {
        Self::History(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }

    pub fn is_environment(&self) -> bool {
        matches!(self, Self::Environment { .. })
    }
}

/// Process-plumbing internals use `anyhow` for context chains; convert at the
/// core boundary.
impl From<anyhow::Error> for SkiffError {
    fn from(err: anyhow::Error) -> Self {
        Self::Bridge(format!("{err:#}"))
    }
}
