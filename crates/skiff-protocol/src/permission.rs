//! Permission prompt types.
//!
//! A backend signals a gated tool call; the UI prompts the user; exactly one
//! decision resolves the request. Correlation happens on `request_id`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A backend tool call awaiting a user decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRequest {
    /// Correlation id; exactly one decision resolves it.
    pub request_id: String,
    /// Capability the backend wants to exercise.
    pub tool_name: String,
    /// Parameters proposed by the backend, keyed by parameter name.
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

/// Outcome of a permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDecision {
    Approve,
    Deny,
}

impl PermissionDecision {
    pub fn approved(self) -> bool {
        matches!(self, Self::Approve)
    }
}

/// Decision payload as posted back by the UI surface.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionReply {
    pub request_id: String,
    pub approved: bool,
}

impl PermissionReply {
    pub fn decision(&self) -> PermissionDecision {
        if self.approved {
            PermissionDecision::Approve
        } else {
            PermissionDecision::Deny
        }
    }
}
