//! Session event stream.
//!
//! Events are ephemeral signals for real-time UI updates; they are never part
//! of the transcript. A session delivers all of its notifications over one
//! ordered channel, so a consumer can derive the exact UI state from the
//! events alone without tracking five independent callbacks.

use serde::{Deserialize, Serialize};

use crate::messages::ChatMessage;
use crate::permission::PermissionRequest;

/// An event with routing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Instance tag of the emitting session object. This is not the backend
    /// session id: it identifies which in-memory session produced the event,
    /// so late events from a superseded session can be told apart from the
    /// current one.
    pub origin: u64,

    /// Unix ms timestamp.
    pub ts: i64,

    /// The event payload.
    #[serde(flatten)]
    pub payload: SessionEventPayload,
}

/// All session event types, tagged by `event` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEventPayload {
    /// Transcript changed (append or wholesale replace). Carries the full
    /// history so the consumer never has to reconcile deltas.
    MessagesUpdated { messages: Vec<ChatMessage> },

    /// Busy/loading transition. `error` is set only on failure.
    StateChanged {
        busy: bool,
        loading: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// The backend assigned an id to a previously anonymous session.
    SessionIdAssigned { session_id: String },

    /// A gated tool call awaits a user decision.
    PermissionRequested { request: PermissionRequest },

    /// Backend-signaled reasoning-in-progress toggle.
    ThinkingChanged { thinking: bool },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageKind;

    #[test]
    fn event_serializes_with_flattened_payload() {
        let event = SessionEvent {
            origin: 3,
            ts: 1738764000000,
            payload: SessionEventPayload::StateChanged {
                busy: true,
                loading: false,
                error: None,
            },
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"state_changed\""));
        assert!(json.contains("\"busy\":true"));
        assert!(json.contains("\"origin\":3"));
        // error is omitted when absent
        assert!(!json.contains("error"));
    }

    #[test]
    fn messages_updated_carries_full_history() {
        let event = SessionEvent {
            origin: 1,
            ts: 0,
            payload: SessionEventPayload::MessagesUpdated {
                messages: vec![ChatMessage::new(MessageKind::User, 0, "hi")],
            },
        };

        let json = serde_json::to_string(&event).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["event"], "messages_updated");
        assert_eq!(parsed["messages"][0]["content"], "hi");
    }

    #[test]
    fn thinking_round_trips() {
        let event = SessionEvent {
            origin: 9,
            ts: 5,
            payload: SessionEventPayload::ThinkingChanged { thinking: true },
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
