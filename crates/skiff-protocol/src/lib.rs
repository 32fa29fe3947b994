//! Canonical protocol types for the skiff chat bridge.
//!
//! This crate defines the formats crossing skiff's component boundaries:
//!
//! ```text
//! UI surface --[envelope: "type:content"]--> Dispatcher --> Handlers
//!                                                             |
//! UI surface <--[session events, one ordered stream]-- Session <--[bridge events]-- Agent CLI
//! ```
//!
//! ## Design Principles
//!
//! 1. **Messages are the transcript, events are ephemeral.** `ChatMessage`
//!    entries form the conversation history; `SessionEvent`s drive the UI and
//!    are never persisted.
//! 2. **One ordered event stream per session.** All session notifications
//!    (transcript updates, state changes, permission prompts, thinking
//!    toggles) travel over a single tagged channel so ordering is trivial to
//!    reason about.
//! 3. **Backend-agnostic.** The UI never learns which agent CLI is running.
//!    Backend-native payloads ride along opaquely in `ChatMessage::raw`.

pub mod envelope;
pub mod events;
pub mod messages;
pub mod permission;

pub use envelope::Envelope;
pub use events::{SessionEvent, SessionEventPayload};
pub use messages::{ChatMessage, MessageKind, TokenUsage};
pub use permission::{PermissionDecision, PermissionRequest};
