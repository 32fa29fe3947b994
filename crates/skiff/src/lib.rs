//! Session/dispatch core bridging an embedded chat UI to coding-agent CLIs.
//!
//! The hosting application embeds a chat panel per project; skiff manages
//! everything between that panel and the agent process: session lifecycle,
//! typed event routing, permission prompt correlation, safe interruption and
//! replacement of in-flight sessions, and context-window usage accounting.
//!
//! Entry points:
//!
//! - [`controller::WindowController`] — one per project; feed it raw UI
//!   events and give it a [`ui::UiSurface`] to talk back through.
//! - [`registry::ControllerRegistry`] — routes host-side calls (selection
//!   injection, session-load requests) to the right window.

pub mod agent;
pub mod config;
pub mod context;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod history;
pub mod permission;
pub mod registry;
pub mod session;
pub mod settings;
pub mod ui;
pub mod usage;

pub use config::BridgeConfig;
pub use controller::WindowController;
pub use error::{Result, SkiffError};
pub use registry::ControllerRegistry;
pub use session::Session;
