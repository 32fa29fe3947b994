//! Concrete UI event handlers.
//!
//! Each handler claims a set of envelope type tags; the dispatcher routes
//! first-match in registration order (see the controller for the order
//! policy).

mod history;
mod permission;
mod session;
mod settings;

pub use history::HistoryHandler;
pub use permission::PermissionHandler;
pub use session::SessionHandler;
pub use settings::SettingsHandler;
