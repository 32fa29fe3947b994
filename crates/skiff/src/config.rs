//! Bridge configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::agent::BackendKind;

/// Default model assumed until the UI selects one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Configuration for one window controller and its bridges.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Which backend new sessions bind to.
    pub backend: BackendKind,
    /// Model id reported to the backend and used for context-limit lookup.
    pub model: String,
    /// Claude CLI executable. Overridable at runtime through settings.
    pub claude_executable: String,
    /// Codex CLI executable. Overridable at runtime through settings.
    pub codex_executable: String,
    /// Project base path; `None` falls back to the user's home directory.
    pub project_path: Option<PathBuf>,
    /// How long `interrupt()` waits for backend confirmation before forcing
    /// the turn down.
    pub interrupt_timeout: Duration,
    /// Buffer size for per-turn bridge event streams.
    pub event_buffer_size: usize,
    /// Buffer size for the stdin command channel of an agent process.
    pub command_buffer_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Claude,
            model: DEFAULT_MODEL.to_string(),
            claude_executable: "claude".to_string(),
            codex_executable: "codex".to_string(),
            project_path: None,
            interrupt_timeout: Duration::from_secs(5),
            event_buffer_size: 256,
            command_buffer_size: 64,
        }
    }
}
