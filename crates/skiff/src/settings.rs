//! Settings collaborator boundary.
//!
//! Persisted settings live in the hosting application; the core only needs a
//! string key-value store and the provider-sync hook invoked at startup.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;

/// Settings key holding a manually configured agent executable path.
pub const AGENT_EXECUTABLE_KEY: &str = "skiff.agent.executable";

pub trait SettingsStore: Send + Sync {
    /// Mirror the active provider profile into the agent CLI's own settings
    /// file. Invoked once during controller construction; failures are
    /// logged, never fatal.
    fn apply_active_provider(&self) -> Result<()>;

    fn get(&self, key: &str) -> Option<String>;

    /// `None` clears the key.
    fn set(&self, key: &str, value: Option<String>) -> Result<()>;
}

/// In-memory store for tests and the dev console.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn apply_active_provider(&self) -> Result<()> {
        Ok(())
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().expect("settings lock").get(key).cloned()
    }

    fn set(&self, key: &str, value: Option<String>) -> Result<()> {
        let mut values = self.values.lock().expect("settings lock");
        match value {
            Some(value) => {
                values.insert(key.to_string(), value);
            }
            None => {
                values.remove(key);
            }
        }
        Ok(())
    }
}
