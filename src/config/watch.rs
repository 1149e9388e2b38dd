use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Watch subsystem configuration
///
/// ```toml
/// [watch]
/// enabled = true
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct WatchConfig {
    /// When false, `watch_key`/`watch_tree` are rejected as unsupported and
    /// mutations skip watcher lookup entirely.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}
