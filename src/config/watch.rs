use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Background watcher settings
///
/// ```toml
/// [watch]
/// enabled = true
/// shutdown_timeout_ms = 1000
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchSettings {
    /// Spawn the watcher after reconciliation.
    ///
    /// With `false` the record only changes through local `set` calls.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// How long `shutdown` waits for the watcher task to exit
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_shutdown_timeout_ms() -> u64 {
    1000
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl WatchSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shutdown_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch shutdown_timeout_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}
