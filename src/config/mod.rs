//! Settings for the live configuration client.
//!
//! Provides hierarchical settings loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Section-wise validation
mod client;
mod history;
mod storage;
mod watch;
pub use client::*;
pub use history::*;
pub use storage::*;
pub use watch::*;

use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix, e.g. `DCONFIG__CLIENT__PREFIX=/svc`
pub const ENV_PREFIX: &str = "DCONFIG";

/// Root settings container
///
/// Sources are merged in this order (later overrides earlier):
/// 1. Default values from code
/// 2. Configuration file named by `CONFIG_PATH`
/// 3. Environment variables with the `DCONFIG__` prefix
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ConfigSettings {
    /// Namespace the record is bound to
    #[serde(default)]
    pub client: ClientSettings,
    /// Background watcher
    #[serde(default)]
    pub watch: WatchSettings,
    /// History walks
    #[serde(default)]
    pub history: HistorySettings,
    /// Embedded sled store
    #[serde(default)]
    pub storage: StorageSettings,
}

impl ConfigSettings {
    /// Loads settings from hierarchical sources without validation.
    ///
    /// Validation is deferred so callers can layer further overrides via
    /// [`with_override_config`](Self::with_override_config). Call
    /// [`validate`](Self::validate) before use.
    ///
    /// ```ignore
    /// std::env::set_var("DCONFIG__CLIENT__PREFIX", "/services/api");
    /// let settings = ConfigSettings::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(environment());

        let settings: Self = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Applies additional overrides from a file without validation.
    ///
    /// Merging order:
    /// 1. Current values
    /// 2. The given file
    /// 3. Environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Validates every section with constraints and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.client.validate()?;
        self.watch.validate()?;
        self.storage.validate()?;
        Ok(self)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
