use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Settings for [`SledKvStore`](crate::SledKvStore)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageSettings {
    /// Directory holding the sled database
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Background flush interval passed to sled
    #[serde(default = "default_flush_every_ms")]
    pub flush_every_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./db/d-config")
}

fn default_flush_every_ms() -> u64 {
    500
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            flush_every_ms: default_flush_every_ms(),
        }
    }
}

impl StorageSettings {
    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "storage db_path must not be empty".into(),
            )));
        }

        if self.flush_every_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "storage flush_every_ms must be greater than 0".into(),
            )));
        }

        Ok(())
    }
}
