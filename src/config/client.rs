use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientSettings {
    /// Namespace root. Field `name` lives at `{prefix}/{name}`.
    ///
    /// Default: `/config`
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "/config".to_string()
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

impl ClientSettings {
    /// Returns error if the prefix is empty or ends with `/`
    pub fn validate(&self) -> Result<()> {
        validate_prefix(&self.prefix)
    }
}

pub(crate) fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(Error::Config(ConfigError::Message(
            "client prefix must not be empty".into(),
        )));
    }

    if prefix.ends_with('/') {
        return Err(Error::Config(ConfigError::Message(format!(
            "client prefix must not end with '/', got {prefix}"
        ))));
    }

    Ok(())
}
