///! Configuration: credential pairs and API origins.
///!
///! Environment variables win over the optional TOML file; origins default
///! to the production endpoints so a deployment only has to provide the two
///! credential pairs.

use serde::{Deserialize, Serialize};

use crate::module::metastore::POCKETHOST_BASE;
use crate::module::telemetry::{AUTH_URL, BASE_API_URL};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Telemetry API client credentials.
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,

    /// Metadata-store admin token.
    #[serde(default)]
    pub metastore_token: String,

    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_metastore_url")]
    pub metastore_url: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_auth_url() -> String {
    AUTH_URL.to_string()
}

fn default_api_url() -> String {
    BASE_API_URL.to_string()
}

fn default_metastore_url() -> String {
    POCKETHOST_BASE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            metastore_token: String::new(),
            auth_url: default_auth_url(),
            api_url: default_api_url(),
            metastore_url: default_metastore_url(),
            log_level: default_log_level(),
        }
    }
}

impl BackendConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BackendConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration: optional TOML file named by `SKYFLEET_CONFIG`,
    /// then environment-variable overrides.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = match std::env::var("SKYFLEET_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(&path)?,
            _ => Self::default(),
        };

        if let Some(value) = env_non_empty("OPENSKY_CLIENT_ID") {
            config.client_id = value;
        }
        if let Some(value) = env_non_empty("OPENSKY_CLIENT_SECRET") {
            config.client_secret = value;
        }
        if let Some(value) = env_non_empty("POCKETHOST_ADMIN_TOKEN") {
            config.metastore_token = value;
        }
        if let Some(value) = env_non_empty("SKYFLEET_LOG_LEVEL") {
            config.log_level = value;
        }
        Ok(config)
    }

    pub fn has_telemetry_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    pub fn has_metastore_token(&self) -> bool {
        !self.metastore_token.is_empty()
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}
