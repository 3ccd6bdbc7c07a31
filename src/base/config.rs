//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc};

use serde::Deserialize;

use super::types::{PeerId, Res};

/// Default VK API method endpoint.
fn default_vk_api_endpoint() -> String {
    "https://api.vk.com/method".to_string()
}

/// Default VK API version.
fn default_vk_api_version() -> String {
    "5.199".to_string()
}

/// Default long poll wait, in seconds.
fn default_long_poll_wait_secs() -> u64 {
    25
}

/// Default minimum interval between two commands of the same user, in seconds.
fn default_command_cooldown_secs() -> u64 {
    3
}

fn default_mirror_messages_to_log() -> bool {
    true
}

/// Default size of the worker pool.
fn default_max_concurrent_tasks() -> usize {
    10
}

/// Default interval between deletion queue drains, in milliseconds.
fn default_delete_queue_interval_ms() -> u64 {
    1000
}

/// Default back-off after an ingestion loop failure, in seconds.
fn default_error_backoff_secs() -> u64 {
    5
}

fn default_db_endpoint() -> String {
    "mem://".to_string()
}

fn default_db_namespace() -> String {
    "vk_warden".to_string()
}

fn default_db_database() -> String {
    "bot".to_string()
}

/// Configuration for the vk-warden application.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// The shared configuration values.
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// The configuration values behind [`Config`].
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// VK community id the bot runs as (`VK_WARDEN_VK_GROUP_ID`).
    pub vk_group_id: i64,
    /// VK community access token (`VK_WARDEN_VK_API_TOKEN`).
    pub vk_api_token: String,
    /// VK API method endpoint (`VK_WARDEN_VK_API_ENDPOINT`).
    #[serde(default = "default_vk_api_endpoint")]
    pub vk_api_endpoint: String,
    /// VK API version (`VK_WARDEN_VK_API_VERSION`).
    #[serde(default = "default_vk_api_version")]
    pub vk_api_version: String,
    /// Long poll wait in seconds (`VK_WARDEN_LONG_POLL_WAIT_SECS`).
    #[serde(default = "default_long_poll_wait_secs")]
    pub long_poll_wait_secs: u64,
    /// Minimum interval between two commands of one user (`VK_WARDEN_COMMAND_COOLDOWN_SECS`).
    #[serde(default = "default_command_cooldown_secs")]
    pub command_cooldown_secs: u64,
    /// Conversation that receives audit entries (`VK_WARDEN_LOG_PEER_ID`).
    /// Auditing is disabled when unset.
    #[serde(default)]
    pub log_peer_id: Option<PeerId>,
    /// Whether plain group messages are mirrored to the audit conversation (`VK_WARDEN_MIRROR_MESSAGES_TO_LOG`).
    #[serde(default = "default_mirror_messages_to_log")]
    pub mirror_messages_to_log: bool,
    /// Upper bound of concurrently running handlers (`VK_WARDEN_MAX_CONCURRENT_TASKS`).
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Interval between deletion queue drains (`VK_WARDEN_DELETE_QUEUE_INTERVAL_MS`).
    #[serde(default = "default_delete_queue_interval_ms")]
    pub delete_queue_interval_ms: u64,
    /// Sleep after an ingestion loop failure (`VK_WARDEN_ERROR_BACKOFF_SECS`).
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
    /// Database endpoint URL, e.g. `mem://` or `ws://localhost:8000` (`VK_WARDEN_DB_ENDPOINT`).
    #[serde(default = "default_db_endpoint")]
    pub db_endpoint: String,
    /// Database username (`VK_WARDEN_DB_USERNAME`).
    #[serde(default)]
    pub db_username: Option<String>,
    /// Database password (`VK_WARDEN_DB_PASSWORD`).
    #[serde(default)]
    pub db_password: Option<String>,
    /// Database namespace (`VK_WARDEN_DB_NAMESPACE`).
    #[serde(default = "default_db_namespace")]
    pub db_namespace: String,
    /// Database name (`VK_WARDEN_DB_DATABASE`).
    #[serde(default = "default_db_database")]
    pub db_database: String,
    /// OTLP HTTP endpoint for span export (`VK_WARDEN_OTLP_ENDPOINT`).
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    /// Loads the configuration from the environment and an optional TOML file.
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("VK_WARDEN").try_parsing(true));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Res<()> {
        if self.vk_api_token.is_empty() {
            return Err(anyhow::anyhow!("VK API token must be set."));
        }

        if self.vk_group_id <= 0 {
            return Err(anyhow::anyhow!("VK group id must be a positive number."));
        }

        if self.max_concurrent_tasks < 1 {
            return Err(anyhow::anyhow!("Max concurrent tasks must be at least 1."));
        }

        if self.long_poll_wait_secs < 1 || self.long_poll_wait_secs > 90 {
            return Err(anyhow::anyhow!("Long poll wait must be between 1 and 90 seconds."));
        }

        if self.delete_queue_interval_ms < 100 {
            return Err(anyhow::anyhow!("Delete queue interval must be at least 100 ms."));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(inner: ConfigInner) -> Config {
        Config { inner: Arc::new(inner) }
    }

    fn valid() -> ConfigInner {
        ConfigInner {
            vk_group_id: 42,
            vk_api_token: "token".to_string(),
            long_poll_wait_secs: default_long_poll_wait_secs(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            delete_queue_interval_ms: default_delete_queue_interval_ms(),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert!(config(valid()).validate().is_ok());
    }

    #[test]
    fn rejects_missing_token_and_group() {
        assert!(config(ConfigInner { vk_api_token: String::new(), ..valid() }).validate().is_err());
        assert!(config(ConfigInner { vk_group_id: 0, ..valid() }).validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(config(ConfigInner { max_concurrent_tasks: 0, ..valid() }).validate().is_err());
        assert!(config(ConfigInner { long_poll_wait_secs: 91, ..valid() }).validate().is_err());
        assert!(config(ConfigInner { delete_queue_interval_ms: 10, ..valid() }).validate().is_err());
    }
}
