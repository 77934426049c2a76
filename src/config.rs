use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Delivery tuning, handed to the dispatcher at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Attempt ceiling for webhooks with retries enabled. Others get one attempt.
    #[serde(default = "default_max_attempts")]
    pub max_attempts_with_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Max characters of response/error text kept on a failed log row.
    #[serde(default = "default_response_body_limit")]
    pub response_body_limit: usize,
    /// When false, a 4xx response ends the attempt sequence immediately.
    #[serde(default = "default_retry_client_errors")]
    pub retry_client_errors: bool,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1_000
}
fn default_user_agent() -> String {
    "FormBuilder-Webhook/1.0".into()
}
fn default_response_body_limit() -> usize {
    1_000
}
fn default_retry_client_errors() -> bool {
    true
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            max_attempts_with_retries: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            user_agent: default_user_agent(),
            response_body_limit: default_response_body_limit(),
            retry_client_errors: default_retry_client_errors(),
        }
    }
}

impl DispatcherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn max_attempts(&self, retries_enabled: bool) -> u32 {
        if retries_enabled {
            self.max_attempts_with_retries.max(1)
        } else {
            1
        }
    }

    /// Delay before the attempt following `attempt` (1-based): base * 2^(attempt-1).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(32);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8787".into()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_dir: default_data_dir(),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Read the file at `FORMHOOK_CONFIG` (default `formhook.json`), falling
    /// back to defaults when absent, then apply env overrides.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var("FORMHOOK_CONFIG").unwrap_or_else(|_| "formhook.json".into());
        let mut config = if Path::new(&path).exists() {
            Self::load(&path)?
        } else {
            tracing::warn!(path = %path, "config file not found, using defaults");
            Self::default()
        };

        if let Ok(bind) = std::env::var("FORMHOOK_BIND") {
            config.bind_addr = bind;
        }
        if let Ok(dir) = std::env::var("FORMHOOK_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        Ok(config)
    }
}
