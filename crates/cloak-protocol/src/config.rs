//! Protocol configuration.
//!
//! Read from TOML; every field has a default, so a missing file or a
//! partial file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use crate::{ClaimError, Result};

/// Complete protocol configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub accumulator: AccumulatorConfig,
    #[serde(default)]
    pub sharing: SharingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Retry policy for transient ledger failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per ledger call before surfacing `LedgerTimeout`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff; doubled after each failed attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

/// Transaction confirmation polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumulatorConfig {
    /// Recent roots accepted for proof validation. At least 2.
    #[serde(default = "default_root_history")]
    pub root_history: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharingConfig {
    /// Base of generated shareable links.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Fresh secret/nullifier pairs tried after a duplicate leaf.
    #[serde(default = "default_max_regenerations")]
    pub max_regenerations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_max_polls() -> u32 {
    20
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_root_history() -> usize {
    cloak_accumulator::DEFAULT_ROOT_HISTORY
}

fn default_base_url() -> String {
    cloak_commitment::link::DEFAULT_BASE_URL.to_string()
}

fn default_max_regenerations() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            max_polls: default_max_polls(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            root_history: default_root_history(),
        }
    }
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_regenerations: default_max_regenerations(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

impl ConfirmationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ProtocolConfig {
    /// Load configuration from the default location.
    ///
    /// `CLOAK_CONFIG` names the file directly; otherwise
    /// `$CLOAK_DATA_DIR/config.toml`, then `$HOME/.cloak/config.toml`.
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: ProtocolConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CLOAK_CONFIG") {
            return PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("CLOAK_DATA_DIR") {
            return PathBuf::from(dir).join("config.toml");
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".cloak"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/cloak"))
            .join("config.toml")
    }

    /// Reject settings the protocol cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(ClaimError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.confirmation.max_polls == 0 {
            return Err(ClaimError::InvalidConfig(
                "confirmation.max_polls must be at least 1".into(),
            ));
        }
        if self.accumulator.root_history < 2 {
            return Err(ClaimError::InvalidConfig(format!(
                "accumulator.root_history must be at least 2, got {}",
                self.accumulator.root_history
            )));
        }
        if self.sharing.base_url.trim().is_empty() {
            return Err(ClaimError::InvalidConfig("sharing.base_url is empty".into()));
        }
        Ok(())
    }
}
