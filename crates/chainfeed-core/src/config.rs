//! Pipeline configuration and its fluent builder.
//!
//! # Example
//!
//! ```rust
//! use chainfeed_core::config::FeedConfigBuilder;
//!
//! let config = FeedConfigBuilder::new()
//!     .rpc_url("http://127.0.0.1:26657")
//!     .base_denom("basetcro")
//!     .poll_interval_ms(2_000)
//!     .sqlite("./chainfeed.db")
//!     .build()
//!     .unwrap();
//! assert_eq!(config.poll_interval_ms, 2_000);
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FeedError;
use crate::projection::ProjectionSchedule;
use crate::retry::RetryPolicy;

/// Configuration for a chainfeed process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Tendermint RPC endpoint.
    pub rpc_url: String,
    /// Denomination fees are accounted in.
    pub base_denom: String,
    /// Sync loop polling interval (milliseconds).
    pub poll_interval_ms: u64,
    /// Retry interval for reading a projection's checkpoint at startup.
    pub projection_init_retry_ms: u64,
    /// Wait while the event store is empty or a projection has caught up.
    pub projection_idle_retry_ms: u64,
    /// Retry interval for a height whose handling failed.
    pub projection_error_retry_ms: u64,
    /// Raise an operator alarm every N consecutive failures on one height.
    /// 0 disables the alarm.
    pub alert_after_failures: u32,
    /// Per-request timeout for node RPC calls (milliseconds).
    pub request_timeout_ms: u64,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:26657".into(),
            base_denom: "basetcro".into(),
            poll_interval_ms: 5_000,
            projection_init_retry_ms: 5_000,
            projection_idle_retry_ms: 5_000,
            projection_error_retry_ms: 1_000,
            alert_after_failures: 10,
            request_timeout_ms: 30_000,
            storage: StorageConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl FeedConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FeedError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| FeedError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        if self.rpc_url.trim().is_empty() {
            return Err(FeedError::Config("rpc_url must not be empty".into()));
        }
        if self.base_denom.trim().is_empty() {
            return Err(FeedError::Config("base_denom must not be empty".into()));
        }
        for (name, value) in [
            ("poll_interval_ms", self.poll_interval_ms),
            ("projection_init_retry_ms", self.projection_init_retry_ms),
            ("projection_idle_retry_ms", self.projection_idle_retry_ms),
            ("projection_error_retry_ms", self.projection_error_retry_ms),
            ("request_timeout_ms", self.request_timeout_ms),
        ] {
            if value == 0 {
                return Err(FeedError::Config(format!("{name} must be greater than zero")));
            }
        }
        if let StorageConfig::Sqlite { path } = &self.storage {
            if path.trim().is_empty() {
                return Err(FeedError::Config("sqlite storage needs a path".into()));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Retry policy of the sync loop.
    pub fn sync_retry(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.poll_interval()).with_alert_after(self.alert_after_failures)
    }

    /// Wait intervals of every projection loop.
    pub fn projection_schedule(&self) -> ProjectionSchedule {
        ProjectionSchedule {
            init: RetryPolicy::fixed(Duration::from_millis(self.projection_init_retry_ms)),
            idle: RetryPolicy::fixed(Duration::from_millis(self.projection_idle_retry_ms)),
            error: RetryPolicy::fixed(Duration::from_millis(self.projection_error_retry_ms))
                .with_alert_after(self.alert_after_failures),
        }
    }
}

/// Where events and checkpoints are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-process only; everything is lost on exit.
    #[default]
    Memory,
    /// Single SQLite file.
    Sqlite { path: String },
}

/// Log level per component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: component_name → level
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs (true) or human-readable text (false)
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Filter directives, e.g. `"info,chainfeed_core=debug"`.
    pub fn directives(&self) -> String {
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        let mut directives = self.level.clone();
        for (component, level) in components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

// ─── Builder ──────────────────────────────────────────────────────────────────

/// Fluent builder for `FeedConfig`.
#[derive(Default)]
pub struct FeedConfigBuilder {
    config: FeedConfig,
}

impl FeedConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.config.rpc_url = url.into();
        self
    }

    pub fn base_denom(mut self, denom: impl Into<String>) -> Self {
        self.config.base_denom = denom.into();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn projection_retry_ms(mut self, init: u64, idle: u64, error: u64) -> Self {
        self.config.projection_init_retry_ms = init;
        self.config.projection_idle_retry_ms = idle;
        self.config.projection_error_retry_ms = error;
        self
    }

    pub fn alert_after_failures(mut self, n: u32) -> Self {
        self.config.alert_after_failures = n;
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    pub fn sqlite(mut self, path: impl Into<String>) -> Self {
        self.config.storage = StorageConfig::Sqlite { path: path.into() };
        self
    }

    pub fn log(mut self, log: LogConfig) -> Self {
        self.config.log = log;
        self
    }

    /// Validate and return the config.
    pub fn build(self) -> Result<FeedConfig, FeedError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = FeedConfigBuilder::new().build().unwrap();
        assert_eq!(cfg.poll_interval(), Duration::from_secs(5));
        assert_eq!(cfg.base_denom, "basetcro");
        assert_eq!(cfg.storage, StorageConfig::Memory);

        let schedule = cfg.projection_schedule();
        assert_eq!(schedule.init.interval, Duration::from_secs(5));
        assert_eq!(schedule.error.interval, Duration::from_secs(1));
        assert_eq!(schedule.error.alert_after, Some(10));
    }

    #[test]
    fn partial_json_takes_defaults() {
        let cfg: FeedConfig = serde_json::from_str(
            r#"{
                "rpc_url": "https://rpc.testnet.example:443",
                "storage": { "backend": "sqlite", "path": "./feed.db" },
                "log": { "level": "debug", "json": true }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.rpc_url, "https://rpc.testnet.example:443");
        assert_eq!(cfg.poll_interval_ms, 5_000);
        assert_eq!(
            cfg.storage,
            StorageConfig::Sqlite {
                path: "./feed.db".into()
            }
        );
        assert!(cfg.log.json);
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_interval_rejected() {
        let err = FeedConfigBuilder::new().poll_interval_ms(0).build().unwrap_err();
        assert!(matches!(err, FeedError::Config(msg) if msg.contains("poll_interval_ms")));
    }

    #[test]
    fn empty_rpc_url_rejected() {
        assert!(FeedConfigBuilder::new().rpc_url("  ").build().is_err());
    }

    #[test]
    fn log_directives() {
        let mut log = LogConfig::default();
        log.components.insert("chainfeed-core".into(), "debug".into());
        assert_eq!(log.directives(), "info,chainfeed_core=debug");
    }
}
