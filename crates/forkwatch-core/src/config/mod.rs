//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: Hardcoded in struct `Default` implementations
//! 2. **Config file**: TOML file specified by the `FORKWATCH_CONFIG` env var
//! 3. **Environment variables**: `FORKWATCH_*` env vars override specific
//!    fields (`__` separates nesting, e.g. `FORKWATCH_SERVER__BIND_PORT`)
//!
//! # Validation
//!
//! Configuration is validated at load time: at least one node, unique node
//! names, `ws://`/`wss://` endpoint schemes, and non-zero timeouts. Invalid
//! configurations return errors rather than failing silently at runtime.
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! bind_port = 8000
//!
//! [[nodes]]
//! name = "hc1"
//! ws_url = "wss://my.hc1node.com:35998"
//!
//! [timing]
//! message_timeout_secs = 30
//! retry_backoff_secs = 5
//! ```

use crate::upstream::Timing;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// HTTP snapshot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to bind the snapshot API to. Defaults to `0.0.0.0`.
    pub bind_address: String,

    /// Port number to listen on. Defaults to `8000`.
    pub bind_port: u16,

    /// Allowed CORS origins; `"*"` allows any origin. Defaults to `["*"]`.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 8000,
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// One monitored ledger node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEndpoint {
    /// Identifier used in logs, the registry, and the snapshot API.
    pub name: String,

    /// WebSocket endpoint URL. Must start with `ws://` or `wss://`.
    pub ws_url: String,
}

/// Connection lifecycle intervals, all in whole seconds.
///
/// Converted to [`Timing`] for the connection tasks via
/// [`TimingConfig::timing`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Interval between keep-alive probes. Defaults to `20`.
    pub keepalive_interval_secs: u64,

    /// How long a keep-alive probe may go unanswered. Defaults to `10`.
    pub keepalive_timeout_secs: u64,

    /// How long to wait for the subscription acknowledgment. Defaults to `10`.
    pub subscribe_ack_timeout_secs: u64,

    /// How long a connected node may stay silent before being presumed dead.
    /// Defaults to `30`.
    pub message_timeout_secs: u64,

    /// Fixed delay between reconnection attempts. Defaults to `5`.
    pub retry_backoff_secs: u64,

    /// Receive poll timeout bounding shutdown latency. Defaults to `1`.
    pub poll_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_secs: 20,
            keepalive_timeout_secs: 10,
            subscribe_ack_timeout_secs: 10,
            message_timeout_secs: 30,
            retry_backoff_secs: 5,
            poll_timeout_secs: 1,
        }
    }
}

impl TimingConfig {
    /// Converts the configured seconds into the durations the connection
    /// tasks run on.
    #[must_use]
    pub fn timing(&self) -> Timing {
        Timing {
            keepalive_interval: Duration::from_secs(self.keepalive_interval_secs),
            keepalive_timeout: Duration::from_secs(self.keepalive_timeout_secs),
            subscribe_ack_timeout: Duration::from_secs(self.subscribe_ack_timeout_secs),
            message_timeout: Duration::from_secs(self.message_timeout_secs),
            retry_backoff: Duration::from_secs(self.retry_backoff_secs),
            poll_timeout: Duration::from_secs(self.poll_timeout_secs),
        }
    }
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (e.g. "trace", "debug", "info", "warn", "error").
    /// Defaults to `"info"`.
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub nodes: Vec<NodeEndpoint>,
    pub timing: TimingConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            nodes: default_nodes(),
            timing: TimingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// The production node set monitored by default.
fn default_nodes() -> Vec<NodeEndpoint> {
    vec![
        NodeEndpoint {
            name: "hc1".to_string(),
            ws_url: "wss://my.hc1node.com:35998".to_string(),
        },
        NodeEndpoint {
            name: "zenonhub".to_string(),
            ws_url: "wss://node.zenonhub.io:35998".to_string(),
        },
        NodeEndpoint {
            name: "atsocy".to_string(),
            ws_url: "wss://node.atsocy.com:35998".to_string(),
        },
    ]
}

impl AppConfig {
    /// Loads configuration from defaults, the optional `FORKWATCH_CONFIG`
    /// TOML file, and `FORKWATCH_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or a value fails
    /// to deserialize.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Ok(path) = std::env::var("FORKWATCH_CONFIG") {
            builder = builder.add_source(File::from(Path::new(&path)));
        }
        let raw = builder
            .add_source(Environment::with_prefix("FORKWATCH").separator("__"))
            .build()?;
        raw.try_deserialize()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("at least one node must be configured".to_string());
        }

        let mut seen = std::collections::BTreeSet::new();
        for node in &self.nodes {
            if node.name.trim().is_empty() {
                return Err("node name cannot be empty".to_string());
            }
            if !seen.insert(node.name.as_str()) {
                return Err(format!("duplicate node name: {}", node.name));
            }
            if !node.ws_url.starts_with("ws://") && !node.ws_url.starts_with("wss://") {
                return Err(format!(
                    "node {} has invalid WebSocket URL: {}",
                    node.name, node.ws_url
                ));
            }
        }

        if self.timing.message_timeout_secs == 0 {
            return Err("timing.message_timeout_secs must be greater than 0".to_string());
        }
        if self.timing.subscribe_ack_timeout_secs == 0 {
            return Err("timing.subscribe_ack_timeout_secs must be greater than 0".to_string());
        }
        if self.timing.poll_timeout_secs == 0 {
            return Err("timing.poll_timeout_secs must be greater than 0".to_string());
        }
        if self.timing.keepalive_interval_secs == 0 {
            return Err("timing.keepalive_interval_secs must be greater than 0".to_string());
        }

        Ok(())
    }
}
