// src/config.rs

//! Manages proxy configuration: loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// How to reach the search backend and how to behave when it misbehaves.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_backend_host")]
    pub host: String,
    #[serde(default = "default_backend_port")]
    pub port: u16,
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Maximum time to wait for the reply to an outstanding command. When it
    /// elapses the command fails and the connection is reset. Unset waits forever.
    #[serde(with = "humantime_serde", default)]
    pub command_timeout: Option<Duration>,
    /// If false, a lost connection is final and later commands fail immediately.
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,
    #[serde(with = "humantime_serde", default = "default_reconnect_initial_delay")]
    pub reconnect_initial_delay: Duration,
    #[serde(with = "humantime_serde", default = "default_reconnect_max_delay")]
    pub reconnect_max_delay: Duration,
    /// Capacity of the channel between request handlers and the backend worker.
    #[serde(default = "default_request_buffer")]
    pub request_buffer: usize,
}

impl BackendConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: default_backend_host(),
            port: default_backend_port(),
            connect_timeout: default_connect_timeout(),
            command_timeout: None,
            reconnect: default_reconnect(),
            reconnect_initial_delay: default_reconnect_initial_delay(),
            reconnect_max_delay: default_reconnect_max_delay(),
            request_buffer: default_request_buffer(),
        }
    }
}

fn default_backend_host() -> String {
    "127.0.0.1".to_string()
}
fn default_backend_port() -> u16 {
    8080
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_reconnect() -> bool {
    true
}
fn default_reconnect_initial_delay() -> Duration {
    Duration::from_secs(1)
}
fn default_reconnect_max_delay() -> Duration {
    Duration::from_secs(60)
}
fn default_request_buffer() -> usize {
    1024
}

/// Configuration for the Prometheus metrics endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    /// If true, metrics are served from `path` on the HTTP port.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// The complete, validated proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP facade binds to.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Allow cross-origin browser clients on the HTTP facade.
    #[serde(default = "default_cors")]
    pub cors: bool,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_cors() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            cors: default_cors(),
            backend: BackendConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.backend.host.trim().is_empty() {
            return Err(anyhow!("backend.host cannot be empty"));
        }
        if self.backend.port == 0 {
            return Err(anyhow!("backend.port cannot be 0"));
        }
        if self.backend.request_buffer == 0 {
            return Err(anyhow!("backend.request_buffer cannot be 0"));
        }
        if self.backend.reconnect_initial_delay > self.backend.reconnect_max_delay {
            return Err(anyhow!(
                "backend.reconnect_initial_delay cannot exceed backend.reconnect_max_delay"
            ));
        }
        if self.backend.command_timeout == Some(Duration::ZERO) {
            return Err(anyhow!(
                "backend.command_timeout cannot be 0; omit it to wait indefinitely"
            ));
        }
        if self.backend.connect_timeout.is_zero() {
            return Err(anyhow!("backend.connect_timeout cannot be 0"));
        }
        if self.metrics.enabled && !self.metrics.path.starts_with('/') {
            return Err(anyhow!("metrics.path must start with '/'"));
        }

        if self.backend.host == self.host && self.backend.port == self.port {
            return Err(anyhow!(
                "backend address cannot be the same as the HTTP listen address"
            ));
        }
        if self.backend.command_timeout.is_none() {
            warn!(
                "backend.command_timeout is not set; a backend that never answers will stall the queue."
            );
        }
        Ok(())
    }
}
