//! Configuration management for the minion scan service
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files. Every section falls back to the reference policy when omitted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Session pool configuration
    pub pool: PoolConfig,

    /// Scan pacing configuration
    pub scan: ScanConfig,

    /// Remote gateway configuration
    pub remote: RemoteConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Object cache configuration
    pub cache: CacheConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub listen_addr: SocketAddr,

    /// Value of the `Access-Control-Allow-Origin` header
    pub allow_origin: String,

    /// Shared secret guarding the status endpoints (disabled when unset)
    pub secret: Option<String>,
}

/// Session pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Seconds to wait for a parked session before building a new one
    pub acquire_wait_secs: u64,

    /// Seconds a session rests after a scan
    pub scan_delay_secs: u64,

    /// Maximum number of parked sessions
    pub queue_capacity: usize,
}

/// Scan pacing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Deadline for a single map query in seconds
    pub query_timeout_secs: u64,

    /// Global outbound request rate
    pub ticks_per_second: f64,
}

/// Remote gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the protocol gateway
    pub gateway_url: String,

    /// Proxy URL for an egress point; `{id}` is replaced by the egress id
    pub proxy_template: Option<String>,

    /// Connect timeout for gateway calls in seconds
    pub connect_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub path: PathBuf,
}

/// Object cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Radius in metres served by cached lookups
    pub radius_m: f64,

    /// Seconds between expired-object purges
    pub purge_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from `MINION_*` environment variables
    ///
    /// Unset or unparsable variables keep their default.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = env_parse("MINION_LISTEN_ADDR") {
            config.server.listen_addr = addr;
        }
        if let Ok(origin) = std::env::var("MINION_ALLOW_ORIGIN") {
            config.server.allow_origin = origin;
        }
        config.server.secret = std::env::var("MINION_SECRET").ok();

        if let Some(secs) = env_parse("MINION_ACQUIRE_WAIT") {
            config.pool.acquire_wait_secs = secs;
        }
        if let Some(secs) = env_parse("MINION_SCAN_DELAY") {
            config.pool.scan_delay_secs = secs;
        }
        if let Some(capacity) = env_parse("MINION_QUEUE_CAPACITY") {
            config.pool.queue_capacity = capacity;
        }

        if let Some(secs) = env_parse("MINION_QUERY_TIMEOUT") {
            config.scan.query_timeout_secs = secs;
        }
        if let Some(ticks) = env_parse("MINION_TICKS_PER_SECOND") {
            config.scan.ticks_per_second = ticks;
        }

        if let Ok(url) = std::env::var("MINION_GATEWAY_URL") {
            config.remote.gateway_url = url;
        }
        config.remote.proxy_template = std::env::var("MINION_PROXY_TEMPLATE").ok();

        if let Ok(path) = std::env::var("MINION_DB_PATH") {
            config.database.path = path.into();
        }

        if let Some(radius) = env_parse("MINION_CACHE_RADIUS") {
            config.cache.radius_m = radius;
        }
        if let Some(secs) = env_parse("MINION_PURGE_INTERVAL") {
            config.cache.purge_interval_secs = secs;
        }

        if let Ok(level) = std::env::var("MINION_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("MINION_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.pool.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        if self.scan.query_timeout_secs == 0 {
            anyhow::bail!("query_timeout_secs must be greater than 0");
        }

        if !self.scan.ticks_per_second.is_finite() || self.scan.ticks_per_second <= 0.0 {
            anyhow::bail!("ticks_per_second must be positive");
        }

        if !self.cache.radius_m.is_finite() || self.cache.radius_m <= 0.0 {
            anyhow::bail!("cache radius_m must be positive");
        }

        if self.cache.purge_interval_secs == 0 {
            anyhow::bail!("purge_interval_secs must be greater than 0");
        }

        if self.remote.gateway_url.is_empty() {
            anyhow::bail!("gateway_url must not be empty");
        }

        if let Some(template) = &self.remote.proxy_template {
            if !template.contains("{id}") {
                anyhow::bail!("proxy_template must contain an {{id}} placeholder");
            }
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("log format must be 'text' or 'json'");
        }

        Ok(())
    }
}

impl PoolConfig {
    #[must_use]
    pub fn acquire_wait(&self) -> Duration {
        Duration::from_secs(self.acquire_wait_secs)
    }

    /// Cooldown applied when a session is released
    #[must_use]
    pub fn scan_delay(&self) -> Duration {
        Duration::from_secs(self.scan_delay_secs)
    }
}

impl ScanConfig {
    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl CacheConfig {
    #[must_use]
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            allow_origin: String::from("*"),
            secret: None,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            acquire_wait_secs: 5,
            scan_delay_secs: 10,
            queue_capacity: 1024,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            query_timeout_secs: 10,
            ticks_per_second: 5.0,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            gateway_url: String::from("http://127.0.0.1:9000"),
            proxy_template: None,
            connect_timeout_secs: 5,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/minion.db"),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            radius_m: 1000.0,
            purge_interval_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}
