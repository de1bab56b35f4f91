use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// The root configuration structure for the entire application.
///
/// Every section has defaults, so an empty (or missing) `config.toml` yields a
/// usable development setup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub progress_store: ProgressStoreConfig,
    pub cache: CacheConfig,
    pub sync: SyncConfig,
    pub curriculum: CurriculumConfig,
    pub logging: LoggingConfig,
}

/// Where the web server listens.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// How the client reaches the remote progress store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProgressStoreConfig {
    /// Base URL of the REST API, without a trailing `/api`.
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Local progress cache behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// A cached record older than this is refetched before it is used for a decision.
    pub ttl_secs: u64,
    /// A synced record nobody has touched for this long is evicted.
    pub idle_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How often unsynced completions are pushed to the store again.
    pub retry_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CurriculumConfig {
    /// Levels `0..max_levels` are probed when the curriculum is loaded.
    pub max_levels: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// When set, a daily-rolling log file is written here as well.
    pub directory: Option<PathBuf>,
}

// --- Default Implementations ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for ProgressStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            idle_secs: 1800,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { retry_interval_secs: 30 }
    }
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self { max_levels: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("invalid server address: {}", e)))
    }
}

impl ProgressStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
}

impl SyncConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

impl Config {
    /// Rejects values that would make the progress engine misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.progress_store.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "progress_store.base_url must not be empty".to_string(),
            ));
        }
        if self.progress_store.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "progress_store.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::ValidationError("cache.ttl_secs must be greater than 0".to_string()));
        }
        if self.cache.idle_secs < self.cache.ttl_secs {
            return Err(ConfigError::ValidationError(
                "cache.idle_secs must not be shorter than cache.ttl_secs".to_string(),
            ));
        }
        if self.sync.retry_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "sync.retry_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.curriculum.max_levels == 0 {
            return Err(ConfigError::ValidationError(
                "curriculum.max_levels must be greater than 0".to_string(),
            ));
        }
        self.server.socket_addr()?;
        Ok(())
    }
}
