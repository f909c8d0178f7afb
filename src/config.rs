//! Configuration module for Pulse.
//!
//! Loads configuration from a TOML file with environment variable substitution.
//!
//! # Example
//!
//! ```toml
//! [server]
//! port = 3000
//!
//! [storage]
//! backend = "redis"
//! page_size = 100
//!
//! [redis]
//! url = "${REDIS_URL}"
//! ```

use crate::store::redis::DEFAULT_KEY_PREFIX;
use crate::store::{EventStore, MemoryStore, RedisStore, DEFAULT_PAGE_SIZE};
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable naming the config file
pub const CONFIG_PATH_VAR: &str = "PULSE_CONFIG";

/// Config file used when `PULSE_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "config/pulse.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Failed to create Redis pool: {0}")]
    Pool(String),
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PulseConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub redis: RedisConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string to bind the listener to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Which [`EventStore`] implementation to run
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Redis,
}

/// Storage configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Records fetched per store page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Redis configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

impl PulseConfig {
    /// Load configuration from the default path or the PULSE_CONFIG env var.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            info!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content);

        debug!("Parsing TOML configuration");
        let config: PulseConfig = toml::from_str(&content)?;

        config.validate()?;

        info!(
            backend = ?config.storage.backend,
            page_size = config.storage.page_size,
            bind = %config.server.bind_addr(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.page_size == 0 {
            return Err(ConfigError::ValidationError(
                "storage.page_size must be greater than 0".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::Redis {
            let url = &self.redis.url;

            if url.contains("${") {
                return Err(ConfigError::ValidationError(format!(
                    "redis.url contains an unsubstituted environment variable: {}",
                    url
                )));
            }

            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(ConfigError::ValidationError(
                    "redis.url must start with redis:// or rediss://".to_string(),
                ));
            }

            if self.redis.key_prefix.is_empty() {
                return Err(ConfigError::ValidationError(
                    "redis.key_prefix must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Build the configured store.
    ///
    /// Called once at startup; the returned handle is shared by every request.
    pub fn build_store(&self) -> Result<Arc<dyn EventStore>, ConfigError> {
        match self.storage.backend {
            StorageBackend::Memory => {
                info!(page_size = self.storage.page_size, "Using in-memory store");
                Ok(Arc::new(MemoryStore::with_page_size(self.storage.page_size)))
            }
            StorageBackend::Redis => {
                let store = RedisStore::from_url(&self.redis.url)
                    .map_err(|e| ConfigError::Pool(e.to_string()))?
                    .with_key_prefix(&self.redis.key_prefix)
                    .with_page_size(self.storage.page_size);

                info!(
                    key_prefix = %self.redis.key_prefix,
                    page_size = self.storage.page_size,
                    "Using Redis store"
                );
                Ok(Arc::new(store))
            }
        }
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> String {
    let re = match Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                caps[0].to_string()
            }
        }
    })
    .to_string()
}
