//! Pipeline configuration, loaded from a TOML file.
//!
//! A missing file or a missing `[mysql]` section refuses startup; every
//! tuning knob has a default.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mysql: MysqlConfig,
    #[serde(default)]
    pub lock_order: LockOrderConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub step2: StageConfig,
    #[serde(default)]
    pub step3: StageConfig,
    #[serde(default)]
    pub step4: StageConfig,
    #[serde(default = "StageConfig::step5_default")]
    pub step5: StageConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&raw)
    }

    pub fn from_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MysqlConfig {
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// Canonical table write order shared by all concurrent transactions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LockOrderConfig {
    #[serde(default)]
    pub order: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Minimum spacing between API calls, seconds.
    #[serde(default = "default_request_interval")]
    pub request_interval: f64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Rate-limit jitter fraction, 0.0..=1.0.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// Override for tests and mirrors.
    #[serde(default)]
    pub winticket_base_url: Option<String>,
    #[serde(default)]
    pub yenjoy_base_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            request_interval: default_request_interval(),
            retry_count: default_retry_count(),
            jitter: default_jitter(),
            winticket_base_url: None,
            yenjoy_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Inter-request (steps 2-4) or inter-batch (step 5) sleep, seconds.
    #[serde(default = "default_rate_limit_wait")]
    pub rate_limit_wait: f64,
    /// Row chunk size for batched upserts.
    #[serde(default = "default_save_batch_size")]
    pub save_batch_size: usize,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            rate_limit_wait: default_rate_limit_wait(),
            save_batch_size: default_save_batch_size(),
        }
    }
}

impl StageConfig {
    fn step5_default() -> Self {
        Self {
            max_workers: 5,
            rate_limit_wait: 0.5,
            save_batch_size: default_save_batch_size(),
        }
    }
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_pool_size() -> u32 {
    5
}

fn default_request_interval() -> f64 {
    1.0
}

fn default_retry_count() -> u32 {
    3
}

fn default_jitter() -> f64 {
    0.2
}

fn default_max_workers() -> usize {
    3
}

fn default_rate_limit_wait() -> f64 {
    1.0
}

fn default_save_batch_size() -> usize {
    100
}
