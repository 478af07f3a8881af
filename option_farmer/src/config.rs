//! TOML configuration of the farm.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. Secrets never live here: the API key comes from
//! `POLYGON_API_KEY` and the cache URL may be overridden with `REDIS_URL`.

use std::{
    num::NonZeroU32,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    cache::redis_store::DEFAULT_REDIS_URL, pool::default_worker_count,
    providers::polygon_rest::provider::DEFAULT_BASE_URL, utils::retry::RetryPolicy,
};

pub const REDIS_URL_ENV: &str = "REDIS_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FarmerConfig {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub universe: UniverseConfig,
    pub selection: SelectionConfig,
    pub output: OutputConfig,
    pub pool: PoolConfig,
    pub update: UpdateConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub base_url: String,
    /// Client-side request quota per worker group; absent means unthrottled.
    pub requests_per_second: Option<NonZeroU32>,
    pub timeout_secs: u64,
    pub max_attempts: usize,
    pub backoff_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            requests_per_second: None,
            timeout_secs: 30,
            max_attempts: 5,
            backoff_ms: 500,
        }
    }
}

impl ApiConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub redis_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
        }
    }
}

/// Where the symbol universe comes from. An explicit list wins over a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UniverseConfig {
    pub symbols: Vec<String>,
    /// CSV with a `Symbol` column.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectionConfig {
    /// Target days-to-expiry.
    pub horizons: Vec<u32>,
    /// Strikes kept on each side of the ATM strike.
    pub half_width: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            horizons: vec![7, 30, 45, 75, 90],
            half_width: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory of `OptionChain_{YYYYMMDD}.csv`.
    pub chain_dir: PathBuf,
    /// Directory of per-contract files and the `Updater/` snapshots.
    pub contracts_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            chain_dir: PathBuf::from("data/option_chain"),
            contracts_dir: PathBuf::from("data/option_contracts"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Worker count; `0` means one per available CPU.
    pub workers: usize,
}

impl PoolConfig {
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            default_worker_count()
        } else {
            self.workers
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateConfig {
    /// Plain-text file holding the update interval in minutes.
    pub interval_file: PathBuf,
    pub default_interval_minutes: u64,
    pub tick_secs: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            interval_file: PathBuf::from("timeframe.txt"),
            default_interval_minutes: 15,
            tick_secs: 60,
        }
    }
}

impl UpdateConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }

    /// Converts an interval in minutes into whole ticks, rounding up.
    pub fn minutes_to_ticks(&self, minutes: u64) -> u64 {
        let tick = self.tick_secs.max(1);
        (minutes.saturating_mul(60)).div_ceil(tick).max(1)
    }
}

impl FarmerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Loads and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.selection.horizons.is_empty() {
            return Err(ConfigError::Invalid(
                "selection.horizons must not be empty".into(),
            ));
        }
        if self.api.max_attempts == 0 {
            return Err(ConfigError::Invalid("api.max_attempts must be at least 1".into()));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = FarmerConfig::from_toml_str("").unwrap();
        assert_eq!(config, FarmerConfig::default());
        assert_eq!(config.selection.horizons, vec![7, 30, 45, 75, 90]);
        assert_eq!(config.selection.half_width, 5);
        assert_eq!(config.api.retry_policy(), RetryPolicy::default_network());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = FarmerConfig::from_toml_str(
            r#"
            [universe]
            symbols = ["AAPL", "MSFT"]

            [api]
            requests_per_second = 5

            [pool]
            workers = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.universe.symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(config.api.requests_per_second.map(NonZeroU32::get), Some(5));
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.pool.worker_count(), 3);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(FarmerConfig::from_toml_str("[selection]\nhalfwidth = 3\n").is_err());
        assert!(FarmerConfig::from_toml_str("[nope]\n").is_err());
    }

    #[test]
    fn empty_horizons_fail_validation() {
        let config = FarmerConfig::from_toml_str("[selection]\nhorizons = []\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn interval_minutes_become_ticks() {
        let mut update = UpdateConfig::default();
        assert_eq!(update.minutes_to_ticks(15), 15);
        update.tick_secs = 600;
        assert_eq!(update.minutes_to_ticks(15), 2);
        assert_eq!(update.minutes_to_ticks(0), 1);
    }

    #[test]
    fn load_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("farm.toml");
        std::fs::write(&path, "[pool]\nworkers = \"many\"\n").unwrap();
        let err = FarmerConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("farm.toml"));
    }
}
