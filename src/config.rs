//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::{EpsTlmError, Result};
use crate::ingest::IngestLimits;
use crate::tlm::decoder::ByteOrder;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ingestion configuration
#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Maximum fraction of rejected records before a file is abandoned
    #[serde(default = "default_error_rate_limit")]
    pub error_rate_limit: f64,

    /// Items that must be read before the rate is enforced
    #[serde(default = "default_minimum_count")]
    pub minimum_count: usize,

    /// Byte order of the producing machine
    #[serde(default)]
    pub byte_order: ByteOrder,
}

/// Output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Decimals of the CSV VALUE column
    #[serde(default = "default_csv_precision")]
    pub csv_precision: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory of the daily rolling log file; empty disables file logging
    #[serde(default)]
    pub log_dir: String,
}

impl IngestConfig {
    pub fn limits(&self) -> IngestLimits {
        IngestLimits {
            error_rate_limit: self.error_rate_limit,
            minimum_count: self.minimum_count,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            error_rate_limit: default_error_rate_limit(),
            minimum_count: default_minimum_count(),
            byte_order: ByteOrder::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_precision: default_csv_precision(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

// Default value functions
fn default_error_rate_limit() -> f64 { crate::ingest::DEFAULT_ERROR_RATE_LIMIT }
fn default_minimum_count() -> usize { crate::ingest::DEFAULT_MINIMUM_COUNT }
fn default_csv_precision() -> usize { crate::telemetry::export::DEFAULT_CSV_PRECISION }
fn default_log_level() -> String { "info".to_string() }

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use eps_tlm::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Ingestion thresholds
        let rate = self.ingest.error_rate_limit;
        if !(rate > 0.0 && rate < 1.0) {
            return Err(EpsTlmError::Config(
                toml::de::Error::custom("error_rate_limit must be between 0.0 and 1.0 (exclusive)")
            ));
        }

        if self.ingest.minimum_count == 0 {
            return Err(EpsTlmError::Config(
                toml::de::Error::custom("minimum_count must be greater than 0")
            ));
        }

        if !(3..=9).contains(&self.output.csv_precision) {
            return Err(EpsTlmError::Config(
                toml::de::Error::custom("csv_precision must be between 3 and 9")
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(EpsTlmError::Config(
                toml::de::Error::custom(format!(
                    "log level must be one of: {}",
                    LOG_LEVELS.join(", ")
                ))
            ));
        }

        Ok(())
    }
}
