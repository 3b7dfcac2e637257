//! Decoder configuration using Figment
//!
//! Settings are loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `DAQ_PSD2_`, which override the file
//!
//! ```toml
//! workers = 4
//! time_step_ns = 2
//! dump = false
//! log_level = "info"
//! ```
//!
//! # Example
//! ```no_run
//! use daq_psd2::config::DecoderConfig;
//! use daq_psd2::engine::DecodeEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DecoderConfig::load_from("config/psd2.toml")?;
//! config.validate()?;
//! let engine = DecodeEngine::from_config(&config)?;
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{DecodeError, DecodeResult};

/// Environment variable prefix for overrides, e.g. `DAQ_PSD2_WORKERS=4`.
pub const ENV_PREFIX: &str = "DAQ_PSD2_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Decode engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Number of decode worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Nanoseconds per coarse timestamp tick
    #[serde(default = "default_time_step")]
    pub time_step_ns: u32,
    /// Per-word diagnostic output
    #[serde(default)]
    pub dump: bool,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_workers() -> usize {
    1
}

fn default_time_step() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            time_step_ns: default_time_step(),
            dump: false,
            log_level: default_log_level(),
        }
    }
}

impl DecoderConfig {
    /// Load configuration from a TOML file and environment variables
    ///
    /// Missing keys fall back to the defaults; a missing file is treated as empty.
    pub fn load_from<P: AsRef<Path>>(path: P) -> DecodeResult<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// Defaults overlaid with environment variables only
    pub fn from_env() -> DecodeResult<Self> {
        Ok(Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()?)
    }

    fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> DecodeResult<()> {
        if self.workers == 0 {
            return Err(DecodeError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }

        if self.time_step_ns == 0 {
            return Err(DecodeError::InvalidConfig(
                "time_step_ns must be at least 1".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(DecodeError::InvalidConfig(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}

/// Nanoseconds per ADC sample for a digitizer running at `mega_samples_per_sec`.
///
/// Returns `None` when the rate does not give a whole, non-zero number of nanoseconds
/// (e.g. 0 or above 1000 MS/s).
#[must_use]
pub fn time_step_from_sample_rate(mega_samples_per_sec: u32) -> Option<u32> {
    if mega_samples_per_sec == 0 || 1000 % mega_samples_per_sec != 0 {
        return None;
    }
    Some(1000 / mega_samples_per_sec)
}
