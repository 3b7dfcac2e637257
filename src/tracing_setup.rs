//! Logging setup for applications embedding the decode engine.
//!
//! The library itself only emits `tracing` events; installing a subscriber is up to the
//! binary. [`init`] builds a `tracing-subscriber` fmt layer filtered by `RUST_LOG` (or
//! the configured level when `RUST_LOG` is unset) in one of three formats.
//!
//! # Example
//! ```no_run
//! use daq_psd2::{config::DecoderConfig, tracing_setup};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DecoderConfig::load_from("psd2.toml")?;
//! tracing_setup::init_from_config(&config)?;
//! # Ok(())
//! # }
//! ```

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::DecoderConfig;
use crate::error::{DecodeError, DecodeResult};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-line with colors, for interactive runs
    Pretty,
    /// One line per event, no colors
    Compact,
    /// Newline-delimited JSON for log collectors
    Json,
}

/// Subscriber options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub level: Level,
    pub format: OutputFormat,
    /// Emit span open/close events (the `add_data` span, for instance)
    pub with_span_events: bool,
    pub with_file_and_line: bool,
    /// Decode workers are named `psd2-decode-N`
    pub with_thread_names: bool,
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Compact,
            with_span_events: false,
            with_file_and_line: false,
            with_thread_names: true,
            with_ansi: true,
        }
    }
}

impl TracingConfig {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Options taking the level from decoder configuration
    pub fn from_decoder_config(config: &DecoderConfig) -> DecodeResult<Self> {
        Ok(Self::new(parse_log_level(&config.log_level)?))
    }

    #[must_use]
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    #[must_use]
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Install a global subscriber using the level from `config`.
pub fn init_from_config(config: &DecoderConfig) -> DecodeResult<()> {
    init(TracingConfig::from_decoder_config(config)?)
}

/// Install a global subscriber.
///
/// Calling this when a subscriber is already installed is not an error, so tests and
/// host applications can both call it. Any other failure is returned as
/// [`DecodeError::TracingInit`].
pub fn init(config: TracingConfig) -> DecodeResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_span_events(span_events)
        .with_file(config.with_file_and_line)
        .with_line_number(config.with_file_and_line)
        .with_thread_names(config.with_thread_names);

    let layer = match config.format {
        OutputFormat::Pretty => base.pretty().with_ansi(config.with_ansi).boxed(),
        OutputFormat::Compact => base.compact().with_ansi(false).boxed(),
        OutputFormat::Json => base.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(env_filter))
        .try_init()
        .or_else(|e| accept_already_initialized(&e.to_string()))
}

/// A subscriber installed earlier (by a test harness or the host) counts as success.
fn accept_already_initialized(message: &str) -> DecodeResult<()> {
    if message.contains("a global default trace dispatcher has already been set") {
        Ok(())
    } else {
        Err(DecodeError::TracingInit(message.to_string()))
    }
}

fn parse_log_level(level: &str) -> DecodeResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(DecodeError::InvalidConfig(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("trace"), Ok(Level::TRACE)));
        assert!(matches!(parse_log_level("warn"), Ok(Level::WARN)));
        assert!(matches!(parse_log_level("Debug"), Ok(Level::DEBUG)));
        assert!(parse_log_level("verbose").is_err());
    }

    #[test]
    fn test_config_from_decoder_config() {
        let decoder = DecoderConfig {
            log_level: "debug".to_string(),
            ..Default::default()
        };
        let config = TracingConfig::from_decoder_config(&decoder).unwrap();
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, OutputFormat::Compact);
    }

    #[test]
    fn test_only_already_initialized_is_accepted() {
        assert!(accept_already_initialized(
            "a global default trace dispatcher has already been set"
        )
        .is_ok());
        assert!(matches!(
            accept_already_initialized("failed to set global logger"),
            Err(DecodeError::TracingInit(msg)) if msg.contains("global logger")
        ));
    }

    #[test]
    fn test_builder() {
        let config = TracingConfig::new(Level::WARN)
            .with_format(OutputFormat::Json)
            .with_span_events(true)
            .with_ansi(false);

        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, OutputFormat::Json);
        assert!(config.with_span_events);
        assert!(!config.with_ansi);
    }
}
