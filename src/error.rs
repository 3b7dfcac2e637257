//! Error types for the PSD2 decode engine.
//!
//! This module defines `DecodeError`, the single error type returned by the engine.
//! It is built with `thiserror` and splits into three families:
//!
//! - **Format errors** (`Misaligned`, `SizeExceedsBuffer`, `UnknownFrame`): the buffer
//!   handed to [`DecodeEngine::add_data`](crate::engine::DecodeEngine::add_data) cannot be
//!   a digitizer frame at all. These are fatal for the stream; the caller decides whether
//!   to halt acquisition.
//! - **Bounds errors** (`OutOfBounds`): a length field inside an otherwise valid Event
//!   frame points past the end of the buffer. Decoding of that one frame stops; the worker
//!   pool keeps going.
//! - **Lifecycle errors** (`WorkerSpawn`, `EngineStopped`): the worker pool could not be
//!   started, or frames were submitted after shutdown.
//! - **Configuration errors** (`Config`, `InvalidConfig`, `TracingInit`): loading or
//!   validating [`DecoderConfig`](crate::config::DecoderConfig), or installing the log
//!   subscriber it describes.
//!
//! Non-fatal cross-checks (wrong header tag, board fail, counter gaps, ...) are not errors;
//! see [`ConsistencyWarning`](crate::decoder::ConsistencyWarning).

use thiserror::Error;

/// Convenience alias for results using the decoder error type.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Frame size {size} bytes is not a multiple of the 8-byte word size")]
    Misaligned { size: usize },

    #[error("Declared frame size {size} bytes exceeds the {capacity}-byte buffer")]
    SizeExceedsBuffer { size: usize, capacity: usize },

    #[error("Unknown frame type ({words} words)")]
    UnknownFrame { words: usize },

    #[error("Read of word {word} is past the end of a {words}-word frame")]
    OutOfBounds { word: usize, words: usize },

    #[error("Failed to spawn decode worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("Decode engine has been shut down")]
    EngineStopped,

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    InvalidConfig(String),

    #[error("Failed to initialize tracing: {0}")]
    TracingInit(String),
}

impl DecodeError {
    /// True for errors that say the stream itself is not digitizer data.
    ///
    /// A caller that sees one of these should stop feeding the engine; everything else is
    /// either local to one frame or a setup problem.
    #[must_use]
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            DecodeError::Misaligned { .. }
                | DecodeError::SizeExceedsBuffer { .. }
                | DecodeError::UnknownFrame { .. }
        )
    }
}

impl From<figment::Error> for DecodeError {
    fn from(value: figment::Error) -> Self {
        DecodeError::Config(Box::new(value))
    }
}
