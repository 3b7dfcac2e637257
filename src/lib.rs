//! # DPP-PSD Raw Stream Decoder
//!
//! Decodes the RAW readout stream of a waveform digitizer running the DPP-PSD
//! (pulse-shape discrimination) firmware into per-hit [`Event`] records.
//!
//! The acquisition layer hands every buffer it reads to
//! [`DecodeEngine::add_data`](engine::DecodeEngine::add_data). Start and Stop run markers
//! are recognised immediately; Event frames are queued and decoded by a fixed pool of
//! worker threads. Decoded hits are collected with
//! [`DecodeEngine::get_data`](engine::DecodeEngine::get_data).
//!
//! ## Crate Structure
//!
//! - **`frame`**: raw and host-order frames, byte-order conversion, classification.
//! - **`cursor`**: bounds-checked word reader used by the decoder.
//! - **`decoder`**: bit-level decoding of one Event frame, consistency checks.
//! - **`event`**: the decoded hit record and its waveform traces.
//! - **`queue`**: ingestion queue and output collection shared with the workers.
//! - **`pool`**: the decode worker threads.
//! - **`engine`**: the caller-facing [`DecodeEngine`].
//! - **`stats`**: pipeline counters.
//! - **`config`**: `figment`-based [`DecoderConfig`].
//! - **`tracing_setup`**: subscriber installation for host applications.
//! - **`synth`**: synthetic device frames for tests and benchmarks.
//! - **`error`**: the [`DecodeError`] type.

pub mod config;
pub mod cursor;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod event;
pub mod frame;
pub mod pool;
pub mod queue;
pub mod stats;
pub mod synth;
pub mod tracing_setup;

pub use config::DecoderConfig;
pub use decoder::{ConsistencyWarning, EventDecoder};
pub use engine::DecodeEngine;
pub use error::{DecodeError, DecodeResult};
pub use event::{Event, Waveform};
pub use frame::{FrameKind, HostFrame, RawFrame};
pub use stats::StatsSnapshot;
