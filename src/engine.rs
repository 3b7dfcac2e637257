//! Caller-facing decode engine.
//!
//! [`DecodeEngine`] ties the pieces together: `add_data` classifies and queues frames,
//! the worker pool decodes them in the background, and `get_data` hands back everything
//! decoded so far.
//!
//! ```no_run
//! use daq_psd2::engine::DecodeEngine;
//! use daq_psd2::frame::{FrameKind, RawFrame};
//!
//! # fn read_endpoint() -> Vec<u8> { Vec::new() }
//! # fn main() -> Result<(), daq_psd2::error::DecodeError> {
//! let engine = DecodeEngine::new(4)?;
//! engine.set_time_step(2);
//!
//! loop {
//!     let kind = engine.add_data(RawFrame::new(read_endpoint(), 0))?;
//!     if kind == FrameKind::Stop {
//!         break;
//!     }
//!     for event in engine.get_data() {
//!         println!("ch{} E={}", event.channel, event.energy);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use crate::config::DecoderConfig;
use crate::error::{DecodeError, DecodeResult};
use crate::event::Event;
use crate::frame::{classify, stop_dead_time_ns, FrameKind, RawFrame};
use crate::pool::{DecodeWorkerPool, PipelineState};
use crate::stats::StatsSnapshot;

/// Raw-stream decode engine for one digitizer.
///
/// All methods take `&self`, so the engine can be shared between an acquisition thread
/// calling [`add_data`](Self::add_data) and a consumer calling [`get_data`](Self::get_data).
pub struct DecodeEngine {
    state: Arc<PipelineState>,
    pool: parking_lot::Mutex<DecodeWorkerPool>,
}

impl DecodeEngine {
    /// Start an engine with `workers` decode threads (zero is treated as one).
    pub fn new(workers: usize) -> DecodeResult<Self> {
        let state = Arc::new(PipelineState::new());
        let pool = DecodeWorkerPool::spawn(workers, Arc::clone(&state))?;
        Ok(Self {
            state,
            pool: parking_lot::Mutex::new(pool),
        })
    }

    /// Start an engine from validated configuration.
    pub fn from_config(config: &DecoderConfig) -> DecodeResult<Self> {
        config.validate()?;
        let engine = Self::new(config.workers)?;
        engine.set_time_step(config.time_step_ns);
        engine.set_dump_flag(config.dump);
        Ok(engine)
    }

    /// Submit one buffer read from the instrument.
    ///
    /// Event frames are queued for decoding; Start and Stop markers are logged and
    /// dropped. The returned kind tells the acquisition loop when the run has ended.
    ///
    /// # Errors
    ///
    /// Misaligned or oversized buffers and frames too short to classify are format
    /// errors ([`DecodeError::is_format_error`]). An Event frame submitted after
    /// [`shutdown`](Self::shutdown) returns [`DecodeError::EngineStopped`].
    #[instrument(skip_all, fields(size = raw.size()))]
    pub fn add_data(&self, raw: RawFrame) -> DecodeResult<FrameKind> {
        let frame = raw
            .into_host_order()
            .inspect_err(|e| error!(error = %e, "Rejected raw frame"))?;

        let kind = classify(&frame);

        match kind {
            FrameKind::Event => {
                // Held across the push so shutdown cannot clear the queue in between
                let pool = self.pool.lock();
                if !pool.is_running() {
                    return Err(DecodeError::EngineStopped);
                }
                debug!(words = frame.len_words(), "Queued event frame");
                self.state.enqueue(frame);
            }
            FrameKind::Start => info!("Run start marker received"),
            FrameKind::Stop => {
                let dead_time_ns = stop_dead_time_ns(&frame).unwrap_or_default();
                info!(dead_time_ns, "Run stop marker received");
            }
            FrameKind::Unknown => {
                let words = frame.len_words();
                error!(words, "Unknown frame type");
                return Err(DecodeError::UnknownFrame { words });
            }
        }
        self.state.stats.record_ingest(kind);
        Ok(kind)
    }

    /// Take every event decoded since the last call.
    ///
    /// Events from one frame stay together and in frame order. With more than one
    /// worker, the order between frames is unspecified.
    #[must_use]
    pub fn get_data(&self) -> Vec<Event> {
        self.state.output.drain_all()
    }

    /// Set nanoseconds per coarse timestamp tick for frames decoded from now on.
    pub fn set_time_step(&self, time_step: u32) {
        debug!(time_step, "Time step updated");
        self.state.set_time_step(time_step);
    }

    #[must_use]
    pub fn time_step(&self) -> u32 {
        self.state.time_step()
    }

    /// Turn per-word diagnostic output on or off.
    pub fn set_dump_flag(&self, dump: bool) {
        self.state.set_dump(dump);
    }

    #[must_use]
    pub fn dump_flag(&self) -> bool {
        self.state.dump()
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.state.stats.snapshot()
    }

    /// Frames queued or currently being decoded.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.in_flight()
    }

    /// Block until every submitted frame has been decoded, or `timeout` elapses.
    ///
    /// Returns `true` if the engine went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.state.wait_idle(timeout)
    }

    /// Worker count fixed at construction.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.pool.lock().worker_count()
    }

    /// Whether aggregate-counter gaps are checked (single worker only).
    #[must_use]
    pub fn continuity_check_enabled(&self) -> bool {
        self.pool.lock().continuity_check_enabled()
    }

    /// Stop the workers. Frames still queued are discarded; their count is returned.
    ///
    /// Events already decoded stay available through [`get_data`](Self::get_data).
    pub fn shutdown(&self) -> usize {
        self.pool.lock().shutdown()
    }
}
