//! Pipeline counters.
//!
//! Lock-free counters updated by the ingestion path and the decode workers, readable at
//! any time as a serializable [`StatsSnapshot`].

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::decoder::{ConsistencyWarning, DecodeOutcome};
use crate::frame::FrameKind;

#[derive(Debug, Default)]
pub struct DecodeStats {
    start_frames: AtomicU64,
    stop_frames: AtomicU64,
    frames_queued: AtomicU64,
    frames_decoded: AtomicU64,
    frames_aborted: AtomicU64,
    frames_discarded: AtomicU64,
    events_decoded: AtomicU64,
    warnings: AtomicU64,
    counter_gaps: AtomicU64,
    board_fails: AtomicU64,
}

/// Point-in-time copy of [`DecodeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub start_frames: u64,
    pub stop_frames: u64,
    pub frames_queued: u64,
    pub frames_decoded: u64,
    pub frames_aborted: u64,
    /// Frames still queued when the engine shut down
    pub frames_discarded: u64,
    pub events_decoded: u64,
    pub warnings: u64,
    pub counter_gaps: u64,
    pub board_fails: u64,
}

impl DecodeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a frame accepted by `add_data`.
    pub fn record_ingest(&self, kind: FrameKind) {
        let counter = match kind {
            FrameKind::Start => &self.start_frames,
            FrameKind::Stop => &self.stop_frames,
            FrameKind::Event => &self.frames_queued,
            FrameKind::Unknown => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count the result of decoding one frame.
    pub fn record_outcome(&self, outcome: &DecodeOutcome) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
        if outcome.abort.is_some() {
            self.frames_aborted.fetch_add(1, Ordering::Relaxed);
        }
        self.events_decoded
            .fetch_add(outcome.events.len() as u64, Ordering::Relaxed);
        self.warnings
            .fetch_add(outcome.warnings.len() as u64, Ordering::Relaxed);

        for warning in &outcome.warnings {
            match warning {
                ConsistencyWarning::CounterGap { .. } => {
                    self.counter_gaps.fetch_add(1, Ordering::Relaxed);
                }
                ConsistencyWarning::BoardFail => {
                    self.board_fails.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
        }
    }

    pub fn record_discarded(&self, frames: usize) {
        self.frames_discarded
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            start_frames: self.start_frames.load(Ordering::Relaxed),
            stop_frames: self.stop_frames.load(Ordering::Relaxed),
            frames_queued: self.frames_queued.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_aborted: self.frames_aborted.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            events_decoded: self.events_decoded.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            counter_gaps: self.counter_gaps.load(Ordering::Relaxed),
            board_fails: self.board_fails.load(Ordering::Relaxed),
        }
    }
}
