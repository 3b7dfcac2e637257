//! Decoded hit records.

use serde::{Deserialize, Serialize};

/// Optional per-sample probe traces recorded with a hit.
///
/// All six arrays always have the same length: zero when the hit carried no waveform,
/// otherwise twice the number of sample words in the frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    pub analog_probe1: Vec<i32>,
    pub analog_probe2: Vec<i32>,
    pub digital_probe1: Vec<u8>,
    pub digital_probe2: Vec<u8>,
    pub digital_probe3: Vec<u8>,
    pub digital_probe4: Vec<u8>,
}

impl Waveform {
    /// Zero-filled traces of `samples` points each.
    pub fn with_samples(samples: usize) -> Self {
        Self {
            analog_probe1: vec![0; samples],
            analog_probe2: vec![0; samples],
            digital_probe1: vec![0; samples],
            digital_probe2: vec![0; samples],
            digital_probe3: vec![0; samples],
            digital_probe4: vec![0; samples],
        }
    }

    /// Number of samples per trace.
    #[must_use]
    pub fn len(&self) -> usize {
        self.analog_probe1.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.analog_probe1.is_empty()
    }
}

/// One decoded hit.
///
/// Times are in nanoseconds. `coarse_time_ns` is the tick count scaled by the configured
/// time step; `time_ns` adds the fine-timestamp interpolation on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub channel: u8,
    /// Coarse timestamp in ADC ticks
    pub timestamp_ticks: u64,
    pub coarse_time_ns: u64,
    pub time_ns: f64,
    /// Raw 10-bit fine-timestamp fraction (units of 1/1024 tick)
    pub fine_timestamp: u16,
    /// Long-gate charge
    pub energy: u16,
    /// Short-gate charge
    pub energy_short: u16,
    pub flags_low_priority: u16,
    pub flags_high_priority: u16,
    pub trigger_threshold: u16,
    /// Nanoseconds per tick the event was decoded with
    pub time_resolution: u32,
    pub down_sample_factor: u8,
    pub analog_probe1_type: u8,
    pub analog_probe2_type: u8,
    pub digital_probe1_type: u8,
    pub digital_probe2_type: u8,
    pub digital_probe3_type: u8,
    pub digital_probe4_type: u8,
    /// Board-fail bit of the frame this hit came from
    pub board_fail: bool,
    /// Aggregate counter of the frame this hit came from
    pub aggregate_counter: u32,
    pub waveform: Waveform,
}

impl Event {
    #[must_use]
    pub fn has_waveform(&self) -> bool {
        !self.waveform.is_empty()
    }
}
