//! DPP-PSD event decoder.
//!
//! Turns one host-order Event frame into the hits it packs. Frame layout (64-bit words):
//!
//! ```text
//! word 0       frame header   [60:63] tag=0x2  [56] board fail  [32:55] aggregate counter
//!                             [0:31] total words including this one
//! per hit:
//!   word A     [63]=0  [56:62] channel  [0:47] coarse timestamp
//!   word B     [63] last word  [62] waveform present  [50:61] low-priority flags
//!              [42:49] high-priority flags  [26:41] short gate  [16:25] fine time
//!              [0:15] long gate
//!   if waveform present:
//!   header     [63]=1 [60:62]=0  [44:45] time resolution  [28:43] trigger threshold
//!              [24:27]/[20:23]/[16:19]/[12:15] digital probe 4/3/2/1 type
//!              [6:8] AP2 type [9] AP2 signed [10:11] AP2 multiplier
//!              [0:2] AP1 type [3] AP1 signed [4:5] AP1 multiplier
//!   size       [0:11] number of sample words
//!   samples    two 32-bit points per word, low half first:
//!              [0:13] AP1  [14] DP1  [15] DP2  [16:29] AP2  [30] DP3  [31] DP4
//! ```
//!
//! Cross-checks on the header are reported as [`ConsistencyWarning`]s and decoding
//! carries on. A length field that runs past the end of the buffer stops the frame with
//! [`DecodeError::OutOfBounds`]; hits decoded before that point are kept.
//!
//! Bit positions follow the x27xx DPP-PSD firmware RAW format and should be re-checked
//! when the firmware changes.

use std::fmt;
use tracing::{error, info, warn};

use crate::cursor::WordCursor;
use crate::error::{DecodeError, DecodeResult};
use crate::event::{Event, Waveform};
use crate::frame::HostFrame;

mod layout {
    // Frame header
    pub const HEADER_TAG_SHIFT: u32 = 60;
    pub const HEADER_TAG_MASK: u64 = 0xF;
    pub const HEADER_TAG_EVENT: u64 = 0x2;
    pub const BOARD_FAIL_SHIFT: u32 = 56;
    pub const AGGREGATE_COUNTER_SHIFT: u32 = 32;
    pub const AGGREGATE_COUNTER_MASK: u64 = 0xFF_FFFF;
    pub const TOTAL_WORDS_MASK: u64 = 0xFFFF_FFFF;

    // Word A
    pub const CHANNEL_SHIFT: u32 = 56;
    pub const CHANNEL_MASK: u64 = 0x7F;
    pub const TIMESTAMP_MASK: u64 = 0xFFFF_FFFF_FFFF;

    // Word B
    pub const LAST_WORD_SHIFT: u32 = 63;
    pub const WAVEFORM_FLAG_SHIFT: u32 = 62;
    pub const FLAGS_LOW_SHIFT: u32 = 50;
    pub const FLAGS_LOW_MASK: u64 = 0xFFF;
    pub const FLAGS_HIGH_SHIFT: u32 = 42;
    pub const FLAGS_HIGH_MASK: u64 = 0xFF;
    pub const ENERGY_SHORT_SHIFT: u32 = 26;
    pub const ENERGY_MASK: u64 = 0xFFFF;
    pub const FINE_TIME_SHIFT: u32 = 16;
    pub const FINE_TIME_MASK: u64 = 0x3FF;
    pub const FINE_TIME_SCALE: f64 = 1024.0;

    // Waveform header
    pub const WAVE_CHECK1_SHIFT: u32 = 63;
    pub const WAVE_CHECK2_SHIFT: u32 = 60;
    pub const WAVE_CHECK2_MASK: u64 = 0x7;
    pub const TIME_RESOLUTION_SHIFT: u32 = 44;
    pub const TIME_RESOLUTION_MASK: u64 = 0x3;
    pub const TRIGGER_THRESHOLD_SHIFT: u32 = 28;
    pub const TRIGGER_THRESHOLD_MASK: u64 = 0xFFFF;
    pub const DIGITAL_PROBE_TYPE_MASK: u64 = 0xF;
    pub const DIGITAL_PROBE1_TYPE_SHIFT: u32 = 12;
    pub const DIGITAL_PROBE2_TYPE_SHIFT: u32 = 16;
    pub const DIGITAL_PROBE3_TYPE_SHIFT: u32 = 20;
    pub const DIGITAL_PROBE4_TYPE_SHIFT: u32 = 24;
    pub const ANALOG_PROBE1_SHIFT: u32 = 0;
    pub const ANALOG_PROBE2_SHIFT: u32 = 6;

    // Waveform size word
    pub const WAVEFORM_WORDS_MASK: u64 = 0xFFF;

    // Sample point (32 bits)
    pub const SAMPLE_ANALOG_MASK: u32 = 0x3FFF;
    pub const SAMPLE_ANALOG_SIGN_BIT: u32 = 0x2000;
    pub const SAMPLE_ANALOG_RANGE: i32 = 0x4000;
    pub const SAMPLE_AP2_SHIFT: u32 = 16;
    pub const SAMPLE_DP1_SHIFT: u32 = 14;
    pub const SAMPLE_DP2_SHIFT: u32 = 15;
    pub const SAMPLE_DP3_SHIFT: u32 = 30;
    pub const SAMPLE_DP4_SHIFT: u32 = 31;
}

/// Non-fatal problem spotted while decoding a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyWarning {
    /// Header tag is not the Event tag
    BadHeaderTag { tag: u8 },
    /// Board-fail bit set in the header
    BoardFail,
    /// Header word count does not match the buffer length
    SizeMismatch {
        declared_bytes: usize,
        actual_bytes: usize,
    },
    /// Aggregate counter skipped (single worker only)
    CounterGap { previous: u32, current: u32 },
    /// Waveform header marker bits are wrong
    BadWaveformHeader { word: u64 },
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyWarning::BadHeaderTag { tag } => {
                write!(f, "frame header tag 0x{:x} is not an event tag", tag)
            }
            ConsistencyWarning::BoardFail => write!(f, "board fail bit set"),
            ConsistencyWarning::SizeMismatch {
                declared_bytes,
                actual_bytes,
            } => write!(
                f,
                "declared size {} bytes differs from actual size {} bytes",
                declared_bytes, actual_bytes
            ),
            ConsistencyWarning::CounterGap { previous, current } => write!(
                f,
                "aggregate counter is not continuous: {} -> {}",
                previous, current
            ),
            ConsistencyWarning::BadWaveformHeader { word } => {
                write!(f, "waveform header check failed: 0x{:016x}", word)
            }
        }
    }
}

/// Parsed frame header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub tag: u8,
    pub board_fail: bool,
    pub aggregate_counter: u32,
    pub total_words: usize,
}

impl FrameHeader {
    #[must_use]
    pub fn parse(word: u64) -> Self {
        Self {
            tag: ((word >> layout::HEADER_TAG_SHIFT) & layout::HEADER_TAG_MASK) as u8,
            board_fail: (word >> layout::BOARD_FAIL_SHIFT) & 0x1 == 0x1,
            aggregate_counter: ((word >> layout::AGGREGATE_COUNTER_SHIFT)
                & layout::AGGREGATE_COUNTER_MASK) as u32,
            total_words: (word & layout::TOTAL_WORDS_MASK) as usize,
        }
    }
}

/// Last-seen aggregate counter for gap detection.
///
/// Only meaningful when frames are decoded in submission order, i.e. with a single
/// decode worker. The worker pool creates one only in that configuration.
#[derive(Debug, Clone, Default)]
pub struct ContinuityTracker {
    last: u32,
}

impl ContinuityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter of the previously observed frame.
    #[must_use]
    pub fn last(&self) -> u32 {
        self.last
    }

    /// Record `counter`, returning a gap warning if it does not follow the previous one.
    ///
    /// A counter of zero is the firmware's wrap-around value and always accepted.
    pub fn observe(&mut self, counter: u32) -> Option<ConsistencyWarning> {
        let expected = self.last.wrapping_add(1) & layout::AGGREGATE_COUNTER_MASK as u32;
        let gap = (counter != 0 && counter != expected).then_some(ConsistencyWarning::CounterGap {
            previous: self.last,
            current: counter,
        });
        self.last = counter;
        gap
    }
}

/// Result of decoding one frame.
#[derive(Debug, Default)]
pub struct DecodeOutcome {
    pub events: Vec<Event>,
    pub warnings: Vec<ConsistencyWarning>,
    /// Set when decoding stopped early; `events` holds the hits decoded before that.
    pub abort: Option<DecodeError>,
}

impl DecodeOutcome {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.abort.is_none()
    }
}

/// Analog probe settings from the waveform header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AnalogProbe {
    kind: u8,
    signed: bool,
    multiplier: i32,
}

impl AnalogProbe {
    /// Parse the 6-bit probe field: `[0:2]` type, `[3]` signed, `[4:5]` multiplier code.
    fn from_field(field: u64) -> Self {
        Self {
            kind: (field & 0x7) as u8,
            signed: (field >> 3) & 0x1 == 0x1,
            multiplier: match (field >> 4) & 0x3 {
                0 => 1,
                1 => 4,
                2 => 8,
                _ => 16,
            },
        }
    }

    /// Scale a 14-bit raw sample, sign-extending it first when the probe is signed.
    fn sample(&self, raw: u32) -> i32 {
        let raw = raw & layout::SAMPLE_ANALOG_MASK;
        let value = if self.signed && raw & layout::SAMPLE_ANALOG_SIGN_BIT != 0 {
            raw as i32 - layout::SAMPLE_ANALOG_RANGE
        } else {
            raw as i32
        };
        value * self.multiplier
    }
}

/// Waveform header fields copied into every event that carries a trace.
#[derive(Debug, Clone, Copy)]
struct WaveformHeader {
    down_sample_factor: u8,
    trigger_threshold: u16,
    digital_probe_types: [u8; 4],
    analog_probe1: AnalogProbe,
    analog_probe2: AnalogProbe,
}

impl WaveformHeader {
    fn parse(word: u64) -> Self {
        let digital = |shift: u32| ((word >> shift) & layout::DIGITAL_PROBE_TYPE_MASK) as u8;
        Self {
            down_sample_factor: 1 << ((word >> layout::TIME_RESOLUTION_SHIFT)
                & layout::TIME_RESOLUTION_MASK),
            trigger_threshold: ((word >> layout::TRIGGER_THRESHOLD_SHIFT)
                & layout::TRIGGER_THRESHOLD_MASK) as u16,
            digital_probe_types: [
                digital(layout::DIGITAL_PROBE1_TYPE_SHIFT),
                digital(layout::DIGITAL_PROBE2_TYPE_SHIFT),
                digital(layout::DIGITAL_PROBE3_TYPE_SHIFT),
                digital(layout::DIGITAL_PROBE4_TYPE_SHIFT),
            ],
            analog_probe1: AnalogProbe::from_field(word >> layout::ANALOG_PROBE1_SHIFT),
            analog_probe2: AnalogProbe::from_field(word >> layout::ANALOG_PROBE2_SHIFT),
        }
    }

    fn marker_ok(word: u64) -> bool {
        (word >> layout::WAVE_CHECK1_SHIFT) & 0x1 == 0x1
            && (word >> layout::WAVE_CHECK2_SHIFT) & layout::WAVE_CHECK2_MASK == 0x0
    }
}

/// Stateless frame decoder.
///
/// Holds only the time step and the dump flag, so a worker builds one per frame from the
/// engine's current settings. Aggregate-counter tracking is passed in separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDecoder {
    time_step: u32,
    dump: bool,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new(1)
    }
}

impl EventDecoder {
    /// Decoder using `time_step` nanoseconds per coarse tick.
    pub fn new(time_step: u32) -> Self {
        Self {
            time_step,
            dump: false,
        }
    }

    /// Enable per-word diagnostic output.
    #[must_use]
    pub fn with_dump(mut self, dump: bool) -> Self {
        self.dump = dump;
        self
    }

    #[must_use]
    pub fn time_step(&self) -> u32 {
        self.time_step
    }

    /// Decode every hit packed in `frame`.
    ///
    /// `continuity` is only supplied when frames arrive in submission order.
    pub fn decode(
        &self,
        frame: &HostFrame,
        continuity: Option<&mut ContinuityTracker>,
    ) -> DecodeOutcome {
        let mut outcome = DecodeOutcome::default();

        if self.dump {
            self.dump_frame(frame);
        }

        let header = match frame.cursor(0).peek_at(0) {
            Ok(word) => FrameHeader::parse(word),
            Err(e) => {
                error!(error = %e, "Event frame has no header word");
                outcome.abort = Some(e);
                return outcome;
            }
        };

        if u64::from(header.tag) != layout::HEADER_TAG_EVENT {
            outcome
                .warnings
                .push(ConsistencyWarning::BadHeaderTag { tag: header.tag });
        }
        if header.board_fail {
            outcome.warnings.push(ConsistencyWarning::BoardFail);
        }
        if let Some(gap) = continuity.and_then(|tracker| tracker.observe(header.aggregate_counter)) {
            outcome.warnings.push(gap);
        }
        let declared_bytes = header.total_words.saturating_mul(crate::frame::WORD_SIZE);
        if declared_bytes != frame.size() {
            outcome.warnings.push(ConsistencyWarning::SizeMismatch {
                declared_bytes,
                actual_bytes: frame.size(),
            });
        }
        for warning in &outcome.warnings {
            warn!(
                aggregate_counter = header.aggregate_counter,
                "Inconsistent event frame: {}", warning
            );
        }

        let capacity = (frame.hit_count_hint() as usize).min(frame.len_words() / 2);
        outcome.events.reserve(capacity);

        let mut cursor = frame.cursor(1);
        while cursor.position() < header.total_words {
            match self.decode_hit(&mut cursor, &header) {
                Ok((event, waveform_warning)) => {
                    if let Some(w) = waveform_warning {
                        warn!(channel = event.channel, "Inconsistent event frame: {}", w);
                        outcome.warnings.push(w);
                    }
                    outcome.events.push(event);
                }
                Err(e) => {
                    error!(
                        error = %e,
                        decoded = outcome.events.len(),
                        aggregate_counter = header.aggregate_counter,
                        "Aborting event frame"
                    );
                    outcome.abort = Some(e);
                    break;
                }
            }
        }

        if self.dump {
            info!(events = outcome.events.len(), "Decoded event frame");
        }
        outcome
    }

    fn decode_hit(
        &self,
        cursor: &mut WordCursor<'_>,
        header: &FrameHeader,
    ) -> DecodeResult<(Event, Option<ConsistencyWarning>)> {
        let first = cursor.next_word()?;
        let second = cursor.next_word()?;

        let channel = ((first >> layout::CHANNEL_SHIFT) & layout::CHANNEL_MASK) as u8;
        let timestamp_ticks = first & layout::TIMESTAMP_MASK;
        let coarse_time_ns = timestamp_ticks.saturating_mul(u64::from(self.time_step));

        let last_word = (second >> layout::LAST_WORD_SHIFT) & 0x1 == 0x1;
        let with_waveform = (second >> layout::WAVEFORM_FLAG_SHIFT) & 0x1 == 0x1;
        let fine_timestamp = ((second >> layout::FINE_TIME_SHIFT) & layout::FINE_TIME_MASK) as u16;
        let time_ns = coarse_time_ns as f64
            + f64::from(fine_timestamp) / layout::FINE_TIME_SCALE * f64::from(self.time_step);

        let mut event = Event {
            channel,
            timestamp_ticks,
            coarse_time_ns,
            time_ns,
            fine_timestamp,
            energy: (second & layout::ENERGY_MASK) as u16,
            energy_short: ((second >> layout::ENERGY_SHORT_SHIFT) & layout::ENERGY_MASK) as u16,
            flags_low_priority: ((second >> layout::FLAGS_LOW_SHIFT) & layout::FLAGS_LOW_MASK)
                as u16,
            flags_high_priority: ((second >> layout::FLAGS_HIGH_SHIFT) & layout::FLAGS_HIGH_MASK)
                as u16,
            trigger_threshold: 0,
            time_resolution: self.time_step,
            down_sample_factor: 1,
            analog_probe1_type: 0,
            analog_probe2_type: 0,
            digital_probe1_type: 0,
            digital_probe2_type: 0,
            digital_probe3_type: 0,
            digital_probe4_type: 0,
            board_fail: header.board_fail,
            aggregate_counter: header.aggregate_counter,
            waveform: Waveform::default(),
        };

        let mut warning = None;
        if with_waveform {
            let wave_word = cursor.next_word()?;
            if !WaveformHeader::marker_ok(wave_word) {
                warning = Some(ConsistencyWarning::BadWaveformHeader { word: wave_word });
            }
            let wave_header = WaveformHeader::parse(wave_word);
            event.down_sample_factor = wave_header.down_sample_factor;
            event.trigger_threshold = wave_header.trigger_threshold;
            event.digital_probe1_type = wave_header.digital_probe_types[0];
            event.digital_probe2_type = wave_header.digital_probe_types[1];
            event.digital_probe3_type = wave_header.digital_probe_types[2];
            event.digital_probe4_type = wave_header.digital_probe_types[3];
            event.analog_probe1_type = wave_header.analog_probe1.kind;
            event.analog_probe2_type = wave_header.analog_probe2.kind;

            let sample_words = (cursor.next_word()? & layout::WAVEFORM_WORDS_MASK) as usize;
            cursor.require(sample_words)?;
            event.waveform = Self::decode_samples(cursor, sample_words, &wave_header)?;
        }

        if self.dump {
            info!(
                channel = event.channel,
                timestamp_ns = event.coarse_time_ns,
                time_ns = event.time_ns,
                energy = event.energy,
                energy_short = event.energy_short,
                flags_low = event.flags_low_priority,
                flags_high = event.flags_high_priority,
                last_word,
                samples = event.waveform.len(),
                "Decoded hit"
            );
        }

        Ok((event, warning))
    }

    fn decode_samples(
        cursor: &mut WordCursor<'_>,
        sample_words: usize,
        header: &WaveformHeader,
    ) -> DecodeResult<Waveform> {
        let mut waveform = Waveform::with_samples(sample_words * 2);

        for j in 0..sample_words {
            let word = cursor.next_word()?;
            let points = [(word & 0xFFFF_FFFF) as u32, (word >> 32) as u32];

            for (k, point) in points.into_iter().enumerate() {
                let n = j * 2 + k;
                waveform.analog_probe1[n] = header.analog_probe1.sample(point);
                waveform.analog_probe2[n] =
                    header.analog_probe2.sample(point >> layout::SAMPLE_AP2_SHIFT);
                waveform.digital_probe1[n] = ((point >> layout::SAMPLE_DP1_SHIFT) & 0x1) as u8;
                waveform.digital_probe2[n] = ((point >> layout::SAMPLE_DP2_SHIFT) & 0x1) as u8;
                waveform.digital_probe3[n] = ((point >> layout::SAMPLE_DP3_SHIFT) & 0x1) as u8;
                waveform.digital_probe4[n] = ((point >> layout::SAMPLE_DP4_SHIFT) & 0x1) as u8;
            }
        }

        Ok(waveform)
    }

    fn dump_frame(&self, frame: &HostFrame) {
        info!(
            size = frame.size(),
            words = frame.len_words(),
            hit_count_hint = frame.hit_count_hint(),
            "Event frame dump"
        );
        let mut cursor = frame.cursor(0);
        while let Ok(word) = cursor.next_word() {
            info!("word {:4}: {:064b}", cursor.position() - 1, word);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    const EVENT_TAG: u64 = 0x2 << 60;

    fn header(counter: u64, words: u64) -> u64 {
        EVENT_TAG | (counter << 32) | words
    }

    fn word_a(channel: u64, ticks: u64) -> u64 {
        (channel << 56) | ticks
    }

    fn word_b(waveform: bool, fine: u64, short: u64, long: u64) -> u64 {
        (1 << 63) | (u64::from(waveform) << 62) | (short << 26) | (fine << 16) | long
    }

    /// Marker bit set, AP1 unsigned x4 (code 1), AP2 signed x1.
    fn wave_header() -> u64 {
        (1 << 63) | (0x2 << 44) | (300 << 28) | (0x3 << 12) | (0x1 << 6) | (1 << 9) | (1 << 4) | 0x2
    }

    fn frame(words: &[u64]) -> HostFrame {
        HostFrame::from_words(words, 0)
    }

    #[test]
    fn decodes_hit_without_waveform() {
        let f = frame(&[header(1, 3), word_a(5, 1000), word_b(false, 0, 40, 1234)]);
        let outcome = EventDecoder::new(2).decode(&f, None);

        assert!(outcome.is_complete());
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.events.len(), 1);

        let e = &outcome.events[0];
        assert_eq!(e.channel, 5);
        assert_eq!(e.timestamp_ticks, 1000);
        assert_eq!(e.coarse_time_ns, 2000);
        assert_eq!(e.time_ns, 2000.0);
        assert_eq!(e.energy, 1234);
        assert_eq!(e.energy_short, 40);
        assert_eq!(e.time_resolution, 2);
        assert_eq!(e.down_sample_factor, 1);
        assert!(!e.has_waveform());
        assert!(e.waveform.analog_probe2.is_empty());
        assert!(e.waveform.digital_probe4.is_empty());
    }

    #[test]
    fn fine_timestamp_refines_time() {
        let f = frame(&[header(1, 3), word_a(0, 10), word_b(false, 512, 0, 0)]);
        let e = &EventDecoder::new(4).decode(&f, None).events[0];

        assert_eq!(e.fine_timestamp, 512);
        assert_eq!(e.coarse_time_ns, 40);
        assert!((e.time_ns - 42.0).abs() < 1e-9);
    }

    #[test]
    fn flags_are_extracted() {
        let second = (0x5A5u64 << 50) | (0xC3u64 << 42);
        let f = frame(&[header(1, 3), word_a(1, 1), second]);
        let e = &EventDecoder::new(1).decode(&f, None).events[0];

        assert_eq!(e.flags_low_priority, 0x5A5);
        assert_eq!(e.flags_high_priority, 0xC3);
    }

    #[test]
    fn low_priority_flags_span_twelve_bits() {
        let f = frame(&[header(1, 3), word_a(1, 0), 0xFFF << 50]);
        let e = &EventDecoder::new(1).decode(&f, None).events[0];

        assert_eq!(e.flags_low_priority, 0xFFF);
        assert_eq!(e.flags_high_priority, 0);
        assert!(!e.has_waveform());

        // Bit 61 alone is the top flag, not the waveform bit
        let f = frame(&[header(1, 3), word_a(1, 0), 1 << 61]);
        let e = &EventDecoder::new(1).decode(&f, None).events[0];
        assert_eq!(e.flags_low_priority, 0x800);
    }

    #[test]
    fn decodes_waveform_samples() {
        // point 0: AP1 = 5, DP1 set; AP2 = 0x3FFF (signed -> -1), DP4 set
        let point0: u64 = 5 | (1 << 14) | (0x3FFF << 16) | (1 << 31);
        // point 1: AP1 = 1, DP2 set; AP2 = 7, DP3 set
        let point1: u64 = 1 | (1 << 15) | (7 << 16) | (1 << 30);
        let samples = point0 | (point1 << 32);

        let f = frame(&[
            header(1, 6),
            word_a(5, 1000),
            word_b(true, 0, 0, 0),
            wave_header(),
            1,
            samples,
        ]);
        let outcome = EventDecoder::new(2).decode(&f, None);
        assert!(outcome.is_complete());
        assert!(outcome.warnings.is_empty());

        let e = &outcome.events[0];
        assert_eq!(e.down_sample_factor, 4);
        assert_eq!(e.trigger_threshold, 300);
        assert_eq!(e.digital_probe1_type, 0x3);
        assert_eq!(e.analog_probe1_type, 0x2);
        assert_eq!(e.analog_probe2_type, 0x1);
        assert_eq!(e.time_resolution, 2);

        let w = &e.waveform;
        assert_eq!(w.len(), 2);
        assert_eq!(w.analog_probe1, vec![20, 4]);
        assert_eq!(w.analog_probe2, vec![-1, 7]);
        assert_eq!(w.digital_probe1, vec![1, 0]);
        assert_eq!(w.digital_probe2, vec![0, 1]);
        assert_eq!(w.digital_probe3, vec![0, 1]);
        assert_eq!(w.digital_probe4, vec![1, 0]);
    }

    #[test]
    fn analog_probe_scaling_and_sign() {
        let unsigned_x16 = AnalogProbe::from_field(0b11_0_000);
        assert_eq!(unsigned_x16.multiplier, 16);
        assert_eq!(unsigned_x16.sample(0x2000), 0x2000 * 16);

        let signed_x8 = AnalogProbe::from_field(0b10_1_101);
        assert_eq!(signed_x8.kind, 0b101);
        assert_eq!(signed_x8.sample(0x2000), -0x2000 * 8);
        assert_eq!(signed_x8.sample(0x1FFF), 0x1FFF * 8);
        // Bits above the 14-bit field are ignored
        assert_eq!(signed_x8.sample(0xC001), 8);
    }

    #[test]
    fn down_sample_codes() {
        for (code, factor) in [(0u64, 1u8), (1, 2), (2, 4), (3, 8)] {
            let h = WaveformHeader::parse((1 << 63) | (code << 44));
            assert_eq!(h.down_sample_factor, factor);
        }
    }

    #[test]
    fn multiple_hits_in_one_frame() {
        let f = frame(&[
            header(1, 8),
            word_a(1, 100),
            word_b(false, 0, 0, 11),
            word_a(2, 200),
            word_b(true, 0, 0, 22),
            wave_header(),
            1,
            0,
            word_a(3, 300),
            word_b(false, 0, 0, 33),
        ]);
        // Declared 8 words but 10 are present: the last hit is beyond the declared count
        let outcome = EventDecoder::new(1).decode(&f, None);

        let channels: Vec<u8> = outcome.events.iter().map(|e| e.channel).collect();
        assert_eq!(channels, vec![1, 2]);
        assert_eq!(outcome.events[1].waveform.len(), 2);
        assert!(outcome.warnings.contains(&ConsistencyWarning::SizeMismatch {
            declared_bytes: 64,
            actual_bytes: 80
        }));
    }

    #[test]
    fn header_checks_are_reported() {
        let bad = (0x5u64 << 60) | (1 << 56) | 3;
        let f = frame(&[bad, word_a(1, 1), word_b(false, 0, 0, 7)]);
        let outcome = EventDecoder::new(1).decode(&f, None);

        assert_eq!(outcome.events.len(), 1);
        assert!(outcome.events[0].board_fail);
        assert!(outcome
            .warnings
            .contains(&ConsistencyWarning::BadHeaderTag { tag: 0x5 }));
        assert!(outcome.warnings.contains(&ConsistencyWarning::BoardFail));
    }

    #[test]
    fn bad_waveform_marker_is_a_warning() {
        let f = frame(&[header(1, 6), word_a(1, 1), word_b(true, 0, 0, 0), 0, 1, 0]);
        let outcome = EventDecoder::new(1).decode(&f, None);

        assert!(outcome.is_complete());
        assert_eq!(outcome.events[0].waveform.len(), 2);
        assert_eq!(
            outcome.warnings,
            vec![ConsistencyWarning::BadWaveformHeader { word: 0 }]
        );
    }

    #[test]
    fn oversized_waveform_aborts_frame() {
        let f = frame(&[
            header(1, 8),
            word_a(1, 1),
            word_b(false, 0, 0, 1),
            word_a(2, 2),
            word_b(true, 0, 0, 2),
            wave_header(),
            0xFFF,
            0,
        ]);
        let outcome = EventDecoder::new(1).decode(&f, None);

        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].channel, 1);
        assert!(matches!(
            outcome.abort,
            Some(DecodeError::OutOfBounds { words: 8, .. })
        ));
    }

    #[test]
    fn declared_size_larger_than_buffer_aborts() {
        let f = frame(&[header(1, 100), word_a(1, 1), word_b(false, 0, 0, 1), word_a(2, 2)]);
        let outcome = EventDecoder::new(1).decode(&f, None);

        assert_eq!(outcome.events.len(), 1);
        assert!(outcome.abort.is_some());
        assert!(outcome.warnings.contains(&ConsistencyWarning::SizeMismatch {
            declared_bytes: 800,
            actual_bytes: 32
        }));
    }

    #[test]
    fn continuity_tracker_detects_gaps() {
        let mut tracker = ContinuityTracker::new();
        assert_eq!(tracker.observe(1), None);
        assert_eq!(tracker.observe(2), None);
        assert_eq!(
            tracker.observe(4),
            Some(ConsistencyWarning::CounterGap {
                previous: 2,
                current: 4
            })
        );
        // Wrap to zero is accepted
        assert_eq!(tracker.observe(0), None);
        assert_eq!(tracker.observe(1), None);
        assert_eq!(tracker.last(), 1);
    }

    #[test]
    fn continuity_wraps_at_counter_width() {
        let mut tracker = ContinuityTracker::new();
        tracker.observe(0xFF_FFFE);
        assert_eq!(tracker.observe(0xFF_FFFF), None);
        assert_eq!(tracker.observe(0), None);
    }

    #[traced_test]
    #[test]
    fn counter_gap_is_logged_once() {
        let decoder = EventDecoder::new(1);
        let mut tracker = ContinuityTracker::new();
        let mut gaps = 0;

        for counter in [1u64, 3] {
            let f = frame(&[header(counter, 3), word_a(0, counter), word_b(false, 0, 0, 0)]);
            let outcome = decoder.decode(&f, Some(&mut tracker));
            gaps += outcome
                .warnings
                .iter()
                .filter(|w| matches!(w, ConsistencyWarning::CounterGap { .. }))
                .count();
        }

        assert_eq!(gaps, 1);
        assert!(logs_contain("aggregate counter is not continuous: 1 -> 3"));
    }

    #[test]
    fn decoding_is_repeatable() {
        let f = frame(&[
            header(7, 6),
            word_a(9, 123_456),
            word_b(true, 77, 5, 6),
            wave_header(),
            1,
            0xDEAD_BEEF_0BAD_F00D,
        ]);
        let decoder = EventDecoder::new(8);

        let first = decoder.decode(&f, None).events;
        let second = decoder.decode(&f, None).events;
        assert_eq!(first, second);
    }

    #[traced_test]
    #[test]
    fn dump_does_not_change_values() {
        let f = frame(&[header(1, 3), word_a(3, 50), word_b(false, 100, 1, 2)]);

        let plain = EventDecoder::new(2).decode(&f, None).events;
        let dumped = EventDecoder::new(2).with_dump(true).decode(&f, None).events;

        assert_eq!(plain, dumped);
        assert!(logs_contain("Event frame dump"));
    }

    #[test]
    fn frame_header_parse() {
        let h = FrameHeader::parse(header(0xABCDEF, 42) | (1 << 56));
        assert_eq!(h.tag, 0x2);
        assert!(h.board_fail);
        assert_eq!(h.aggregate_counter, 0xABCDEF);
        assert_eq!(h.total_words, 42);
    }
}
