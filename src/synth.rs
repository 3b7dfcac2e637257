//! Synthetic digitizer frames.
//!
//! Builds device-order (big-endian) buffers the way the instrument's RAW endpoint
//! delivers them, for tests, benchmarks and fuzz seeds. Random hits use `rand`.
//!
//! ```
//! use daq_psd2::synth::{FrameBuilder, SynthHit};
//!
//! let raw = FrameBuilder::new(1)
//!     .hit(SynthHit::new(5, 1000).energy(1234))
//!     .build();
//! assert_eq!(raw.size(), 3 * 8);
//! ```

use rand::Rng;

use crate::frame::{RawFrame, WORD_SIZE};

/// Analog probe settings encoded in the waveform header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SynthProbe {
    pub kind: u8,
    pub signed: bool,
    /// Multiplier code: 0 => x1, 1 => x4, 2 => x8, 3 => x16
    pub multiplier_code: u8,
}

impl SynthProbe {
    fn field(self) -> u64 {
        u64::from(self.kind & 0x7)
            | (u64::from(self.signed) << 3)
            | (u64::from(self.multiplier_code & 0x3) << 4)
    }
}

/// Waveform attached to a synthetic hit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SynthWaveform {
    /// Time resolution code; the decoded down-sample factor is `1 << code`
    pub down_sample_code: u8,
    pub trigger_threshold: u16,
    pub digital_probe_types: [u8; 4],
    pub analog_probe1: SynthProbe,
    pub analog_probe2: SynthProbe,
    /// 32-bit sample points, two per word. An odd count is padded with a zero point.
    pub points: Vec<u32>,
}

impl SynthWaveform {
    /// Pack one sample point: 14-bit analog values and four digital bits.
    #[must_use]
    pub fn point(ap1: u16, ap2: u16, digital: [bool; 4]) -> u32 {
        u32::from(ap1 & 0x3FFF)
            | (u32::from(digital[0]) << 14)
            | (u32::from(digital[1]) << 15)
            | (u32::from(ap2 & 0x3FFF) << 16)
            | (u32::from(digital[2]) << 30)
            | (u32::from(digital[3]) << 31)
    }

    fn header_word(&self) -> u64 {
        let [dp1, dp2, dp3, dp4] = self.digital_probe_types.map(|t| u64::from(t & 0xF));
        (1 << 63)
            | (u64::from(self.down_sample_code & 0x3) << 44)
            | (u64::from(self.trigger_threshold) << 28)
            | (dp4 << 24)
            | (dp3 << 20)
            | (dp2 << 16)
            | (dp1 << 12)
            | (self.analog_probe2.field() << 6)
            | self.analog_probe1.field()
    }

    fn sample_words(&self) -> Vec<u64> {
        self.points
            .chunks(2)
            .map(|pair| {
                let low = u64::from(pair[0]);
                let high = pair.get(1).copied().map_or(0, u64::from);
                low | (high << 32)
            })
            .collect()
    }

    /// Words this waveform occupies in a frame, including header and size words.
    #[must_use]
    pub fn word_count(&self) -> usize {
        2 + self.points.len().div_ceil(2)
    }
}

/// One synthetic hit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SynthHit {
    pub channel: u8,
    pub timestamp_ticks: u64,
    pub fine_timestamp: u16,
    pub energy: u16,
    pub energy_short: u16,
    pub flags_low_priority: u16,
    pub flags_high_priority: u8,
    pub waveform: Option<SynthWaveform>,
}

impl SynthHit {
    #[must_use]
    pub fn new(channel: u8, timestamp_ticks: u64) -> Self {
        Self {
            channel,
            timestamp_ticks,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn energy(mut self, energy: u16) -> Self {
        self.energy = energy;
        self
    }

    #[must_use]
    pub fn energy_short(mut self, energy_short: u16) -> Self {
        self.energy_short = energy_short;
        self
    }

    #[must_use]
    pub fn fine_timestamp(mut self, fine_timestamp: u16) -> Self {
        self.fine_timestamp = fine_timestamp;
        self
    }

    #[must_use]
    pub fn flags(mut self, low: u16, high: u8) -> Self {
        self.flags_low_priority = low;
        self.flags_high_priority = high;
        self
    }

    #[must_use]
    pub fn waveform(mut self, waveform: SynthWaveform) -> Self {
        self.waveform = Some(waveform);
        self
    }

    /// Random hit on one of 64 channels, with a short waveform about a quarter of the time.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut hit = Self::new(rng.gen_range(0..64), rng.gen_range(0..1u64 << 48))
            .energy(rng.gen())
            .energy_short(rng.gen())
            .fine_timestamp(rng.gen_range(0..1024))
            .flags(rng.gen_range(0..0x1000), rng.gen());

        if rng.gen_bool(0.25) {
            let samples = rng.gen_range(1..=16) * 2;
            hit = hit.waveform(SynthWaveform {
                down_sample_code: rng.gen_range(0..4),
                trigger_threshold: rng.gen(),
                digital_probe_types: [rng.gen_range(0..16), 0, 0, rng.gen_range(0..16)],
                analog_probe1: SynthProbe {
                    kind: rng.gen_range(0..8),
                    signed: rng.gen(),
                    multiplier_code: rng.gen_range(0..4),
                },
                analog_probe2: SynthProbe::default(),
                points: (0..samples).map(|_| rng.gen()).collect(),
            });
        }
        hit
    }

    fn push_words(&self, words: &mut Vec<u64>) {
        words.push(
            (u64::from(self.channel & 0x7F) << 56) | (self.timestamp_ticks & 0xFFFF_FFFF_FFFF),
        );

        let has_waveform = self.waveform.is_some();
        words.push(
            (u64::from(!has_waveform) << 63)
                | (u64::from(has_waveform) << 62)
                | (u64::from(self.flags_low_priority & 0xFFF) << 50)
                | (u64::from(self.flags_high_priority) << 42)
                | (u64::from(self.energy_short) << 26)
                | (u64::from(self.fine_timestamp & 0x3FF) << 16)
                | u64::from(self.energy),
        );

        if let Some(waveform) = &self.waveform {
            let samples = waveform.sample_words();
            words.push(waveform.header_word());
            words.push(samples.len() as u64);
            words.extend(samples);
        }
    }
}

/// Builder for one Event frame.
#[derive(Debug, Clone, Default)]
pub struct FrameBuilder {
    aggregate_counter: u32,
    board_fail: bool,
    hits: Vec<SynthHit>,
}

impl FrameBuilder {
    #[must_use]
    pub fn new(aggregate_counter: u32) -> Self {
        Self {
            aggregate_counter,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn board_fail(mut self, board_fail: bool) -> Self {
        self.board_fail = board_fail;
        self
    }

    #[must_use]
    pub fn hit(mut self, hit: SynthHit) -> Self {
        self.hits.push(hit);
        self
    }

    /// Append `count` random hits.
    #[must_use]
    pub fn random_hits<R: Rng + ?Sized>(mut self, rng: &mut R, count: usize) -> Self {
        self.hits.extend((0..count).map(|_| SynthHit::random(rng)));
        self
    }

    #[must_use]
    pub fn hits(&self) -> &[SynthHit] {
        &self.hits
    }

    /// Frame as host-order words, header first.
    #[must_use]
    pub fn host_words(&self) -> Vec<u64> {
        let mut words = vec![0];
        for hit in &self.hits {
            hit.push_words(&mut words);
        }
        words[0] = (0x2 << 60)
            | (u64::from(self.board_fail) << 56)
            | (u64::from(self.aggregate_counter & 0xFF_FFFF) << 32)
            | words.len() as u64;
        words
    }

    /// Frame in device byte order, as read from the instrument.
    #[must_use]
    pub fn build(&self) -> RawFrame {
        RawFrame::new(device_bytes(&self.host_words()), self.hits.len() as u32)
    }
}

/// Encode host-order words as big-endian device bytes.
#[must_use]
pub fn device_bytes(words: &[u64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * WORD_SIZE);
    for word in words {
        bytes.extend_from_slice(&word.to_be_bytes());
    }
    bytes
}

/// Run-start marker.
#[must_use]
pub fn start_marker() -> RawFrame {
    RawFrame::new(
        device_bytes(&[
            0x3000_0000_0000_0004,
            0x0200_0000_0000_0000,
            0x0100_0000_0000_0000,
            0x0100_0000_0000_0000,
        ]),
        0,
    )
}

/// Run-stop marker reporting `dead_time_ticks` x 8 ns of dead time.
#[must_use]
pub fn stop_marker(dead_time_ticks: u32) -> RawFrame {
    RawFrame::new(
        device_bytes(&[
            0x3200_0000_0000_0000,
            0x0000_0000_0000_0000,
            0x0100_0000_0000_0000 | u64::from(dead_time_ticks),
        ]),
        0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::EventDecoder;
    use crate::frame::{classify, stop_dead_time_ns, FrameKind};
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn markers_classify() {
        let start = start_marker().into_host_order().unwrap();
        assert_eq!(classify(&start), FrameKind::Start);

        let stop = stop_marker(125).into_host_order().unwrap();
        assert_eq!(classify(&stop), FrameKind::Stop);
        assert_eq!(stop_dead_time_ns(&stop), Some(1000));
    }

    #[test]
    fn header_counts_every_word() {
        let builder = FrameBuilder::new(7)
            .hit(SynthHit::new(1, 10))
            .hit(SynthHit::new(2, 20).waveform(SynthWaveform {
                points: vec![1, 2, 3],
                ..Default::default()
            }));
        let words = builder.host_words();

        // header + 2 + (2 + 2 + 2 sample words)
        assert_eq!(words.len(), 9);
        assert_eq!(words[0] & 0xFFFF_FFFF, 9);
        assert_eq!((words[0] >> 32) & 0xFF_FFFF, 7);
        assert_eq!(builder.build().hit_count_hint(), 2);
    }

    #[test]
    fn built_hit_decodes_back() {
        let hit = SynthHit::new(12, 5000)
            .energy(900)
            .energy_short(300)
            .fine_timestamp(256)
            .flags(0xC01, 0x81)
            .waveform(SynthWaveform {
                down_sample_code: 3,
                trigger_threshold: 77,
                digital_probe_types: [1, 2, 3, 4],
                analog_probe1: SynthProbe {
                    kind: 2,
                    signed: true,
                    multiplier_code: 2,
                },
                analog_probe2: SynthProbe::default(),
                points: vec![
                    SynthWaveform::point(0x3FFE, 9, [true, false, false, true]),
                    SynthWaveform::point(3, 0, [false, true, true, false]),
                ],
            });
        let frame = FrameBuilder::new(1)
            .hit(hit)
            .build()
            .into_host_order()
            .unwrap();

        let outcome = EventDecoder::new(2).decode(&frame, None);
        assert!(outcome.is_complete());
        assert!(outcome.warnings.is_empty());

        let e = &outcome.events[0];
        assert_eq!(e.channel, 12);
        assert_eq!(e.coarse_time_ns, 10_000);
        assert_eq!(e.energy, 900);
        assert_eq!(e.energy_short, 300);
        assert_eq!(e.fine_timestamp, 256);
        assert_eq!(e.flags_low_priority, 0xC01);
        assert_eq!(e.flags_high_priority, 0x81);
        assert_eq!(e.down_sample_factor, 8);
        assert_eq!(e.trigger_threshold, 77);
        assert_eq!(e.digital_probe4_type, 4);
        assert_eq!(e.analog_probe1_type, 2);
        assert_eq!(e.waveform.analog_probe1, vec![-16, 24]);
        assert_eq!(e.waveform.analog_probe2, vec![9, 0]);
        assert_eq!(e.waveform.digital_probe1, vec![1, 0]);
        assert_eq!(e.waveform.digital_probe4, vec![1, 0]);
    }

    #[test]
    fn random_frames_decode_cleanly() {
        let mut rng = StdRng::seed_from_u64(42);
        for counter in 1..20 {
            let frame = FrameBuilder::new(counter)
                .random_hits(&mut rng, 8)
                .build()
                .into_host_order()
                .unwrap();
            assert_eq!(classify(&frame), FrameKind::Event);

            let outcome = EventDecoder::new(1).decode(&frame, None);
            assert!(outcome.is_complete());
            assert!(outcome.warnings.is_empty());
            assert_eq!(outcome.events.len(), 8);
        }
    }
}
