//! Fuzz target for single-frame decoding.
//!
//! Tests:
//! - Arbitrary buffer sizes and contents through the byte-order conversion
//! - Classification of whatever survives
//! - Event decoding never panics and never reports more hits than words allow

#![no_main]

use arbitrary::Arbitrary;
use daq_psd2::decoder::{ContinuityTracker, EventDecoder};
use daq_psd2::frame::{classify, FrameKind, RawFrame};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FrameInput {
    data: Vec<u8>,
    /// Declared size, may disagree with the buffer length
    declared: Option<u16>,
    time_step: u8,
    dump: bool,
}

fuzz_target!(|input: FrameInput| {
    let size = input
        .declared
        .map_or(input.data.len(), usize::from);
    let raw = RawFrame::with_size(input.data, size, 0);

    let Ok(frame) = raw.into_host_order() else {
        return;
    };
    if classify(&frame) != FrameKind::Event {
        return;
    }

    let decoder = EventDecoder::new(u32::from(input.time_step).max(1)).with_dump(input.dump);
    let mut tracker = ContinuityTracker::new();
    let outcome = decoder.decode(&frame, Some(&mut tracker));

    // Every hit takes at least two words after the header
    assert!(outcome.events.len() * 2 < frame.len_words().max(1));
    for event in &outcome.events {
        assert!(event.channel < 128);
        assert_eq!(event.waveform.analog_probe1.len(), event.waveform.digital_probe4.len());
    }
});
