//! Fuzz target for the threaded engine.
//!
//! Tests:
//! - Sequences of arbitrary buffers fed through `add_data`
//! - Worker pool survives malformed frames
//! - Every accepted Event frame is decoded before the engine goes idle

#![no_main]

use arbitrary::Arbitrary;
use daq_psd2::{DecodeEngine, FrameKind, RawFrame};
use libfuzzer_sys::fuzz_target;
use std::time::Duration;

#[derive(Debug, Arbitrary)]
struct StreamInput {
    workers: u8,
    frames: Vec<Vec<u8>>,
}

fuzz_target!(|input: StreamInput| {
    let Ok(engine) = DecodeEngine::new(usize::from(input.workers % 4) + 1) else {
        return;
    };

    let mut accepted = 0u64;
    for data in input.frames.into_iter().take(64) {
        if let Ok(FrameKind::Event) = engine.add_data(RawFrame::new(data, 0)) {
            accepted += 1;
        }
    }

    assert!(engine.wait_idle(Duration::from_secs(10)));
    let stats = engine.stats();
    assert_eq!(stats.frames_queued, accepted);
    assert_eq!(stats.frames_decoded, accepted);
    let _ = engine.get_data();
});
