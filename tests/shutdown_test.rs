//! Engine shutdown behaviour.

use daq_psd2::synth::{FrameBuilder, SynthHit};
use daq_psd2::{DecodeEngine, DecodeError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn shutdown_completes_quickly_when_idle() {
    let engine = DecodeEngine::new(4).unwrap();

    let start = Instant::now();
    assert_eq!(engine.shutdown(), 0);
    assert!(start.elapsed() < Duration::from_secs(2));
    // Fixed at construction, not the number of live threads
    assert_eq!(engine.worker_count(), 4);
}

#[test]
fn decoded_events_survive_shutdown() {
    let engine = DecodeEngine::new(2).unwrap();
    for counter in 1..=10 {
        engine
            .add_data(FrameBuilder::new(counter).hit(SynthHit::new(1, 1)).build())
            .unwrap();
    }
    assert!(engine.wait_idle(Duration::from_secs(10)));
    engine.shutdown();

    assert_eq!(engine.get_data().len(), 10);
}

#[test]
fn every_frame_is_decoded_or_discarded() {
    let engine = DecodeEngine::new(2).unwrap();
    let frames = 500u64;
    for counter in 1..=frames {
        engine
            .add_data(
                FrameBuilder::new(counter as u32)
                    .hit(SynthHit::new(0, counter))
                    .build(),
            )
            .unwrap();
    }

    let discarded = engine.shutdown() as u64;
    let stats = engine.stats();

    assert_eq!(stats.frames_queued, frames);
    assert_eq!(stats.frames_decoded + discarded, frames);
    assert_eq!(stats.frames_discarded, discarded);
    assert_eq!(engine.get_data().len() as u64, stats.frames_decoded);
    assert_eq!(engine.pending(), 0);
}

#[test]
fn add_data_after_shutdown_fails() {
    let engine = DecodeEngine::new(1).unwrap();
    engine.shutdown();

    let err = engine
        .add_data(FrameBuilder::new(1).hit(SynthHit::new(0, 0)).build())
        .unwrap_err();
    assert!(matches!(err, DecodeError::EngineStopped));
    assert!(!err.is_format_error());
}

#[test]
fn shared_engine_feeds_and_drains_concurrently() {
    let engine = Arc::new(DecodeEngine::new(3).unwrap());

    let producer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for counter in 1..=300 {
                engine
                    .add_data(FrameBuilder::new(counter).hit(SynthHit::new(2, 5)).build())
                    .unwrap();
            }
        })
    };

    let mut collected = 0;
    let deadline = Instant::now() + Duration::from_secs(10);
    while collected < 300 && Instant::now() < deadline {
        collected += engine.get_data().len();
        thread::sleep(Duration::from_millis(1));
    }
    producer.join().unwrap();

    assert_eq!(collected, 300);
}
