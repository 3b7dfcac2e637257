//! Hand-off structures between the caller and the decode workers.
//!
//! - [`IngestionQueue`]: FIFO of host-order Event frames. Frames are moved in by the
//!   caller and moved out by exactly one worker.
//! - [`OutputCollection`]: decoded events appended by workers and drained in one swap by
//!   the caller.
//!
//! Each structure has its own lock and every critical section is a push, a pop or a
//! `Vec` swap; no decoding happens while a lock is held.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

use crate::event::Event;
use crate::frame::HostFrame;

/// FIFO of frames waiting for a decode worker.
#[derive(Debug, Default)]
pub struct IngestionQueue {
    frames: Mutex<VecDeque<HostFrame>>,
    available: Condvar,
}

impl IngestionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a frame onto the back of the queue and wake one worker.
    pub fn push(&self, frame: HostFrame) {
        self.frames.lock().push_back(frame);
        self.available.notify_one();
    }

    /// Take the oldest frame without waiting.
    pub fn try_pop(&self) -> Option<HostFrame> {
        self.frames.lock().pop_front()
    }

    /// Take the oldest frame, waiting at most `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout so the caller can check its stop flag and retry.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<HostFrame> {
        let mut frames = self.frames.lock();
        if frames.is_empty() {
            // Spurious wake-ups just fall through to the pop below
            let _ = self.available.wait_for(&mut frames, timeout);
        }
        frames.pop_front()
    }

    /// Wake every waiting worker, e.g. on shutdown.
    pub fn wake_all(&self) {
        self.available.notify_all();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Remove every queued frame, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut frames = self.frames.lock();
        let dropped = frames.len();
        frames.clear();
        dropped
    }
}

/// Decoded events waiting to be collected by the caller.
#[derive(Debug, Default)]
pub struct OutputCollection {
    events: Mutex<Vec<Event>>,
}

impl OutputCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append all events decoded from one frame.
    pub fn append(&self, mut events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        self.events.lock().append(&mut events);
    }

    /// Take everything collected so far, leaving the collection empty.
    pub fn drain_all(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}
