//! Decode worker pool.
//!
//! N OS threads drain the [`IngestionQueue`], decode one frame at a time and append the
//! results to the [`OutputCollection`]. Workers wait on the queue's condition variable with
//! a short timeout, so the stop flag is seen within a few milliseconds of shutdown and
//! never in the middle of a frame.
//!
//! # Ordering
//!
//! With one worker, frames are decoded in submission order and the worker owns a
//! [`ContinuityTracker`] that checks the aggregate counter. With more than one worker the
//! order in which frames finish, and therefore the order of events in the output, is
//! unspecified, and the continuity check is switched off
//! ([`DecodeWorkerPool::continuity_check_enabled`] returns `false`).

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::decoder::{ContinuityTracker, EventDecoder};
use crate::error::{DecodeError, DecodeResult};
use crate::queue::{IngestionQueue, OutputCollection};
use crate::stats::DecodeStats;

/// Longest a worker waits on an empty queue before re-checking the stop flag.
const IDLE_WAIT: Duration = Duration::from_millis(5);

/// State shared between the caller-facing engine and the workers.
#[derive(Debug)]
pub struct PipelineState {
    pub queue: IngestionQueue,
    pub output: OutputCollection,
    pub stats: DecodeStats,
    time_step: AtomicU32,
    dump: AtomicBool,
    /// Frames queued or being decoded
    in_flight: AtomicUsize,
    idle_lock: Mutex<()>,
    idle: Condvar,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            queue: IngestionQueue::new(),
            output: OutputCollection::new(),
            stats: DecodeStats::new(),
            time_step: AtomicU32::new(1),
            dump: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
        }
    }
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time_step(&self, time_step: u32) {
        self.time_step.store(time_step, Ordering::Release);
    }

    #[must_use]
    pub fn time_step(&self) -> u32 {
        self.time_step.load(Ordering::Acquire)
    }

    pub fn set_dump(&self, dump: bool) {
        self.dump.store(dump, Ordering::Release);
    }

    #[must_use]
    pub fn dump(&self) -> bool {
        self.dump.load(Ordering::Acquire)
    }

    /// Decoder built from the current settings.
    #[must_use]
    pub fn decoder(&self) -> EventDecoder {
        EventDecoder::new(self.time_step()).with_dump(self.dump())
    }

    /// Count a frame as in flight, then queue it.
    pub fn enqueue(&self, frame: crate::frame::HostFrame) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.queue.push(frame);
    }

    /// Frames queued or currently being decoded.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Block until no frame is queued or being decoded, or `timeout` elapses.
    ///
    /// Returns `true` if the pipeline went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.idle_lock.lock();
        while self.in_flight() > 0 {
            match deadline {
                Some(deadline) => {
                    if self.idle.wait_until(&mut guard, deadline).timed_out() {
                        return self.in_flight() == 0;
                    }
                }
                None => self.idle.wait(&mut guard),
            }
        }
        true
    }

    fn finish(&self, frames: usize) {
        if self.in_flight.fetch_sub(frames, Ordering::AcqRel) == frames {
            // Taking the lock orders this wake-up after a waiter's check
            let _guard = self.idle_lock.lock();
            self.idle.notify_all();
        }
    }
}

/// Fixed-size set of decode threads.
pub struct DecodeWorkerPool {
    state: Arc<PipelineState>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    worker_count: usize,
    continuity: bool,
}

impl DecodeWorkerPool {
    /// Start `workers` decode threads. Zero is treated as one.
    pub fn spawn(workers: usize, state: Arc<PipelineState>) -> DecodeResult<Self> {
        let count = if workers == 0 {
            warn!("Decode worker count 0 requested, using 1");
            1
        } else {
            workers
        };
        let continuity = count == 1;
        let stop = Arc::new(AtomicBool::new(false));

        let mut pool = Self {
            state,
            stop,
            workers: Vec::with_capacity(count),
            worker_count: count,
            continuity,
        };

        for id in 0..count {
            let state = Arc::clone(&pool.state);
            let stop = Arc::clone(&pool.stop);
            let tracker = continuity.then(ContinuityTracker::new);

            let handle = thread::Builder::new()
                .name(format!("psd2-decode-{id}"))
                .spawn(move || run_worker(id, &state, &stop, tracker))
                .map_err(DecodeError::WorkerSpawn)?;
            pool.workers.push(handle);
        }

        info!(workers = count, continuity, "Decode worker pool started");
        Ok(pool)
    }

    /// Number of workers the pool was started with, also after shutdown.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Whether aggregate-counter gaps are being checked (single worker only).
    #[must_use]
    pub fn continuity_check_enabled(&self) -> bool {
        self.continuity
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::Acquire)
    }

    /// Stop and join every worker. Returns how many queued frames were discarded.
    ///
    /// A frame a worker has already popped is always decoded to completion first.
    /// Calling this more than once is a no-op.
    pub fn shutdown(&mut self) -> usize {
        if self.stop.swap(true, Ordering::AcqRel) {
            return 0;
        }
        self.state.queue.wake_all();

        for handle in self.workers.drain(..) {
            let name = handle.thread().name().map(str::to_owned);
            if handle.join().is_err() {
                error!(worker = ?name, "Decode worker panicked");
            }
        }

        let discarded = self.state.queue.clear();
        if discarded > 0 {
            self.state.finish(discarded);
            self.state.stats.record_discarded(discarded);
            warn!(discarded, "Discarded queued frames on shutdown");
        }
        info!("Decode worker pool stopped");
        discarded
    }
}

impl Drop for DecodeWorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    id: usize,
    state: &PipelineState,
    stop: &AtomicBool,
    mut tracker: Option<ContinuityTracker>,
) {
    debug!(worker = id, "Decode worker running");

    while !stop.load(Ordering::Acquire) {
        let Some(frame) = state.queue.pop_timeout(IDLE_WAIT) else {
            continue;
        };

        let outcome = state.decoder().decode(&frame, tracker.as_mut());
        drop(frame);

        state.stats.record_outcome(&outcome);
        state.output.append(outcome.events);
        state.finish(1);
    }

    debug!(worker = id, "Decode worker exiting");
}
