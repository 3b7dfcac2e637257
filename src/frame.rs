//! Raw readout frames and their classification.
//!
//! The digitizer's RAW endpoint delivers buffers of 64-bit big-endian words. A buffer is
//! one of three things:
//!
//! ```text
//! Start marker  (4 words)  w0[60:63]=0x3 w0[56:59]=0x0  w1[56:63]=0x2  w2[56:63]=0x1  w3[56:63]=0x1
//! Stop marker   (3 words)  w0[60:63]=0x3 w0[56:59]=0x2  w1[56:63]=0x0  w2[56:63]=0x1
//! Event frame   (>=3 words, anything else)
//! ```
//!
//! A [`RawFrame`] is the buffer exactly as read from the instrument. It is consumed by
//! [`RawFrame::into_host_order`], which swaps every word in place once and freezes the
//! result into an immutable [`HostFrame`]. From then on the frame only ever moves: into the
//! ingestion queue, then into exactly one decode worker.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cursor::WordCursor;
use crate::error::{DecodeError, DecodeResult};

/// Size of one readout word in bytes.
pub const WORD_SIZE: usize = 8;

const SIGNAL_TYPE_SHIFT: u32 = 60;
const SIGNAL_SUBTYPE_SHIFT: u32 = 56;
const NIBBLE_MASK: u64 = 0xF;
const HIGH_BYTE_SHIFT: u32 = 56;
const HIGH_BYTE_MASK: u64 = 0xFF;

const SIGNAL_TYPE: u64 = 0x3;
const START_SUBTYPE: u64 = 0x0;
const STOP_SUBTYPE: u64 = 0x2;

const START_WORDS: usize = 4;
const STOP_WORDS: usize = 3;
const MIN_WORDS: usize = 3;

/// Dead-time counter in the Stop marker ticks at 8 ns.
const DEAD_TIME_TICK_NS: u64 = 8;

/// What kind of buffer the instrument delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    /// Run-start marker
    Start,
    /// Run-stop marker
    Stop,
    /// One or more packed hits
    Event,
    /// Too short to be anything the firmware emits
    Unknown,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FrameKind::Start => "start",
            FrameKind::Stop => "stop",
            FrameKind::Event => "event",
            FrameKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// A readout buffer in device (big-endian) word order.
#[derive(Debug, Clone)]
pub struct RawFrame {
    data: Vec<u8>,
    size: usize,
    hit_count_hint: u32,
}

impl RawFrame {
    /// Wrap a buffer whose whole length is frame data.
    pub fn new(data: Vec<u8>, hit_count_hint: u32) -> Self {
        let size = data.len();
        Self {
            data,
            size,
            hit_count_hint,
        }
    }

    /// Wrap a reusable read buffer of which only the first `size` bytes were filled.
    pub fn with_size(data: Vec<u8>, size: usize, hit_count_hint: u32) -> Self {
        Self {
            data,
            size,
            hit_count_hint,
        }
    }

    /// Declared size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of hits the instrument reported for this buffer.
    #[must_use]
    pub fn hit_count_hint(&self) -> u32 {
        self.hit_count_hint
    }

    /// Check alignment, then swap every word to host order.
    ///
    /// Bytes past the declared size are dropped. Nothing is read if the size check fails.
    pub fn into_host_order(self) -> DecodeResult<HostFrame> {
        let Self {
            mut data,
            size,
            hit_count_hint,
        } = self;

        if size % WORD_SIZE != 0 {
            return Err(DecodeError::Misaligned { size });
        }
        if size > data.len() {
            return Err(DecodeError::SizeExceedsBuffer {
                size,
                capacity: data.len(),
            });
        }

        data.truncate(size);
        // Device words are big-endian
        for word in data.chunks_exact_mut(WORD_SIZE) {
            word.reverse();
        }

        Ok(HostFrame {
            data: Bytes::from(data),
            hit_count_hint,
        })
    }
}

/// A frame whose words are in host (little-endian) order. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFrame {
    data: Bytes,
    hit_count_hint: u32,
}

impl HostFrame {
    /// Build directly from host-order words. Mostly useful in tests.
    pub fn from_words(words: &[u64], hit_count_hint: u32) -> Self {
        let data: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        Self {
            data: Bytes::from(data),
            hit_count_hint,
        }
    }

    /// Frame bytes in host word order.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Size in words.
    #[must_use]
    pub fn len_words(&self) -> usize {
        self.data.len() / WORD_SIZE
    }

    #[must_use]
    pub fn hit_count_hint(&self) -> u32 {
        self.hit_count_hint
    }

    /// Bounds-checked reader starting at word `start`.
    #[must_use]
    pub fn cursor(&self, start: usize) -> WordCursor<'_> {
        WordCursor::new(&self.data, start)
    }

    /// Word at `index`, or `None` past the end.
    #[must_use]
    pub fn word(&self, index: usize) -> Option<u64> {
        self.cursor(0).peek_at(index).ok()
    }
}

#[inline]
fn high_byte(word: u64) -> u64 {
    (word >> HIGH_BYTE_SHIFT) & HIGH_BYTE_MASK
}

#[inline]
fn signal_type(word: u64) -> (u64, u64) {
    (
        (word >> SIGNAL_TYPE_SHIFT) & NIBBLE_MASK,
        (word >> SIGNAL_SUBTYPE_SHIFT) & NIBBLE_MASK,
    )
}

fn is_stop(frame: &HostFrame) -> bool {
    match (frame.word(0), frame.word(1), frame.word(2)) {
        (Some(w0), Some(w1), Some(w2)) => {
            signal_type(w0) == (SIGNAL_TYPE, STOP_SUBTYPE) && high_byte(w1) == 0x0 && high_byte(w2) == 0x1
        }
        _ => false,
    }
}

fn is_start(frame: &HostFrame) -> bool {
    match (frame.word(0), frame.word(1), frame.word(2), frame.word(3)) {
        (Some(w0), Some(w1), Some(w2), Some(w3)) => {
            signal_type(w0) == (SIGNAL_TYPE, START_SUBTYPE)
                && high_byte(w1) == 0x2
                && high_byte(w2) == 0x1
                && high_byte(w3) == 0x1
        }
        _ => false,
    }
}

/// Classify a host-order frame by its size and leading words.
#[must_use]
pub fn classify(frame: &HostFrame) -> FrameKind {
    match frame.len_words() {
        n if n < MIN_WORDS => FrameKind::Unknown,
        STOP_WORDS if is_stop(frame) => FrameKind::Stop,
        START_WORDS if is_start(frame) => FrameKind::Start,
        _ => FrameKind::Event,
    }
}

/// Dead time reported by a Stop marker, in nanoseconds.
///
/// Returns `None` for anything that is not a Stop marker.
#[must_use]
pub fn stop_dead_time_ns(frame: &HostFrame) -> Option<u64> {
    if classify(frame) != FrameKind::Stop {
        return None;
    }
    frame
        .word(2)
        .map(|w| (w & 0xFFFF_FFFF) * DEAD_TIME_TICK_NS)
}
