//! Bounds-checked word cursor over a host-order frame.
//!
//! Every read the decoder performs goes through [`WordCursor`], so a corrupt length field
//! can only ever produce [`DecodeError::OutOfBounds`], never an out-of-range slice index.

use crate::error::{DecodeError, DecodeResult};
use crate::frame::WORD_SIZE;

/// Sequential reader of 64-bit host-order words.
#[derive(Debug, Clone)]
pub struct WordCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> WordCursor<'a> {
    /// Cursor over `data`, positioned at word `start`.
    ///
    /// Trailing bytes that do not form a whole word are never read.
    pub fn new(data: &'a [u8], start: usize) -> Self {
        Self {
            data,
            position: start,
        }
    }

    /// Number of whole words in the underlying buffer.
    #[inline]
    #[must_use]
    pub fn len_words(&self) -> usize {
        self.data.len() / WORD_SIZE
    }

    /// Index of the next word to be read.
    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Words left between the cursor and the end of the buffer.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.len_words().saturating_sub(self.position)
    }

    /// Read the word at an absolute index without moving the cursor.
    pub fn peek_at(&self, word: usize) -> DecodeResult<u64> {
        let start = word
            .checked_mul(WORD_SIZE)
            .ok_or(DecodeError::OutOfBounds {
                word,
                words: self.len_words(),
            })?;
        let bytes = start
            .checked_add(WORD_SIZE)
            .and_then(|end| self.data.get(start..end))
            .ok_or(DecodeError::OutOfBounds {
                word,
                words: self.len_words(),
            })?;

        let mut buf = [0u8; WORD_SIZE];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Read the next word and advance.
    pub fn next_word(&mut self) -> DecodeResult<u64> {
        let word = self.peek_at(self.position)?;
        self.position += 1;
        Ok(word)
    }

    /// Fail early if fewer than `count` words remain.
    ///
    /// Used before allocating waveform arrays so a bogus sample count cannot trigger a
    /// large allocation.
    pub fn require(&self, count: usize) -> DecodeResult<()> {
        if count > self.remaining() {
            return Err(DecodeError::OutOfBounds {
                word: self.position.saturating_add(count).saturating_sub(1),
                words: self.len_words(),
            });
        }
        Ok(())
    }
}
