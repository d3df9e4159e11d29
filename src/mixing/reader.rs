//! Sample cursor over a raw buffer
//!
//! Reads a sample array either once (stopping at its end) or in a loop
//! (wrapping back to the start), tracking the position for the next pass.

use std::fmt;

/// Read cursor over a sample slice with optional looping
#[derive(Clone, Copy)]
pub struct BufferReader<'a, T> {
    buffer: &'a [T],
    position: usize,
    looping: bool,
}

impl<'a, T: Copy> BufferReader<'a, T> {
    /// Create a reader at `position`
    ///
    /// Positions past the end are wrapped when looping and clamped otherwise.
    pub fn new(buffer: &'a [T], position: usize, looping: bool) -> Self {
        let mut reader = BufferReader {
            buffer,
            position: 0,
            looping,
        };
        reader.advance(position);
        reader
    }

    /// Logical length of the underlying buffer
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when the underlying buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Current position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Whether the reader wraps at the end
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// True once a non-looping reader reached the end
    pub fn is_exhausted(&self) -> bool {
        !self.wraps() && self.position >= self.buffer.len()
    }

    /// Reader at the start of the same buffer
    pub fn begin(&self) -> Self {
        BufferReader {
            position: 0,
            ..*self
        }
    }

    /// Move forward by `n` samples
    pub fn advance(&mut self, n: usize) {
        let len = self.buffer.len();
        if self.wraps() {
            self.position = (self.position + n) % len;
        } else {
            self.position = (self.position + n).min(len);
        }
    }

    /// Copy up to `n` samples into `output`, advancing the cursor
    ///
    /// A non-looping reader copies `min(len - position, n)`; a short copy
    /// means the source is exhausted. A looping reader always copies `n`,
    /// wrapping as needed. `n` is limited to `output.len()`.
    ///
    /// Returns the number of samples copied.
    pub fn copy(&mut self, output: &mut [T], n: usize) -> usize {
        let n = n.min(output.len());
        if !self.wraps() {
            let actual = n.min(self.buffer.len() - self.position);
            output[..actual].copy_from_slice(&self.buffer[self.position..self.position + actual]);
            self.position += actual;
            return actual;
        }

        let mut copied = 0;
        while copied < n {
            let run = (n - copied).min(self.buffer.len() - self.position);
            output[copied..copied + run]
                .copy_from_slice(&self.buffer[self.position..self.position + run]);
            copied += run;
            self.advance(run);
        }
        n
    }

    /// Looping only makes progress over a non-empty buffer
    fn wraps(&self) -> bool {
        self.looping && !self.buffer.is_empty()
    }
}

impl<T: Copy> Iterator for BufferReader<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.is_exhausted() || self.buffer.is_empty() {
            return None;
        }
        let sample = self.buffer[self.position];
        self.advance(1);
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.wraps() {
            (usize::MAX, None)
        } else {
            let remaining = self.buffer.len() - self.position;
            (remaining, Some(remaining))
        }
    }
}

/// Readers are equal when they read the same buffer (by identity) at the same
/// position with the same loop mode.
impl<T> PartialEq for BufferReader<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.buffer.as_ptr(), other.buffer.as_ptr())
            && self.buffer.len() == other.buffer.len()
            && self.position == other.position
            && self.looping == other.looping
    }
}

impl<T> Eq for BufferReader<'_, T> {}

impl<T> fmt::Debug for BufferReader<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferReader")
            .field("len", &self.buffer.len())
            .field("position", &self.position)
            .field("looping", &self.looping)
            .finish()
    }
}
