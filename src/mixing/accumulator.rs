//! Mixing accumulator
//!
//! A reusable scratch buffer of wide accumulators that any number of sources
//! add into. Sources may be shorter than the buffer: the first source to reach
//! a slot initializes it, later ones add to it, and [`Accumulator::flush`]
//! zeroes whatever no source reached. The buffer is never pre-zeroed per pass.

use std::ops::AddAssign;

/// Fixed-capacity accumulation buffer
#[derive(Debug, Clone)]
pub struct Accumulator<T = i32> {
    data: Vec<T>,
    /// Leading slots holding accumulated data since the last reset
    valid: usize,
    /// Write cursor of the pass in progress
    position: usize,
}

impl<T> Accumulator<T>
where
    T: Copy + Default + AddAssign,
{
    /// Create an accumulator with `capacity` slots
    pub fn new(capacity: usize) -> Self {
        Accumulator {
            data: vec![T::default(); capacity],
            valid: 0,
            position: 0,
        }
    }

    /// Forget all accumulated data and rewind the write cursor
    pub fn reset(&mut self) {
        self.valid = 0;
        self.position = 0;
    }

    /// Rewind the write cursor for the next source, keeping accumulated data
    pub fn start_sequence(&mut self) {
        self.position = 0;
    }

    /// Accumulate a run of input samples starting at the write cursor
    ///
    /// Slots below the valid extent are added to; slots beyond it are
    /// initialized and extend it. Stops at capacity without pulling further
    /// input, so infinite (looping) inputs are fine.
    ///
    /// Returns the number of samples consumed.
    pub fn acc_data<I>(&mut self, input: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let capacity = self.data.len();
        let mut input = input.into_iter();
        let mut consumed = 0;

        while self.position < capacity {
            let Some(sample) = input.next() else {
                break;
            };
            if self.position < self.valid {
                self.data[self.position] += sample;
            } else {
                self.data[self.position] = sample;
                self.valid += 1;
            }
            self.position += 1;
            consumed += 1;
        }

        consumed
    }

    /// Zero every slot no source reached since the last reset
    pub fn flush(&mut self) {
        if self.valid < self.data.len() {
            self.data[self.valid..].fill(T::default());
        }
    }

    /// Change the capacity
    pub fn resize(&mut self, capacity: usize) {
        self.data.resize(capacity, T::default());
        self.valid = self.valid.min(capacity);
        self.position = self.position.min(capacity);
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a zero-capacity accumulator
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Leading slots holding accumulated data
    pub fn valid(&self) -> usize {
        self.valid
    }

    /// Current write cursor
    pub fn position(&self) -> usize {
        self.position
    }

    /// All slots, including any stale tail not yet flushed
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Iterate over all slots
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }
}
