//! Mixing primitives
//!
//! [`Accumulator`] sums any number of sources of different lengths into one
//! wide scratch buffer; [`BufferReader`] walks a clip's samples once or in a
//! loop. [`clamp_sample`] saturates an accumulated value to 16 bits.

pub mod accumulator;
pub mod reader;

pub use accumulator::Accumulator;
pub use reader::BufferReader;

/// Saturate a wide accumulated sample to the signed 16-bit range
#[inline]
pub fn clamp_sample(sample: i32) -> i16 {
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
