//! Frame ring between a decode worker and the render callback
//!
//! A [`HeapRb`] byte ring of [`FRAME_COUNT`] frames, split once into its
//! producer (owned by the [`FrameWriter`] on the worker thread) and its
//! consumer (used only by [`FrameRing::get_frame`] on the render thread).
//! Fill levels are read from the shared ring without touching either side.
//! The writer stops filling while only [`SLACK_FRAMES`] frames of space
//! remain.

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;

/// Frames of look-ahead held by each stream
pub const FRAME_COUNT: usize = 32;

/// Free frames at or below which the writer backs off
pub const SLACK_FRAMES: usize = 2;

/// Frame ring shared by one writer and the mixer
pub struct FrameRing {
    shared: Arc<HeapRb<u8>>,
    /// Only the render callback pops, so this lock is never contended
    reader: Mutex<HeapCons<u8>>,
    frame_size: usize,
    capacity: usize,
}

impl FrameRing {
    /// Create a ring of `frame_size`-byte frames and its single writer
    pub fn new(frame_size: usize) -> (Arc<FrameRing>, FrameWriter) {
        let frame_size = frame_size.max(1);
        let capacity = frame_size * FRAME_COUNT;
        let shared = Arc::new(HeapRb::<u8>::new(capacity));
        let (producer, consumer) = Arc::clone(&shared).split();

        let ring = Arc::new(FrameRing {
            shared,
            reader: Mutex::new(consumer),
            frame_size,
            capacity,
        });
        let writer = FrameWriter {
            producer,
            ring: Arc::clone(&ring),
        };
        (ring, writer)
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frame size in bytes
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Bytes decoded but not yet consumed
    pub fn used_bytes(&self) -> usize {
        self.shared.occupied_len()
    }

    /// Whole frames ready for the mixer
    pub fn frames_available(&self) -> usize {
        self.used_bytes() / self.frame_size
    }

    /// Frames the writer may still fill, keeping one frame between the cursors
    pub fn frames_to_fill(&self) -> usize {
        (FRAME_COUNT - 1).saturating_sub(self.frames_available())
    }

    /// Pop the next `out.len()` bytes
    ///
    /// Returns false, consuming nothing, unless at least one whole frame and
    /// at least `out.len()` bytes are buffered.
    pub fn get_frame(&self, out: &mut [u8]) -> bool {
        let mut reader = self.reader.lock();
        let used = self.shared.occupied_len();
        if used < self.frame_size || used < out.len() {
            return false;
        }
        reader.pop_slice(out) == out.len()
    }
}

impl std::fmt::Debug for FrameRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRing")
            .field("capacity", &self.capacity)
            .field("frame_size", &self.frame_size)
            .field("used", &self.used_bytes())
            .finish()
    }
}

/// The only handle allowed to push into a ring
pub struct FrameWriter {
    producer: HeapProd<u8>,
    ring: Arc<FrameRing>,
}

impl FrameWriter {
    /// The ring being written
    pub fn ring(&self) -> &FrameRing {
        &self.ring
    }

    /// True when the writer should back off
    pub fn is_full(&self) -> bool {
        self.ring.frames_to_fill() <= SLACK_FRAMES
    }

    /// Bytes that may be pushed now
    ///
    /// At most `max` and never more than one frame; never reaches into the
    /// last [`SLACK_FRAMES`] frames of free space.
    pub fn room(&self, max: usize) -> usize {
        let frame = self.ring.frame_size;
        max.min(frame)
            .min(self.ring.shared.vacant_len().saturating_sub(SLACK_FRAMES * frame))
    }

    /// Publish decoded bytes to the reader, returning how many fit
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        self.producer.push_slice(bytes)
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter").field("ring", &self.ring).finish()
    }
}
