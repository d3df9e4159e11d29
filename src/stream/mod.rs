//! Background-decoded audio streams
//!
//! A [`SoundStream`] plays long audio (music, ambience) without decoding it
//! all up front. A dedicated worker thread pulls encoded bytes from a
//! [`ByteSource`], runs them through a [`StreamDecoder`] and keeps a
//! [`FrameRing`] of render-block-sized frames topped up. The render callback
//! takes one frame per block; it never waits for the worker.
//!
//! # Lifecycle
//! - Created with a source: the worker starts immediately
//! - Created empty: silent until [`SoundStream::attach`] is called
//! - Source exhausted or decoder failure: the worker exits, buffered frames
//!   still play, then the mixer drops the stream
//! - [`SoundStream::stop`] (or drop): the worker is told to finish and joined

pub mod decoder;
pub mod ring;
mod worker;

pub use decoder::{DecoderFactory, PcmDecoder, PcmDecoderFactory, StreamDecoder};
pub use ring::{FrameRing, FrameWriter, FRAME_COUNT, SLACK_FRAMES};
pub use worker::FILL_BACKOFF;

use crate::clip::PcmFormat;
use crate::config::DeviceSpec;
use crate::manager::SoundManager;
use crate::resource::{open_error, ByteSource, ResourceProvider};
use crate::{Result, SoundError};
use parking_lot::Mutex;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use worker::{Worker, WorkerControl};

/// Longest time [`SoundStream::attach`] waits for the first decoded frame
pub const PREROLL: Duration = Duration::from_millis(200);

/// Long audio decoded incrementally on a worker thread
pub struct SoundStream {
    spec: DeviceSpec,
    ring: Arc<FrameRing>,
    control: Arc<WorkerControl>,
    /// Present until a source is attached
    writer: Mutex<Option<FrameWriter>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SoundStream {
    /// Stream without a source
    ///
    /// Yields no frames, so the mixer drops it if played before a source
    /// is attached.
    pub fn empty(spec: DeviceSpec) -> Arc<Self> {
        let (ring, writer) = FrameRing::new(spec.frame_bytes());
        Arc::new(SoundStream {
            spec,
            ring,
            control: Arc::new(WorkerControl::new(true)),
            writer: Mutex::new(Some(writer)),
            worker: Mutex::new(None),
        })
    }

    /// Stream a named resource
    ///
    /// # Errors
    /// [`SoundError::ResourceNotFound`] if `name` cannot be opened
    pub fn from_resource<R>(
        spec: DeviceSpec,
        resources: &R,
        name: &str,
        decoders: Arc<dyn DecoderFactory>,
    ) -> Result<Arc<Self>>
    where
        R: ResourceProvider + ?Sized,
    {
        let source = resources.open(name)?;
        debug!(name, "streaming resource");
        Self::from_source(spec, source, decoders)
    }

    /// Stream a loose file
    pub fn from_file<P: AsRef<Path>>(
        spec: DeviceSpec,
        path: P,
        decoders: Arc<dyn DecoderFactory>,
    ) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let file =
            File::open(path).map_err(|e| open_error(&path.display().to_string(), e))?;
        Self::from_source(spec, Box::new(file), decoders)
    }

    /// Stream an already-open byte source
    pub fn from_source(
        spec: DeviceSpec,
        source: Box<dyn ByteSource>,
        decoders: Arc<dyn DecoderFactory>,
    ) -> Result<Arc<Self>> {
        let stream = Self::empty(spec);
        stream.attach(source, decoders)?;
        Ok(stream)
    }

    /// Give an empty stream its source and start decoding
    ///
    /// Waits up to [`PREROLL`] for the first frame so that a stream played
    /// right away has audio for the next render block.
    ///
    /// # Errors
    /// [`SoundError::Other`] if a source was already attached
    pub fn attach(&self, source: Box<dyn ByteSource>, decoders: Arc<dyn DecoderFactory>) -> Result<()> {
        let writer = self
            .writer
            .lock()
            .take()
            .ok_or_else(|| SoundError::from("stream already has a source"))?;

        // held until the handle is stored so a concurrent stop() waits for it
        let mut slot = self.worker.lock();
        self.control.thread_done.store(false, Ordering::Release);
        let worker = Worker {
            writer,
            source,
            decoders,
            control: Arc::clone(&self.control),
            device: self.spec.pcm_format(),
        };

        let spawned = thread::Builder::new()
            .name("soundmix-decode".into())
            .spawn(move || worker.run());
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.control.finished.store(true, Ordering::Release);
                self.control.thread_done.store(true, Ordering::Release);
                return Err(SoundError::Io(err));
            }
        };
        *slot = Some(handle);
        drop(slot);
        debug!(frame_bytes = self.ring.frame_size(), "decode worker started");

        if !self.wait_ready(PREROLL) && !self.is_thread_done() {
            debug!("no frame decoded during pre-roll");
        }
        Ok(())
    }

    /// Hand the stream to `manager` for mixing
    pub fn play(self: &Arc<Self>, manager: &SoundManager) {
        manager.play_stream(Arc::clone(self));
    }

    /// Stop decoding and wait for the worker to exit
    ///
    /// Returns once the worker is gone. Safe to call repeatedly. Has no
    /// timeout: a source that blocks forever blocks this call too.
    pub fn stop(&self) {
        self.control.finished.store(true, Ordering::Release);
        // concurrent callers queue here until the first one has joined
        let mut slot = self.worker.lock();
        if let Some(handle) = slot.take() {
            if handle.join().is_err() {
                warn!("decode worker panicked");
            }
        }
        // the worker's guard has set this already unless it never ran
        self.control.thread_done.store(true, Ordering::Release);
    }

    /// Wait until a frame is buffered or the worker has exited
    ///
    /// Returns true when at least one frame is ready.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.frames_available() == 0 && !self.is_thread_done() {
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        self.frames_available() > 0
    }

    /// Take the next frame for the mixer
    pub fn get_frame(&self, out: &mut [u8]) -> bool {
        self.ring.get_frame(out)
    }

    /// Whole frames ready for the mixer
    pub fn frames_available(&self) -> usize {
        self.ring.frames_available()
    }

    /// Frames the worker may still decode ahead
    pub fn frames_to_fill(&self) -> usize {
        self.ring.frames_to_fill()
    }

    /// True once the worker was asked to stop or gave up
    pub fn is_finished(&self) -> bool {
        self.control.is_finished()
    }

    /// True once the worker has exited (or never started)
    pub fn is_thread_done(&self) -> bool {
        self.control.thread_done.load(Ordering::Acquire)
    }

    /// Worker gone and nothing left to play
    pub fn is_drained(&self) -> bool {
        self.is_thread_done() && self.frames_available() == 0
    }

    /// Native format reported by the decoder, once it exists
    pub fn decoder_format(&self) -> Option<PcmFormat> {
        self.control.format.get().copied()
    }

    /// Device format the stream was built for
    pub fn spec(&self) -> DeviceSpec {
        self.spec
    }

    /// True when both handles drive the same decode pipeline
    pub fn same_pipeline(&self, other: &SoundStream) -> bool {
        Arc::ptr_eq(&self.ring, &other.ring)
    }
}

impl std::fmt::Debug for SoundStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundStream")
            .field("ring", &self.ring)
            .field("finished", &self.is_finished())
            .field("thread_done", &self.is_thread_done())
            .finish()
    }
}

impl Drop for SoundStream {
    fn drop(&mut self) {
        self.stop();
    }
}
