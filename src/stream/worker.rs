//! Background decode worker
//!
//! One worker thread per stream keeps the stream's frame ring topped up:
//! drain whatever the decoder already holds, feed it more source bytes when
//! it runs dry, and back off while the ring is nearly full.

use super::decoder::{DecoderFactory, StreamDecoder};
use super::ring::FrameWriter;
use crate::clip::PcmFormat;
use crate::resource::ByteSource;
use crate::Result;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Sleep between fill attempts while the ring is full
pub const FILL_BACKOFF: Duration = Duration::from_millis(10);

/// Flags shared between a stream handle and its worker
#[derive(Debug)]
pub(crate) struct WorkerControl {
    /// Set to ask the worker to stop, or by the worker when it gives up
    pub finished: AtomicBool,
    /// Set by the worker right before it exits
    pub thread_done: AtomicBool,
    /// Native decoder output, known once the decoder exists
    pub format: OnceLock<PcmFormat>,
}

impl WorkerControl {
    pub fn new(thread_done: bool) -> Self {
        WorkerControl {
            finished: AtomicBool::new(false),
            thread_done: AtomicBool::new(thread_done),
            format: OnceLock::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Why the decode loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Stopped,
    EndOfSource,
}

/// Marks the worker done however it leaves, including by panic
struct DoneGuard(Arc<WorkerControl>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.finished.store(true, Ordering::Release);
        self.0.thread_done.store(true, Ordering::Release);
    }
}

/// Everything a worker owns
pub(crate) struct Worker {
    pub writer: FrameWriter,
    pub source: Box<dyn ByteSource>,
    pub decoders: Arc<dyn DecoderFactory>,
    pub control: Arc<WorkerControl>,
    /// Format the device expects
    pub device: PcmFormat,
}

impl Worker {
    /// Worker thread body
    pub fn run(self) {
        let Worker {
            mut writer,
            mut source,
            decoders,
            control,
            device,
        } = self;
        let _done = DoneGuard(Arc::clone(&control));

        let mut decoder = match decoders.create() {
            Ok(decoder) => decoder,
            Err(err) => {
                warn!(error = %err, "could not create decoder, stream stays silent");
                return;
            }
        };

        let format = decoder.format();
        let _ = control.format.set(format);
        if format != device {
            warn!(decoder = %format, device = %device, "stream format differs from device format");
        }

        match decode_loop(&mut writer, source.as_mut(), decoder.as_mut(), &control) {
            Ok(Exit::Stopped) => debug!("decode worker stopped"),
            Ok(Exit::EndOfSource) => debug!("decode worker reached end of source"),
            Err(err) => warn!(error = %err, "decode failed, ending stream"),
        }
    }
}

/// Fill the ring one frame at a time until stopped or out of input
fn decode_loop(
    writer: &mut FrameWriter,
    source: &mut dyn ByteSource,
    decoder: &mut dyn StreamDecoder,
    control: &WorkerControl,
) -> Result<Exit> {
    let frame = writer.ring().frame_size();
    let mut input = vec![0u8; frame];
    let mut output = vec![0u8; frame];

    while !control.is_finished() {
        if writer.is_full() {
            thread::sleep(FILL_BACKOFF);
            continue;
        }

        let mut produced = 0;
        while produced < frame {
            if control.is_finished() {
                return Ok(Exit::Stopped);
            }

            let room = writer.room(frame - produced);
            if room == 0 {
                thread::sleep(FILL_BACKOFF);
                continue;
            }

            // Drain what the decoder already buffered
            let n = decoder.decode(&[], &mut output[..room])?.min(room);
            if n > 0 {
                produced += writer.push(&output[..n]);
                continue;
            }

            let read = read_some(source, &mut input)?;
            if read == 0 {
                return Ok(Exit::EndOfSource);
            }
            trace!(read, "fed decoder");
            let n = decoder.decode(&input[..read], &mut output[..room])?.min(room);
            produced += writer.push(&output[..n]);
        }
    }

    Ok(Exit::Stopped)
}

/// Read from the source, retrying interrupted reads
fn read_some(source: &mut dyn ByteSource, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match source.read(buf) {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::decoder::PcmDecoder;
    use crate::stream::ring::{FrameRing, FRAME_COUNT};
    use std::io::Cursor;

    fn control() -> Arc<WorkerControl> {
        Arc::new(WorkerControl::new(false))
    }

    #[test]
    fn test_loop_ends_at_source_end() {
        let (ring, mut writer) = FrameRing::new(8);
        let mut source = Cursor::new((0u8..20).collect::<Vec<_>>());
        let mut decoder = PcmDecoder::new(PcmFormat::new(8_000, 1));

        let exit = decode_loop(&mut writer, &mut source, &mut decoder, &control()).unwrap();
        assert_eq!(exit, Exit::EndOfSource);
        assert_eq!(ring.used_bytes(), 20);
        assert_eq!(ring.frames_available(), 2);

        let mut out = [0u8; 8];
        assert!(ring.get_frame(&mut out));
        assert_eq!(out, [0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_loop_honours_stop_flag() {
        let (_ring, mut writer) = FrameRing::new(8);
        let mut source = io::repeat(1);
        let mut decoder = PcmDecoder::new(PcmFormat::new(8_000, 1));
        let control = control();
        control.finished.store(true, Ordering::Release);

        let exit = decode_loop(&mut writer, &mut source, &mut decoder, &control).unwrap();
        assert_eq!(exit, Exit::Stopped);
    }

    #[test]
    fn test_worker_backs_off_when_full() {
        let (ring, writer) = FrameRing::new(8);
        let control = control();
        let worker = Worker {
            writer,
            source: Box::new(io::repeat(3)),
            decoders: Arc::new(|| -> Result<Box<dyn StreamDecoder>> {
                Ok(Box::new(PcmDecoder::new(PcmFormat::new(8_000, 1))))
            }),
            control: Arc::clone(&control),
            device: PcmFormat::new(8_000, 1),
        };
        let handle = thread::spawn(move || worker.run());

        while ring.frames_to_fill() > 2 {
            thread::sleep(Duration::from_millis(1));
        }
        // stays parked with slack left
        thread::sleep(FILL_BACKOFF * 3);
        assert!(ring.frames_available() <= FRAME_COUNT - 3);

        control.finished.store(true, Ordering::Release);
        handle.join().unwrap();
        assert!(control.thread_done.load(Ordering::Acquire));
        assert_eq!(control.format.get(), Some(&PcmFormat::new(8_000, 1)));
    }

    #[test]
    fn test_decoder_failure_finishes_worker() {
        let (ring, writer) = FrameRing::new(8);
        let control = control();
        let worker = Worker {
            writer,
            source: Box::new(io::repeat(3)),
            decoders: Arc::new(|| -> Result<Box<dyn StreamDecoder>> {
                Err(crate::SoundError::DecoderUnavailable("missing".into()))
            }),
            control: Arc::clone(&control),
            device: PcmFormat::new(8_000, 1),
        };
        worker.run();

        assert!(control.is_finished());
        assert!(control.thread_done.load(Ordering::Acquire));
        assert_eq!(ring.used_bytes(), 0);
    }
}
