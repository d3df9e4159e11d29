//! External decoder interface
//!
//! A stream does not know how its bytes are encoded. Its worker asks a
//! [`DecoderFactory`] for a fresh [`StreamDecoder`] and then pushes raw input
//! through it to obtain interleaved little-endian 16-bit PCM.

use crate::clip::PcmFormat;
use crate::Result;
use std::collections::VecDeque;

/// Incremental decoder producing interleaved 16-bit little-endian PCM
pub trait StreamDecoder: Send {
    /// Feed `input` and decode at most `output.len()` bytes into `output`
    ///
    /// All of `input` is consumed; whatever cannot be emitted yet is
    /// buffered internally. An empty `input` only drains previously buffered
    /// data. Returns the number of bytes written.
    fn decode(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize>;

    /// Native output sample rate
    fn frequency(&self) -> u32;

    /// Native output channel count
    fn channels(&self) -> u16;

    /// Native output format
    fn format(&self) -> PcmFormat {
        PcmFormat::new(self.frequency(), self.channels())
    }
}

/// Creates decoder instances for stream workers
pub trait DecoderFactory: Send + Sync {
    /// Create a decoder
    ///
    /// Fails with [`crate::SoundError::DecoderUnavailable`] when the decoder
    /// cannot be constructed.
    fn create(&self) -> Result<Box<dyn StreamDecoder>>;
}

impl<F> DecoderFactory for F
where
    F: Fn() -> Result<Box<dyn StreamDecoder>> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn StreamDecoder>> {
        self()
    }
}

/// Pass-through decoder for sources that already hold raw 16-bit PCM
#[derive(Debug, Clone)]
pub struct PcmDecoder {
    format: PcmFormat,
    pending: VecDeque<u8>,
}

impl PcmDecoder {
    /// Decoder for raw PCM in `format`
    pub fn new(format: PcmFormat) -> Self {
        PcmDecoder {
            format,
            pending: VecDeque::new(),
        }
    }

    /// Bytes buffered but not yet emitted
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl StreamDecoder for PcmDecoder {
    fn decode(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        self.pending.extend(input);
        let n = output.len().min(self.pending.len());
        for (dst, src) in output.iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn frequency(&self) -> u32 {
        self.format.sample_rate
    }

    fn channels(&self) -> u16 {
        self.format.channels
    }
}

/// Factory for [`PcmDecoder`]
#[derive(Debug, Clone, Copy)]
pub struct PcmDecoderFactory {
    format: PcmFormat,
}

impl PcmDecoderFactory {
    /// Factory producing pass-through decoders for `format`
    pub fn new(format: PcmFormat) -> Self {
        PcmDecoderFactory { format }
    }
}

impl DecoderFactory for PcmDecoderFactory {
    fn create(&self) -> Result<Box<dyn StreamDecoder>> {
        Ok(Box::new(PcmDecoder::new(self.format)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SoundError;

    #[test]
    fn test_pcm_decoder_buffers_excess() {
        let mut decoder = PcmDecoder::new(PcmFormat::new(44_100, 2));
        let mut out = [0u8; 4];

        assert_eq!(decoder.decode(&[1, 2, 3, 4, 5, 6], &mut out).unwrap(), 4);
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(decoder.pending(), 2);

        // drain only
        assert_eq!(decoder.decode(&[], &mut out).unwrap(), 2);
        assert_eq!(&out[..2], &[5, 6]);
        assert_eq!(decoder.decode(&[], &mut out).unwrap(), 0);
    }

    #[test]
    fn test_pcm_factory_format() {
        let factory = PcmDecoderFactory::new(PcmFormat::new(22_050, 1));
        let decoder = factory.create().unwrap();
        assert_eq!(decoder.frequency(), 22_050);
        assert_eq!(decoder.channels(), 1);
        assert_eq!(decoder.format(), PcmFormat::new(22_050, 1));
    }

    #[test]
    fn test_closure_factory() {
        let failing = || -> Result<Box<dyn StreamDecoder>> {
            Err(SoundError::DecoderUnavailable("no codec".into()))
        };
        assert!(matches!(
            failing.create(),
            Err(SoundError::DecoderUnavailable(_))
        ));
    }
}
