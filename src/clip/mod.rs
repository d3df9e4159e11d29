//! Pre-decoded sound effects
//!
//! A [`SoundClip`] is a short sound loaded once from a WAV resource and kept
//! in memory in the device format. It has no playback state of its own:
//! playbacks reference it through an `Arc` and keep their own cursor, so one
//! clip can be played many times concurrently without copying its samples.

pub mod convert;

pub use convert::{FormatConverter, LinearConverter, PcmFormat};

use crate::resource::ResourceProvider;
use crate::{Result, SoundError};
use std::io::{Cursor, Read};
use std::time::Duration;

/// Immutable, shareable PCM buffer in device format
#[derive(Debug, Clone)]
pub struct SoundClip {
    /// Interleaved 16-bit samples
    samples: Vec<i16>,
    format: PcmFormat,
}

impl SoundClip {
    /// Load a WAV resource and convert it to `target`
    ///
    /// # Errors
    /// - [`SoundError::ResourceNotFound`] if `name` cannot be opened
    /// - [`SoundError::InvalidWav`] if the bytes are not a WAV file
    /// - [`SoundError::FormatUnsupported`] if no conversion to `target` exists
    pub fn load<R>(
        resources: &R,
        name: &str,
        target: PcmFormat,
        converter: &dyn FormatConverter,
    ) -> Result<Self>
    where
        R: ResourceProvider + ?Sized,
    {
        let source = resources.open(name)?;
        let clip = Self::from_reader(source, target, converter)?;
        tracing::debug!(
            name,
            samples = clip.samples.len(),
            format = %clip.format,
            "loaded sound clip"
        );
        Ok(clip)
    }

    /// Decode WAV bytes held in memory
    pub fn from_wav_bytes(
        bytes: &[u8],
        target: PcmFormat,
        converter: &dyn FormatConverter,
    ) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes), target, converter)
    }

    /// Decode a WAV stream
    pub fn from_reader<R: Read>(
        reader: R,
        target: PcmFormat,
        converter: &dyn FormatConverter,
    ) -> Result<Self> {
        let (decoded, format) = decode_wav(reader)?;
        if format == target {
            return Ok(SoundClip {
                samples: decoded,
                format,
            });
        }
        let samples = converter.convert(&decoded, format, target)?;
        // `decoded` is released here; only the converted copy is kept
        Ok(SoundClip {
            samples,
            format: target,
        })
    }

    /// Wrap samples that are already in device format
    pub fn from_samples(samples: Vec<i16>, format: PcmFormat) -> Self {
        SoundClip { samples, format }
    }

    /// Interleaved samples
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Buffer length in bytes
    pub fn len_bytes(&self) -> usize {
        self.samples.len() * 2
    }

    /// True for a clip without samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Format of the stored samples
    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Playback length
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() as f64 / self.format.channels.max(1) as f64;
        Duration::from_secs_f64(frames / self.format.sample_rate.max(1) as f64)
    }
}

/// Decode a WAV stream to 16-bit interleaved PCM, keeping its rate and layout
fn decode_wav<R: Read>(reader: R) -> Result<(Vec<i16>, PcmFormat)> {
    let mut wav = hound::WavReader::new(reader)?;
    let spec = wav.spec();
    let format = PcmFormat::new(spec.sample_rate, spec.channels);

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, bits @ 1..=32) => wav
            .samples::<i32>()
            .map(|s| s.map(|v| scale_to_16(v, bits)))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (hound::SampleFormat::Float, 32) => wav
            .samples::<f32>()
            .map(|s| s.map(|v| (v * 32767.0).clamp(-32768.0, 32767.0) as i16))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (sample_format, bits) => {
            return Err(SoundError::FormatUnsupported(format!(
                "{bits}-bit {sample_format:?} samples"
            )))
        }
    };

    Ok((samples, format))
}

/// Rescale an integer sample of `bits` width to 16 bits
fn scale_to_16(value: i32, bits: u16) -> i16 {
    if bits > 16 {
        (value >> (bits - 16)) as i16
    } else {
        (value << (16 - bits)) as i16
    }
}
