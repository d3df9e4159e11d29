//! Format conversion for decoded clips
//!
//! Clips are stored in the device format so the mixer never converts on the
//! real-time path. Conversion happens once, at load time, through a
//! [`FormatConverter`].

use crate::{Result, SoundError};
use std::fmt;

/// Sample rate and interleaved channel count of 16-bit PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
}

impl PcmFormat {
    /// Create a format description
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        PcmFormat {
            sample_rate,
            channels,
        }
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz / {} ch", self.sample_rate, self.channels)
    }
}

/// Converts interleaved 16-bit PCM between formats
pub trait FormatConverter {
    /// Convert `samples` from `from` to `to`
    ///
    /// Fails with [`SoundError::FormatUnsupported`] when no conversion exists.
    fn convert(&self, samples: &[i16], from: PcmFormat, to: PcmFormat) -> Result<Vec<i16>>;
}

/// Mono/stereo mapping plus linear-interpolation resampling
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearConverter;

impl LinearConverter {
    fn check(format: PcmFormat) -> Result<()> {
        if format.sample_rate == 0 || !(1..=2).contains(&format.channels) {
            return Err(SoundError::FormatUnsupported(format!(
                "cannot convert {format} (need a positive rate and 1 or 2 channels)"
            )));
        }
        Ok(())
    }

    /// Re-map interleaved frames to a new channel count
    fn map_channels(samples: &[i16], from: u16, to: u16) -> Vec<i16> {
        match (from, to) {
            (1, 2) => samples.iter().flat_map(|&s| [s, s]).collect(),
            (2, 1) => samples
                .chunks_exact(2)
                .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
                .collect(),
            _ => samples.to_vec(),
        }
    }

    /// Linear interpolation between neighbouring frames
    fn resample(samples: &[i16], channels: usize, from: u32, to: u32) -> Vec<i16> {
        let frames = samples.len() / channels;
        if frames == 0 {
            return Vec::new();
        }
        let out_frames = (frames as u64 * to as u64 / from as u64) as usize;
        let step = from as f64 / to as f64;
        let mut out = Vec::with_capacity(out_frames * channels);

        for i in 0..out_frames {
            let pos = i as f64 * step;
            let index = (pos as usize).min(frames - 1);
            let next = (index + 1).min(frames - 1);
            let frac = pos - index as f64;
            for ch in 0..channels {
                let a = samples[index * channels + ch] as f64;
                let b = samples[next * channels + ch] as f64;
                out.push((a + (b - a) * frac).round() as i16);
            }
        }
        out
    }
}

impl FormatConverter for LinearConverter {
    fn convert(&self, samples: &[i16], from: PcmFormat, to: PcmFormat) -> Result<Vec<i16>> {
        Self::check(from)?;
        Self::check(to)?;

        let mapped = Self::map_channels(samples, from.channels, to.channels);
        if from.sample_rate == to.sample_rate {
            return Ok(mapped);
        }
        Ok(Self::resample(
            &mapped,
            to.channels as usize,
            from.sample_rate,
            to.sample_rate,
        ))
    }
}
