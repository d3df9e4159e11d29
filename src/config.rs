//! Device configuration
//!
//! The requested output format ([`AudioConfig`]) and the format the device
//! actually negotiated ([`DeviceSpec`]). The output is always 16-bit signed
//! interleaved PCM; only rate, channel count and block size vary.

use crate::clip::PcmFormat;
use crate::{Result, SoundError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default sample rate (44.1 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Render block size of the stable preset, in sample frames
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Largest accepted render block, in sample frames
pub const MAX_BLOCK_SIZE: usize = 16_384;

/// Requested output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub frequency: u32,

    /// Two output channels when true, one otherwise
    pub stereo: bool,

    /// Sample frames per render callback
    /// Larger blocks = more latency but less chance of underrun
    pub block_size: usize,
}

impl AudioConfig {
    /// Configuration tuned for low latency
    /// Block = 512 frames ≈ 11.6ms @ 44.1kHz
    pub fn low_latency(frequency: u32) -> Self {
        AudioConfig {
            frequency,
            stereo: true,
            block_size: 512,
        }
    }

    /// Configuration tuned for stability
    /// Block = 1024 frames ≈ 23.2ms @ 44.1kHz
    pub fn stable(frequency: u32) -> Self {
        AudioConfig {
            frequency,
            stereo: true,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Same configuration with a single output channel
    pub fn mono(mut self) -> Self {
        self.stereo = false;
        self
    }

    /// Number of output channels
    pub fn channels(&self) -> u16 {
        if self.stereo {
            2
        } else {
            1
        }
    }

    /// Latency of one render block in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.block_size as f32 / self.frequency as f32) * 1000.0
    }

    /// Check that the configuration can be opened
    pub fn validate(&self) -> Result<()> {
        if self.frequency == 0 {
            return Err(SoundError::Config("frequency must be greater than 0".into()));
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(SoundError::Config(format!(
                "block size {} outside 1..={MAX_BLOCK_SIZE}",
                self.block_size
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(text: &str) -> Result<Self> {
        let config: AudioConfig =
            serde_json::from_str(text).map_err(|e| SoundError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self::stable(DEFAULT_SAMPLE_RATE)
    }
}

/// Output format negotiated with the device
///
/// May differ from the request; query it back instead of assuming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Sample rate in Hz
    pub frequency: u32,
    /// Interleaved channel count (1 or 2)
    pub channels: u16,
    /// Sample frames per render callback
    pub block_size: usize,
}

impl DeviceSpec {
    /// Spec that honours the request exactly
    pub fn from_config(config: &AudioConfig) -> Self {
        DeviceSpec {
            frequency: config.frequency,
            channels: config.channels(),
            block_size: config.block_size,
        }
    }

    /// 16-bit samples per render block, all channels
    pub fn block_samples(&self) -> usize {
        self.block_size * self.channels as usize
    }

    /// Bytes per render block; one stream frame
    pub fn frame_bytes(&self) -> usize {
        self.block_samples() * 2
    }

    /// True for two output channels
    pub fn is_stereo(&self) -> bool {
        self.channels == 2
    }

    /// PCM format clips must be converted to
    pub fn pcm_format(&self) -> PcmFormat {
        PcmFormat::new(self.frequency, self.channels)
    }
}
