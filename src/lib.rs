//! Real-time sound mixer for games
//!
//! Mixes short, fully decoded sound effects ("clips") and long, incrementally
//! decoded audio streams into a single hardware-clocked 16-bit output buffer.
//! Streams are decoded on a background worker into a lock-free frame ring that
//! the real-time render callback drains without blocking.
//!
//! # Features
//! - Wide-integer accumulation of any number of sources with saturation to 16 bits
//! - Shared, immutable clips with many concurrent (optionally looping) playbacks
//! - Per-stream decode worker with bounded look-ahead and backpressure
//! - Linear fade-out of one-shot playback
//! - Loose-file and packed resource archive sources
//!
//! # Crate feature flags
//! - `device` (opt-in): real-time output through the system audio device
//!   (enables the optional `rodio` dep and the `soundmix` CLI)
//!
//! # Quick start
//! ## Offline rendering
//! ```no_run
//! use std::sync::Arc;
//! use soundmix::{AudioConfig, DeviceSpec, SoundClip, SoundManager};
//!
//! let spec = DeviceSpec::from_config(&AudioConfig::stable(44_100));
//! let manager = SoundManager::headless(spec);
//! let clip = Arc::new(SoundClip::from_samples(vec![1000; 4096], spec.pcm_format()));
//! manager.play(clip, false);
//! let mut block = vec![0i16; spec.block_samples()];
//! manager.render(&mut block);
//! ```
//!
//! ## Real-time output
//! ```no_run
//! # #[cfg(feature = "device")]
//! # {
//! use std::sync::Arc;
//! use soundmix::{AudioConfig, FileSystemResources, LinearConverter, SoundClip, SoundManager};
//!
//! let manager = SoundManager::initialize(&AudioConfig::default()).unwrap();
//! let resources = FileSystemResources::new("assets");
//! let clip = SoundClip::load(&resources, "jump.wav", manager.spec().pcm_format(), &LinearConverter)
//!     .unwrap();
//! manager.play(Arc::new(clip), false);
//! # }
//! ```

#![warn(missing_docs)]

pub mod clip; // Pre-decoded sound effects
pub mod config; // Device configuration
pub mod manager; // Playback service and render callback
pub mod mixing; // Accumulator and sample cursors
pub mod resource; // Byte sources and resource archives
pub mod stream; // Background-decoded streams

/// Error types for sound operations
#[derive(thiserror::Error, Debug)]
pub enum SoundError {
    /// Named sound or resource could not be opened
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Decoded audio cannot be converted to the device format
    #[error("Format cannot be converted to match audio hardware: {0}")]
    FormatUnsupported(String),

    /// External decoder missing or failed to construct
    #[error("Decoder unavailable: {0}")]
    DecoderUnavailable(String),

    /// Audio hardware initialization failure
    #[error("Audio device open failed: {0}")]
    DeviceOpenFailed(String),

    /// Malformed WAV data
    #[error("Invalid WAV data: {0}")]
    InvalidWav(#[from] hound::Error),

    /// Malformed or unwritable resource archive
    #[error("Resource archive error: {0}")]
    Archive(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error from filesystem or source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for SoundError {
    /// Converts a String into `SoundError::Other`.
    ///
    /// Prefer the specific variants where the failure kind is known.
    fn from(msg: String) -> Self {
        SoundError::Other(msg)
    }
}

impl From<&str> for SoundError {
    /// Converts a string slice into `SoundError::Other`.
    fn from(msg: &str) -> Self {
        SoundError::Other(msg.to_string())
    }
}

/// Result type for sound operations
pub type Result<T> = std::result::Result<T, SoundError>;

// Public API exports
pub use clip::{FormatConverter, LinearConverter, PcmFormat, SoundClip};
pub use config::{AudioConfig, DeviceSpec};
pub use manager::{Mixer, SoundManager};
pub use mixing::{Accumulator, BufferReader};
pub use resource::{
    ByteSource, FileSystemResources, ResourceArchive, ResourceArchiveWriter, ResourceProvider,
};
pub use stream::{DecoderFactory, PcmDecoder, PcmDecoderFactory, SoundStream, StreamDecoder};

#[cfg(feature = "device")]
pub use manager::OutputDevice;
