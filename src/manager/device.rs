//! Audio device integration using rodio
//!
//! The device pulls audio: rodio iterates a [`MixerSource`], which renders
//! one block at a time from the shared [`Mixer`].

use super::Mixer;
use crate::config::DeviceSpec;
use crate::{Result, SoundError};
use rodio::{OutputStream, Sink, Source};
use std::sync::Arc;
use std::time::Duration;

/// Source that renders blocks from the mixer on demand
pub struct MixerSource {
    mixer: Arc<Mixer>,
    spec: DeviceSpec,
    block: Vec<i16>,
    /// Next sample of `block` to hand out
    position: usize,
}

impl MixerSource {
    /// Source pulling from `mixer`
    pub fn new(mixer: Arc<Mixer>) -> Self {
        let spec = mixer.spec();
        let samples = spec.block_samples().max(1);
        MixerSource {
            mixer,
            spec,
            block: vec![0; samples],
            position: samples, // render on first pull
        }
    }
}

impl Iterator for MixerSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.position >= self.block.len() {
            self.mixer.render(&mut self.block);
            self.position = 0;
        }
        let sample = self.block[self.position];
        self.position += 1;
        Some(sample)
    }
}

impl Source for MixerSource {
    fn current_frame_len(&self) -> Option<usize> {
        let remaining = self.block.len() - self.position;
        if remaining > 0 {
            Some(remaining)
        } else {
            Some(self.block.len())
        }
    }

    fn channels(&self) -> u16 {
        self.spec.channels
    }

    fn sample_rate(&self) -> u32 {
        self.spec.frequency
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Playback device using rodio
pub struct OutputDevice {
    _stream: OutputStream,
    sink: Sink,
}

impl OutputDevice {
    /// Open the default output and start pulling from `mixer`
    ///
    /// # Errors
    /// [`SoundError::DeviceOpenFailed`] if no output device can be opened
    pub fn open(mixer: Arc<Mixer>) -> Result<Self> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| SoundError::DeviceOpenFailed(format!("no output stream: {e}")))?;
        let sink = Sink::try_new(&handle)
            .map_err(|e| SoundError::DeviceOpenFailed(format!("no output sink: {e}")))?;
        sink.append(MixerSource::new(mixer));

        Ok(OutputDevice {
            _stream: stream,
            sink,
        })
    }

    /// Stop pulling audio
    pub fn pause(&self) {
        self.sink.pause();
    }

    /// Resume pulling audio
    pub fn play(&self) {
        self.sink.play();
    }

    /// True while paused
    pub fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }
}

impl Drop for OutputDevice {
    fn drop(&mut self) {
        self.sink.pause();
    }
}
