//! Shared mixer state and the render callback
//!
//! Everything the render callback touches lives behind one
//! [`parking_lot::Mutex`], the device lock. The callback holds it for one
//! block; `play`, `clear` and cleanup take it briefly from client threads.
//! While holding it the callback never allocates, never drops a stream and
//! never joins a worker: streams that run dry are parked on a retired list
//! (with capacity reserved up front) and released later by the client side.

use crate::clip::SoundClip;
use crate::config::DeviceSpec;
use crate::mixing::{clamp_sample, Accumulator, BufferReader};
use crate::stream::SoundStream;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

/// One registered playback of a clip
#[derive(Debug, Clone)]
struct PlaybackState {
    clip: Arc<SoundClip>,
    /// Byte offset of the next sample; `None` once a one-shot playback ended
    position: Option<usize>,
    looping: bool,
}

#[derive(Debug)]
struct MixState {
    clips: Vec<PlaybackState>,
    streams: Vec<Arc<SoundStream>>,
    /// Streams the callback gave up on, waiting to be released off the audio thread
    retired: Vec<Arc<SoundStream>>,
    gain: f64,
    /// Gain change per output sample while fading
    gain_delta: f64,
    fading: bool,
    accumulator: Accumulator<i32>,
    /// One stream frame
    scratch: Vec<u8>,
}

/// Mixer shared between a [`crate::SoundManager`] and the output device
#[derive(Debug)]
pub struct Mixer {
    spec: DeviceSpec,
    state: Mutex<MixState>,
}

/// Streams and clips taken out of the mix, released once the lock is dropped
pub(crate) struct Released {
    pub streams: Vec<Arc<SoundStream>>,
    pub clips: usize,
}

impl Mixer {
    /// Mixer for blocks of `spec`
    pub fn new(spec: DeviceSpec) -> Self {
        let samples = spec.block_samples();
        Mixer {
            spec,
            state: Mutex::new(MixState {
                clips: Vec::new(),
                streams: Vec::new(),
                retired: Vec::new(),
                gain: 1.0,
                gain_delta: 0.0,
                fading: false,
                accumulator: Accumulator::new(samples),
                scratch: vec![0; samples * 2],
            }),
        }
    }

    /// Output format
    pub fn spec(&self) -> DeviceSpec {
        self.spec
    }

    /// Current fade gain (1.0 when not fading)
    pub fn gain(&self) -> f64 {
        self.state.lock().gain
    }

    /// Registered clip playbacks, finished ones included until cleanup
    pub fn active_clips(&self) -> usize {
        self.state.lock().clips.len()
    }

    /// Streams currently mixed
    pub fn active_streams(&self) -> usize {
        self.state.lock().streams.len()
    }

    /// Render one block of interleaved samples
    ///
    /// Runs on the device thread. Clips are mixed before streams.
    pub fn render(&self, out: &mut [i16]) {
        self.render_with(out.len(), |i, sample| out[i] = sample);
    }

    /// Render one block as little-endian 16-bit bytes
    pub fn render_bytes(&self, out: &mut [u8]) {
        let samples = out.len() / 2;
        self.render_with(samples, |i, sample| {
            out[i * 2..i * 2 + 2].copy_from_slice(&sample.to_le_bytes())
        });
        if out.len() % 2 == 1 {
            out[samples * 2] = 0;
        }
    }

    fn render_with<F>(&self, samples: usize, mut write: F)
    where
        F: FnMut(usize, i16),
    {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.accumulator.len() != samples {
            state.accumulator.resize(samples);
            state.scratch.resize(samples * 2, 0);
        }
        state.accumulator.reset();

        for playback in state.clips.iter_mut() {
            let Some(position) = playback.position else {
                continue;
            };
            let data = playback.clip.samples();
            let mut reader = BufferReader::new(data, position / 2, playback.looping);
            state.accumulator.start_sequence();
            let consumed = state.accumulator.acc_data(reader.map(i32::from));
            reader.advance(consumed);
            playback.position = if reader.is_exhausted() {
                None
            } else {
                Some(reader.position() * 2)
            };
        }

        let mut index = 0;
        while index < state.streams.len() {
            if state.streams[index].get_frame(&mut state.scratch) {
                state.accumulator.start_sequence();
                state.accumulator.acc_data(
                    state
                        .scratch
                        .chunks_exact(2)
                        .map(|b| i32::from(i16::from_le_bytes([b[0], b[1]]))),
                );
                index += 1;
            } else {
                let stream = state.streams.remove(index);
                state.retired.push(stream);
                debug!("stream has no frame, removed from mix");
            }
        }

        state.accumulator.flush();

        for (i, &value) in state.accumulator.iter().enumerate() {
            let value = if state.fading {
                let faded = (value as f64 * state.gain) as i32;
                state.gain += state.gain_delta;
                if state.gain <= 0.0 {
                    state.gain = 0.0;
                    state.gain_delta = 0.0;
                }
                faded
            } else {
                value
            };
            write(i, clamp_sample(value));
        }
    }

    /// Register a clip playback
    pub(crate) fn add_clip(&self, clip: Arc<SoundClip>, looping: bool) {
        let mut state = self.state.lock();
        state.clips.push(PlaybackState {
            clip,
            position: Some(0),
            looping,
        });
    }

    /// Register a stream unless its pipeline is already mixed
    ///
    /// Returns false for a duplicate.
    pub(crate) fn add_stream(&self, stream: Arc<SoundStream>) -> bool {
        let mut state = self.state.lock();
        if state.streams.iter().any(|s| s.same_pipeline(&stream)) {
            return false;
        }
        state.streams.push(stream);
        // every mixed stream can be retired without growing the list
        let additional = state.streams.len();
        state.retired.reserve(additional);
        true
    }

    /// Start a linear fade from full gain to silence over `duration_ms` of audio
    pub(crate) fn begin_fade(&self, duration_ms: u32) {
        let per_sample = duration_ms as f64 * self.spec.frequency as f64 * self.spec.channels as f64;
        let mut state = self.state.lock();
        state.gain = 1.0;
        state.gain_delta = if per_sample > 0.0 {
            -1000.0 / per_sample
        } else {
            -1.0
        };
        state.fading = true;
        trace!(gain_delta = state.gain_delta, "fade engaged");
    }

    /// Drop every clip playback and restore full gain
    pub(crate) fn clear_clips(&self) -> Released {
        let mut state = self.state.lock();
        let clips = state.clips.len();
        state.clips.clear();
        state.gain = 1.0;
        state.gain_delta = 0.0;
        state.fading = false;
        Released {
            streams: Vec::new(),
            clips,
        }
    }

    /// Take finished clips, drained streams and retired streams out of the mix
    pub(crate) fn cleanup(&self) -> Released {
        let mut state = self.state.lock();
        let before = state.clips.len();
        state.clips.retain(|p| p.position.is_some());
        let clips = before - state.clips.len();

        let mut streams = std::mem::take(&mut state.retired);
        let (drained, live): (Vec<_>, Vec<_>) =
            state.streams.drain(..).partition(|s| s.is_drained());
        state.streams = live;
        streams.extend(drained);

        let reserve = state.streams.len();
        state.retired.reserve(reserve);
        Released { streams, clips }
    }

    /// Take everything out of the mix
    pub(crate) fn take_all(&self) -> Released {
        let mut state = self.state.lock();
        let clips = state.clips.len();
        state.clips.clear();
        let mut streams = std::mem::take(&mut state.streams);
        streams.append(&mut state.retired);
        Released { streams, clips }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioConfig;

    fn mono(block_size: usize) -> DeviceSpec {
        DeviceSpec::from_config(&AudioConfig {
            frequency: 8_000,
            stereo: false,
            block_size,
        })
    }

    fn clip(samples: Vec<i16>, spec: DeviceSpec) -> Arc<SoundClip> {
        Arc::new(SoundClip::from_samples(samples, spec.pcm_format()))
    }

    #[test]
    fn test_silence_without_sources() {
        let mixer = Mixer::new(mono(4));
        let mut out = [7i16; 4];
        mixer.render(&mut out);
        assert_eq!(out, [0; 4]);
    }

    #[test]
    fn test_short_clip_is_zero_padded_and_finishes() {
        let spec = mono(4);
        let mixer = Mixer::new(spec);
        mixer.add_clip(clip(vec![100, 200], spec), false);

        let mut out = [0i16; 4];
        mixer.render(&mut out);
        assert_eq!(out, [100, 200, 0, 0]);

        let released = mixer.cleanup();
        assert_eq!(released.clips, 1);
        assert_eq!(mixer.active_clips(), 0);
    }

    #[test]
    fn test_clip_position_carries_across_blocks() {
        let spec = mono(2);
        let mixer = Mixer::new(spec);
        mixer.add_clip(clip(vec![1, 2, 3], spec), false);

        let mut out = [0i16; 2];
        mixer.render(&mut out);
        assert_eq!(out, [1, 2]);
        mixer.render(&mut out);
        assert_eq!(out, [3, 0]);
        mixer.render(&mut out);
        assert_eq!(out, [0, 0]);
    }

    #[test]
    fn test_looping_clip_wraps() {
        let spec = mono(5);
        let mixer = Mixer::new(spec);
        mixer.add_clip(clip(vec![1, 2], spec), true);

        let mut out = [0i16; 5];
        mixer.render(&mut out);
        assert_eq!(out, [1, 2, 1, 2, 1]);
        mixer.render(&mut out);
        assert_eq!(out, [2, 1, 2, 1, 2]);
        assert_eq!(mixer.cleanup().clips, 0);
    }

    #[test]
    fn test_sum_saturates_both_ways() {
        let spec = mono(2);
        let mixer = Mixer::new(spec);
        mixer.add_clip(clip(vec![20_000, -20_000], spec), false);
        mixer.add_clip(clip(vec![20_000, -20_000], spec), false);

        let mut out = [0i16; 2];
        mixer.render(&mut out);
        assert_eq!(out, [32_767, -32_768]);
    }

    #[test]
    fn test_render_bytes_little_endian() {
        let spec = mono(2);
        let mixer = Mixer::new(spec);
        mixer.add_clip(clip(vec![0x0102, -2], spec), false);

        let mut out = [0u8; 4];
        mixer.render_bytes(&mut out);
        assert_eq!(out, [0x02, 0x01, 0xFE, 0xFF]);
    }

    #[test]
    fn test_block_size_change_resizes() {
        let spec = mono(2);
        let mixer = Mixer::new(spec);
        mixer.add_clip(clip(vec![5; 8], spec), false);

        let mut big = [0i16; 6];
        mixer.render(&mut big);
        assert_eq!(big, [5; 6]);
        let mut small = [0i16; 1];
        mixer.render(&mut small);
        assert_eq!(small, [5]);
    }

    #[test]
    fn test_fade_reaches_zero_and_stops() {
        let spec = mono(100);
        let mixer = Mixer::new(spec);
        mixer.add_clip(clip(vec![10_000], spec), true);
        // 8000 Hz mono: 10 ms = 80 samples
        mixer.begin_fade(10);

        let mut out = [0i16; 100];
        mixer.render(&mut out);
        assert!(out.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(out[0], 10_000);
        assert_eq!(out[99], 0);
        assert_eq!(mixer.gain(), 0.0);

        mixer.clear_clips();
        approx::assert_relative_eq!(mixer.gain(), 1.0);
        assert_eq!(mixer.active_clips(), 0);
    }

    #[test]
    fn test_restarted_fade_ramps_from_full_gain() {
        let spec = mono(40);
        let mixer = Mixer::new(spec);
        mixer.add_clip(clip(vec![8_000], spec), true);
        // 80 samples of fade, half of it rendered
        mixer.begin_fade(10);
        let mut out = [0i16; 40];
        mixer.render(&mut out);
        approx::assert_relative_eq!(mixer.gain(), 0.5, epsilon = 1e-9);

        mixer.begin_fade(10);
        approx::assert_relative_eq!(mixer.gain(), 1.0);
        mixer.render(&mut out);
        assert_eq!(out[0], 8_000);
        approx::assert_relative_eq!(mixer.gain(), 0.5, epsilon = 1e-9);
    }
}
