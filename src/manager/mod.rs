//! Sound playback service
//!
//! [`SoundManager`] is the object clients talk to: it opens the output
//! device, registers clip playbacks and streams, and runs the fade used by
//! [`SoundManager::clear`]. The actual mixing lives in the shared [`Mixer`],
//! which the device's render callback also holds.
//!
//! A headless manager has no device; the caller drives
//! [`SoundManager::render`] itself (offline rendering and tests).

#[cfg(feature = "device")]
mod device;
mod mixer;

#[cfg(feature = "device")]
pub use device::{MixerSource, OutputDevice};
pub use mixer::Mixer;

use crate::clip::SoundClip;
use crate::config::{AudioConfig, DeviceSpec};
use crate::stream::SoundStream;
use crate::Result;
use mixer::Released;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Poll interval while waiting for a fade to finish
pub const FADE_POLL: Duration = Duration::from_millis(10);

/// Mixes clips and streams into the output device
pub struct SoundManager {
    mixer: Arc<Mixer>,
    paused: AtomicBool,
    #[cfg(feature = "device")]
    device: Option<OutputDevice>,
}

impl SoundManager {
    /// Open the default output device
    ///
    /// # Errors
    /// - [`crate::SoundError::Config`] for an invalid configuration
    /// - [`crate::SoundError::DeviceOpenFailed`] if no device can be opened,
    ///   or when built without the `device` feature
    pub fn initialize(config: &AudioConfig) -> Result<Self> {
        config.validate()?;
        let spec = DeviceSpec::from_config(config);
        let manager = Self::open(spec)?;
        info!(
            frequency = spec.frequency,
            channels = spec.channels,
            block_size = spec.block_size,
            latency_ms = config.latency_ms(),
            "audio device opened"
        );
        Ok(manager)
    }

    #[cfg(feature = "device")]
    fn open(spec: DeviceSpec) -> Result<Self> {
        let mixer = Arc::new(Mixer::new(spec));
        let device = OutputDevice::open(Arc::clone(&mixer))?;
        Ok(SoundManager {
            mixer,
            paused: AtomicBool::new(false),
            device: Some(device),
        })
    }

    #[cfg(not(feature = "device"))]
    fn open(_spec: DeviceSpec) -> Result<Self> {
        Err(crate::SoundError::DeviceOpenFailed(
            "built without the \"device\" feature".into(),
        ))
    }

    /// Manager without an output device
    pub fn headless(spec: DeviceSpec) -> Self {
        SoundManager {
            mixer: Arc::new(Mixer::new(spec)),
            paused: AtomicBool::new(false),
            #[cfg(feature = "device")]
            device: None,
        }
    }

    /// Output sample rate
    pub fn freq(&self) -> u32 {
        self.mixer.spec().frequency
    }

    /// True for two output channels
    pub fn is_stereo(&self) -> bool {
        self.mixer.spec().is_stereo()
    }

    /// Negotiated output format
    pub fn spec(&self) -> DeviceSpec {
        self.mixer.spec()
    }

    /// The shared mixer
    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    /// Pause or resume the device
    pub fn pause(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
        #[cfg(feature = "device")]
        if let Some(device) = &self.device {
            if paused {
                device.pause();
            } else {
                device.play();
            }
        }
        debug!(paused, "pause state changed");
    }

    /// True while paused
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// True while a device is pulling audio
    pub fn is_running(&self) -> bool {
        self.has_device() && !self.is_paused()
    }

    #[cfg(feature = "device")]
    fn has_device(&self) -> bool {
        self.device.is_some()
    }

    #[cfg(not(feature = "device"))]
    fn has_device(&self) -> bool {
        false
    }

    /// Stop every clip playback, fading out over `duration_ms` first
    ///
    /// With a running device this blocks until the fade reaches silence.
    /// Headless or paused, the clips are dropped without waiting; use
    /// [`SoundManager::begin_fade`] to fade while rendering manually.
    /// Streams are not touched.
    pub fn clear(&self, duration_ms: u32) {
        if duration_ms > 0 && self.is_running() {
            self.mixer.begin_fade(duration_ms);
            // a stalled device must not hang the caller forever
            let deadline = Instant::now() + Duration::from_millis(u64::from(duration_ms) * 2 + 1000);
            while self.mixer.gain() > 0.0 {
                if Instant::now() >= deadline {
                    warn!(duration_ms, "fade did not complete, clearing anyway");
                    break;
                }
                thread::sleep(FADE_POLL);
            }
        }
        let released = self.mixer.clear_clips();
        debug!(clips = released.clips, "clips cleared");
    }

    /// Start fading clips out over `duration_ms` of rendered audio
    ///
    /// The fade progresses as blocks are rendered; a gain of zero means it
    /// completed.
    pub fn begin_fade(&self, duration_ms: u32) {
        self.mixer.begin_fade(duration_ms);
    }

    /// Start a playback of `clip`
    pub fn play(&self, clip: Arc<SoundClip>, looping: bool) {
        self.cleanup();
        self.mixer.add_clip(clip, looping);
    }

    /// Start mixing `stream`
    ///
    /// A stream already being mixed is not added twice.
    pub fn play_stream(&self, stream: Arc<SoundStream>) {
        self.cleanup();
        if !self.mixer.add_stream(stream) {
            debug!("stream already playing");
        }
    }

    /// Clip playbacks registered, finished ones included until the next cleanup
    pub fn active_clips(&self) -> usize {
        self.mixer.active_clips()
    }

    /// Streams currently mixed
    pub fn active_streams(&self) -> usize {
        self.mixer.active_streams()
    }

    /// Current fade gain
    pub fn gain(&self) -> f64 {
        self.mixer.gain()
    }

    /// Render one block of interleaved samples
    pub fn render(&self, out: &mut [i16]) {
        self.mixer.render(out);
    }

    /// Render one block as little-endian bytes
    pub fn render_bytes(&self, out: &mut [u8]) {
        self.mixer.render_bytes(out);
    }

    /// Release finished playbacks and streams outside the device lock
    ///
    /// Streams the render callback dropped (end of data or an underrun) are
    /// stopped here, joining their workers. Until this runs, a stream dropped
    /// on an underrun keeps its worker alive; [`SoundManager::play`] and
    /// [`SoundManager::play_stream`] call it, long-running hosts that play
    /// nothing new should call it periodically.
    pub fn cleanup(&self) {
        let released = self.mixer.cleanup();
        release(released);
    }
}

/// Stop and drop streams taken out of the mix
fn release(released: Released) {
    if released.clips > 0 || !released.streams.is_empty() {
        debug!(
            clips = released.clips,
            streams = released.streams.len(),
            "released finished sounds"
        );
    }
    for stream in released.streams {
        stream.stop();
    }
}

impl std::fmt::Debug for SoundManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundManager")
            .field("spec", &self.mixer.spec())
            .field("paused", &self.is_paused())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for SoundManager {
    fn drop(&mut self) {
        #[cfg(feature = "device")]
        drop(self.device.take());
        release(self.mixer.take_all());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{PcmDecoderFactory, StreamDecoder};
    use crate::SoundError;
    use std::io;

    fn spec() -> DeviceSpec {
        DeviceSpec::from_config(&AudioConfig {
            frequency: 8_000,
            stereo: true,
            block_size: 8,
        })
    }

    #[test]
    fn test_headless_reports_spec() {
        let manager = SoundManager::headless(spec());
        assert_eq!(manager.freq(), 8_000);
        assert!(manager.is_stereo());
        assert!(!manager.is_running());
        assert_eq!(manager.spec().frame_bytes(), 32);
    }

    #[cfg(not(feature = "device"))]
    #[test]
    fn test_initialize_without_device_feature() {
        let err = SoundManager::initialize(&AudioConfig::default()).unwrap_err();
        assert!(matches!(err, SoundError::DeviceOpenFailed(_)));
    }

    #[test]
    fn test_initialize_rejects_bad_config() {
        let config = AudioConfig {
            frequency: 0,
            ..AudioConfig::default()
        };
        assert!(matches!(
            SoundManager::initialize(&config),
            Err(SoundError::Config(_))
        ));
    }

    #[test]
    fn test_play_reaps_finished_clips() {
        let manager = SoundManager::headless(spec());
        let clip = Arc::new(SoundClip::from_samples(vec![1; 4], spec().pcm_format()));
        manager.play(Arc::clone(&clip), false);
        manager.play(Arc::clone(&clip), false);
        assert_eq!(manager.active_clips(), 2);

        let mut out = vec![0i16; spec().block_samples()];
        manager.render(&mut out);
        assert_eq!(&out[..4], &[2, 2, 2, 2]);

        manager.play(clip, true);
        assert_eq!(manager.active_clips(), 1);
    }

    #[test]
    fn test_headless_clear_drops_clips_immediately() {
        let manager = SoundManager::headless(spec());
        let clip = Arc::new(SoundClip::from_samples(vec![1; 4], spec().pcm_format()));
        manager.play(clip, true);
        manager.clear(500);
        assert_eq!(manager.active_clips(), 0);
        approx::assert_relative_eq!(manager.gain(), 1.0);
    }

    #[test]
    fn test_pause_flag() {
        let manager = SoundManager::headless(spec());
        manager.pause(true);
        assert!(manager.is_paused());
        manager.pause(false);
        assert!(!manager.is_paused());
    }

    #[test]
    fn test_duplicate_stream_registered_once() {
        let manager = SoundManager::headless(spec());
        let factory = Arc::new(PcmDecoderFactory::new(spec().pcm_format()));
        let stream = SoundStream::from_source(spec(), Box::new(io::repeat(0)), factory).unwrap();
        assert!(stream.wait_ready(Duration::from_secs(5)));

        manager.play_stream(Arc::clone(&stream));
        stream.play(&manager);
        assert_eq!(manager.active_streams(), 1);
        stream.stop();
    }

    #[test]
    fn test_cleanup_stops_stream_dropped_on_underrun() {
        struct Trickle(io::Repeat);
        impl io::Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                thread::sleep(Duration::from_millis(100));
                self.0.read(buf)
            }
        }

        let manager = SoundManager::headless(spec());
        let factory = Arc::new(PcmDecoderFactory::new(spec().pcm_format()));
        let stream =
            SoundStream::from_source(spec(), Box::new(Trickle(io::repeat(1))), factory).unwrap();
        assert_eq!(stream.frames_available(), 1);
        manager.play_stream(Arc::clone(&stream));

        let mut out = vec![0i16; spec().block_samples()];
        manager.render(&mut out);
        manager.render(&mut out);
        assert_eq!(manager.active_streams(), 0);
        assert!(!stream.is_thread_done());

        manager.cleanup();
        assert!(stream.is_thread_done());
    }

    #[test]
    fn test_failed_stream_removed_on_render() {
        let manager = SoundManager::headless(spec());
        let failing = Arc::new(|| -> Result<Box<dyn StreamDecoder>> {
            Err(SoundError::DecoderUnavailable("no codec".into()))
        });
        let stream = SoundStream::from_source(spec(), Box::new(io::repeat(0)), failing).unwrap();
        manager.play_stream(Arc::clone(&stream));
        assert_eq!(manager.active_streams(), 1);

        let mut out = vec![0i16; spec().block_samples()];
        manager.render(&mut out);
        assert_eq!(manager.active_streams(), 0);
        assert!(out.iter().all(|&s| s == 0));
    }
}
