//! Headless mixing scenarios exercising the public API end to end

use std::io;
use std::sync::Arc;
use std::time::Duration;

use soundmix::{
    AudioConfig, DecoderFactory, DeviceSpec, PcmDecoderFactory, ResourceArchive,
    ResourceArchiveWriter, SoundClip, SoundError, SoundManager, SoundStream, StreamDecoder,
};

fn mono_44k() -> DeviceSpec {
    DeviceSpec::from_config(&AudioConfig::stable(44_100).mono())
}

fn small_stereo() -> DeviceSpec {
    DeviceSpec::from_config(&AudioConfig {
        frequency: 8_000,
        stereo: true,
        block_size: 16,
    })
}

fn constant_clip(spec: DeviceSpec, value: i16, samples: usize) -> Arc<SoundClip> {
    Arc::new(SoundClip::from_samples(vec![value; samples], spec.pcm_format()))
}

fn le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[test]
fn test_two_loud_clips_saturate() {
    let spec = small_stereo();
    let manager = SoundManager::headless(spec);
    let clip = constant_clip(spec, 20_000, spec.block_samples());
    manager.play(Arc::clone(&clip), false);
    manager.play(clip, false);

    let mut out = vec![0i16; spec.block_samples()];
    manager.render(&mut out);
    assert!(out.iter().all(|&s| s == 32_767));
}

#[test]
fn test_fade_is_monotonic_and_completes_within_duration() {
    let spec = mono_44k();
    let manager = SoundManager::headless(spec);
    manager.play(constant_clip(spec, 10_000, 4_410), true);
    manager.begin_fade(1_000);

    let mut out = vec![0i16; spec.block_samples()];
    let mut previous = i16::MAX;
    let mut rendered = 0usize;
    let limit = 44_100 + spec.block_samples();
    while manager.gain() > 0.0 {
        assert!(rendered < limit, "fade still running after {rendered} samples");
        manager.render(&mut out);
        for &sample in &out {
            assert!(sample <= previous);
            previous = sample;
        }
        rendered += out.len();
    }
    assert!(rendered >= 44_100 - spec.block_samples());
    assert_eq!(manager.gain(), 0.0);

    manager.render(&mut out);
    assert!(out.iter().all(|&s| s == 0));

    manager.clear(0);
    approx::assert_relative_eq!(manager.gain(), 1.0);
    assert_eq!(manager.active_clips(), 0);
}

#[test]
fn test_looping_clip_keeps_playing() {
    let spec = small_stereo();
    let manager = SoundManager::headless(spec);
    let pattern: Vec<i16> = vec![1, 2, 3];
    manager.play(
        Arc::new(SoundClip::from_samples(pattern, spec.pcm_format())),
        true,
    );

    let mut out = vec![0i16; spec.block_samples()];
    for _ in 0..10 {
        manager.render(&mut out);
        assert!(out.iter().all(|&s| (1..=3).contains(&s)));
    }
    manager.cleanup();
    assert_eq!(manager.active_clips(), 1);
}

/// Byte source that takes a while per read, like a slow disk
struct SlowSource(io::Repeat);

impl io::Read for SlowSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        std::thread::sleep(Duration::from_millis(5));
        self.0.read(buf)
    }
}

#[test]
fn test_slow_stream_played_right_away_is_heard() {
    let spec = small_stereo();
    let manager = SoundManager::headless(spec);
    let stream = SoundStream::from_source(
        spec,
        Box::new(SlowSource(io::repeat(1))),
        Arc::new(PcmDecoderFactory::new(spec.pcm_format())),
    )
    .unwrap();
    stream.play(&manager);

    let mut out = vec![0i16; spec.block_samples()];
    manager.render(&mut out);
    assert_eq!(manager.active_streams(), 1);
    assert!(out.iter().all(|&s| s == 0x0101));
    stream.stop();
}

#[test]
fn test_failing_decoder_stream_removed_on_next_render() {
    let spec = small_stereo();
    let manager = SoundManager::headless(spec);
    let failing: Arc<dyn DecoderFactory> = Arc::new(|| -> soundmix::Result<Box<dyn StreamDecoder>> {
        Err(SoundError::DecoderUnavailable("no codec installed".into()))
    });
    let stream = SoundStream::from_source(spec, Box::new(io::repeat(9)), failing).unwrap();
    assert!(!stream.wait_ready(Duration::from_secs(5)));

    manager.play_stream(Arc::clone(&stream));
    let mut out = vec![0i16; spec.block_samples()];
    manager.render(&mut out);
    assert_eq!(manager.active_streams(), 0);
    assert!(out.iter().all(|&s| s == 0));
}

#[test]
fn test_same_stream_registered_once() {
    let spec = small_stereo();
    let manager = SoundManager::headless(spec);
    let stream = SoundStream::from_source(
        spec,
        Box::new(io::repeat(0)),
        Arc::new(PcmDecoderFactory::new(spec.pcm_format())),
    )
    .unwrap();

    manager.play_stream(Arc::clone(&stream));
    manager.play_stream(Arc::clone(&stream));
    stream.play(&manager);
    assert_eq!(manager.active_streams(), 1);
    stream.stop();
}

#[test]
fn test_stop_returns_after_worker_exit() {
    let spec = small_stereo();
    let stream = SoundStream::from_source(
        spec,
        Box::new(io::repeat(1)),
        Arc::new(PcmDecoderFactory::new(spec.pcm_format())),
    )
    .unwrap();
    stream.stop();
    assert!(stream.is_finished());
    assert!(stream.is_thread_done());
}

#[test]
fn test_stream_from_archive_mixes_with_clip() {
    let spec = small_stereo();
    let block = spec.block_samples();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sounds.dat");

    // three blocks of 100, then silence
    let music = le_bytes(&vec![100i16; block * 3]);
    let mut writer = ResourceArchiveWriter::create(&path, false).unwrap();
    writer.add_resource("music.pcm", &music).unwrap();
    writer.finish().unwrap();

    let archive = ResourceArchive::open(&path).unwrap();
    let stream = SoundStream::from_resource(
        spec,
        &archive,
        "music.pcm",
        Arc::new(PcmDecoderFactory::new(spec.pcm_format())),
    )
    .unwrap();
    assert!(stream.wait_ready(Duration::from_secs(5)));
    while !stream.is_thread_done() {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(stream.frames_available(), 3);

    let manager = SoundManager::headless(spec);
    manager.play(constant_clip(spec, 5, block), false);
    stream.play(&manager);

    let mut out = vec![0i16; block];
    manager.render(&mut out);
    assert!(out.iter().all(|&s| s == 105));
    manager.render(&mut out);
    assert!(out.iter().all(|&s| s == 100));
    manager.render(&mut out);
    manager.render(&mut out);
    assert!(out.iter().all(|&s| s == 0));
    assert_eq!(manager.active_streams(), 0);

    manager.cleanup();
    assert_eq!(manager.active_clips(), 0);
}

#[test]
fn test_missing_archive_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.dat");
    ResourceArchiveWriter::create(&path, false)
        .unwrap()
        .finish()
        .unwrap();
    let archive = ResourceArchive::open(&path).unwrap();
    let spec = small_stereo();

    let err = SoundStream::from_resource(
        spec,
        &archive,
        "nope.pcm",
        Arc::new(PcmDecoderFactory::new(spec.pcm_format())),
    )
    .unwrap_err();
    assert!(matches!(err, SoundError::ResourceNotFound(_)));
}
