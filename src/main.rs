#[cfg(not(feature = "device"))]
fn main() {
    eprintln!(
        "The soundmix CLI requires the \"device\" feature. Rebuild with `--features device` to enable playback."
    );
}

#[cfg(feature = "device")]
mod cli {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use anyhow::{bail, Context};
    use clap::Parser;
    use tracing::{info, warn};

    use soundmix::{
        AudioConfig, FileSystemResources, LinearConverter, PcmDecoderFactory, ResourceArchive,
        ResourceProvider, SoundClip, SoundManager, SoundStream,
    };

    /// Stream start-up allowance before playback begins
    const PREROLL: Duration = Duration::from_millis(500);

    /// Status line interval
    const STATUS_INTERVAL: Duration = Duration::from_secs(1);

    #[derive(Parser, Debug)]
    #[command(name = "soundmix")]
    #[command(about = "Mix sound clips and a PCM stream to the default audio device")]
    struct Args {
        /// Output sample rate in Hz
        #[arg(long, default_value_t = soundmix::config::DEFAULT_SAMPLE_RATE)]
        freq: u32,

        /// Single output channel
        #[arg(long)]
        mono: bool,

        /// JSON device configuration (overrides --freq and --mono)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Resource archive to read sounds from (default: current directory)
        #[arg(long)]
        archive: Option<PathBuf>,

        /// WAV clip to play; repeat for several
        #[arg(long = "clip")]
        clips: Vec<String>,

        /// Loop every clip until the end
        #[arg(long)]
        loop_clips: bool,

        /// Raw 16-bit little-endian PCM resource to stream in the device format
        #[arg(long)]
        stream: Option<String>,

        /// Playback time in seconds
        #[arg(long, default_value_t = 5.0)]
        seconds: f32,

        /// Fade-out applied to clips at the end, in milliseconds
        #[arg(long, default_value_t = 500)]
        fade_ms: u32,
    }

    fn load_config(args: &Args) -> anyhow::Result<AudioConfig> {
        if let Some(path) = &args.config {
            return AudioConfig::from_json_file(path)
                .with_context(|| format!("reading {}", path.display()));
        }
        let config = AudioConfig::stable(args.freq);
        Ok(if args.mono { config.mono() } else { config })
    }

    fn open_resources(args: &Args) -> anyhow::Result<Box<dyn ResourceProvider>> {
        match &args.archive {
            Some(path) => {
                let archive = ResourceArchive::open(path)
                    .with_context(|| format!("opening archive {}", path.display()))?;
                info!(path = %path.display(), entries = archive.len(), "resource archive opened");
                Ok(Box::new(archive))
            }
            None => Ok(Box::new(FileSystemResources::new("."))),
        }
    }

    pub fn run() -> anyhow::Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();

        let args = Args::parse();
        if args.clips.is_empty() && args.stream.is_none() {
            bail!("nothing to play: pass --clip and/or --stream");
        }

        let config = load_config(&args)?;
        let resources = open_resources(&args)?;
        let manager = SoundManager::initialize(&config).context("opening audio device")?;
        let spec = manager.spec();

        println!("soundmix");
        println!("========");
        println!(
            "Device: {} Hz, {}, block {} frames ({:.1} ms)",
            spec.frequency,
            if manager.is_stereo() { "stereo" } else { "mono" },
            spec.block_size,
            config.latency_ms()
        );

        let mut clips = Vec::with_capacity(args.clips.len());
        for name in &args.clips {
            match SoundClip::load(resources.as_ref(), name, spec.pcm_format(), &LinearConverter) {
                Ok(clip) => {
                    println!("Clip:   {name} ({:.2} s)", clip.duration().as_secs_f32());
                    clips.push(Arc::new(clip));
                }
                Err(err) => warn!(name = %name, error = %err, "skipping clip"),
            }
        }

        let stream = match &args.stream {
            Some(name) => {
                let decoders = Arc::new(PcmDecoderFactory::new(spec.pcm_format()));
                let stream = SoundStream::from_resource(spec, resources.as_ref(), name, decoders)
                    .with_context(|| format!("opening stream {name}"))?;
                if !stream.wait_ready(PREROLL) {
                    warn!(name = %name, "stream produced no audio during pre-roll");
                }
                println!("Stream: {name}");
                Some(stream)
            }
            None => None,
        };

        for clip in &clips {
            manager.play(Arc::clone(clip), args.loop_clips);
        }
        if let Some(stream) = &stream {
            stream.play(&manager);
        }

        let duration = Duration::from_secs_f32(args.seconds.max(0.0));
        let start = Instant::now();
        let mut last_status = start;
        while start.elapsed() < duration {
            thread::sleep(Duration::from_millis(50));
            if last_status.elapsed() >= STATUS_INTERVAL {
                manager.cleanup();
                info!(
                    clips = manager.active_clips(),
                    streams = manager.active_streams(),
                    elapsed_s = start.elapsed().as_secs(),
                    "playing"
                );
                last_status = Instant::now();
            }
            if manager.active_clips() == 0 && manager.active_streams() == 0 {
                break;
            }
        }

        manager.clear(args.fade_ms);
        if let Some(stream) = stream {
            stream.stop();
        }

        println!("\nPlayback complete ({:.2} s)", start.elapsed().as_secs_f32());
        Ok(())
    }
}

#[cfg(feature = "device")]
fn main() -> anyhow::Result<()> {
    cli::run()
}
