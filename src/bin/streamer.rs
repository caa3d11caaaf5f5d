//! Panorama Streamer
//!
//! Captures dual-fisheye frames, stitches them into equirectangular
//! panoramas and pushes a paced live stream to an RTMP ingest.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use panorama_streamer::{
    capture::{FrameSource, RawPipeSource, StillImageSource, SyntheticSource},
    compose::FrameCompositor,
    config::{default_config_path, PipelineConfig},
    constants::*,
    pipeline::Orchestrator,
    projection::{apply_tuning_key, CalibrationSet, TuningAction},
    stream::{EncoderProcess, FfmpegEncoder, NullEncoder},
};

/// Tuning step for lens parameters
const TUNING_STEP: f64 = 0.01;

/// Interval between periodic stats lines
const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "streamer", version, about = "Dual-fisheye panorama live streamer")]
struct Args {
    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Capture device index
    #[arg(long)]
    camera: Option<u32>,

    /// RTMP ingest URL
    #[arg(long)]
    url: Option<String>,

    /// Output panorama width
    #[arg(long)]
    width: Option<u32>,

    /// Output panorama height
    #[arg(long)]
    height: Option<u32>,

    /// Output frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Seam overlap in output pixels
    #[arg(long)]
    overlap: Option<u32>,

    /// Disable brightness equalization
    #[arg(long)]
    no_brightness_eq: bool,

    /// Disable color balance
    #[arg(long)]
    no_color_balance: bool,

    /// Calibration document (JSON)
    #[arg(long, default_value = CALIBRATION_FILE)]
    calibration: PathBuf,

    /// Frame source: `synthetic`, `stdin` (raw bgr24 at the capture size)
    /// or the path of a dual-fisheye still image
    #[arg(long, default_value = "synthetic")]
    source: String,

    /// Discard frames instead of launching the encoder
    #[arg(long)]
    dry_run: bool,

    /// Tune lens parameters from stdin while streaming
    #[arg(long)]
    calibrate: bool,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save_config: bool,
}

impl Args {
    /// Apply command-line overrides on top of the file configuration
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(camera) = self.camera {
            config.capture.index = camera;
        }
        if let Some(url) = &self.url {
            config.output.url = url.clone();
        }
        if let Some(width) = self.width {
            config.output.width = width;
        }
        if let Some(height) = self.height {
            config.output.height = height;
        }
        if let Some(fps) = self.fps {
            config.output.fps = fps;
        }
        if let Some(overlap) = self.overlap {
            config.processing.overlap_pixels = Some(overlap);
        }
        if self.no_brightness_eq {
            config.processing.brightness_equalization = false;
        }
        if self.no_color_balance {
            config.processing.color_balance = false;
        }
    }
}

fn open_source(spec: &str, config: &PipelineConfig) -> Result<Box<dyn FrameSource>> {
    let capture = &config.capture;
    let source: Box<dyn FrameSource> = match spec {
        "synthetic" => Box::new(SyntheticSource::new(capture.width, capture.height, capture.fps)),
        "stdin" => Box::new(RawPipeSource::new(
            std::io::stdin(),
            capture.width,
            capture.height,
        )),
        path => Box::new(
            StillImageSource::open(Path::new(path), capture.fps)
                .with_context(|| format!("Failed to open source image {}", path))?,
        ),
    };
    Ok(source)
}

/// Forward stdin keystrokes to the async side, one char at a time.
///
/// Runs on a plain thread; it is left behind at exit while blocked on input.
fn spawn_key_reader() -> Result<mpsc::UnboundedReceiver<char>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("tuning-input".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines().map_while(|l| l.ok()) {
                for key in line.chars().filter(|c| !c.is_whitespace()) {
                    if tx.send(key).is_err() {
                        return;
                    }
                }
            }
        })
        .context("Failed to spawn tuning input thread")?;
    Ok(rx)
}

/// Apply tuning keys until `q`, publishing each adjustment
async fn tune(
    compositor: Arc<FrameCompositor>,
    mut keys: mpsc::UnboundedReceiver<char>,
    document: PathBuf,
) -> Result<()> {
    println!("\n=== Lens Tuning ===");
    println!("  Left lens:  a/d cx, w/s cy, z/x radius");
    println!("  Right lens: j/l cx, i/k cy, n/m radius");
    println!("  q: save to {} and stop tuning", document.display());
    println!();

    while let Some(key) = keys.recv().await {
        match apply_tuning_key(&compositor.calibration(), key, TUNING_STEP) {
            TuningAction::Adjust(next) => match compositor.recalibrate(next) {
                Ok(()) => tracing::info!("Left {:?} / Right {:?}", next.left, next.right),
                Err(e) => tracing::warn!("Rejected adjustment: {}", e),
            },
            TuningAction::Finish => {
                compositor
                    .calibration()
                    .save(&document)
                    .context("Failed to save calibration")?;
                tracing::info!("Calibration saved to {}", document.display());
                return Ok(());
            }
            TuningAction::Ignore => {}
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!("Starting Panorama Streamer");

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config = PipelineConfig::load_or_default(&config_path);
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    if args.save_config {
        config
            .save(&config_path)
            .with_context(|| format!("Failed to save {}", config_path.display()))?;
        tracing::info!("Configuration saved to {}", config_path.display());
    }

    if args.calibrate && args.source == "stdin" {
        anyhow::bail!(
            "--calibrate reads keys from stdin and cannot be combined with --source stdin"
        );
    }

    let calibration = CalibrationSet::load_or_default(&args.calibration);
    let source = open_source(&args.source, &config)?;

    let encoder: Box<dyn EncoderProcess> = if args.dry_run {
        Box::new(NullEncoder::new())
    } else {
        Box::new(FfmpegEncoder::new())
    };

    tracing::info!(
        "Capture device {} at {}x{}@{}, streaming {}x{}@{} to {}",
        config.capture.index,
        config.capture.width,
        config.capture.height,
        config.capture.fps,
        config.output.width,
        config.output.height,
        config.output.fps,
        config.output.url
    );

    let mut pipeline = Orchestrator::new(&config, calibration, encoder)
        .context("Failed to build pipeline")?;
    pipeline.start(source).context("Failed to start pipeline")?;

    let tuning = if args.calibrate {
        let keys = spawn_key_reader()?;
        let compositor = pipeline.compositor().clone();
        let document = args.calibration.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = tune(compositor, keys, document).await {
                tracing::error!("Tuning stopped: {:#}", e);
            }
        }))
    } else {
        None
    };

    let forward_period = Duration::from_secs_f64(0.5 / config.output.fps as f64);
    let mut forward_tick = tokio::time::interval(forward_period);
    forward_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stats_tick = tokio::time::interval(STATS_INTERVAL);
    stats_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tracing::info!("Streaming - press Ctrl+C to stop");

    let outcome: Result<()> = loop {
        tokio::select! {
            _ = forward_tick.tick() => {
                if let Err(e) = pipeline.forward() {
                    break Err(e).context("Stream path failed");
                }
            }
            _ = stats_tick.tick() => {
                let stats = pipeline.stats();
                tracing::info!(
                    "Stats: {} captured, {} read failures, {} forwarded, {} written, \
                     {} dropped, {} encoder restarts",
                    stats.frames_captured,
                    stats.read_failures,
                    stats.frames_forwarded,
                    stats.sink.frames_written,
                    stats.sink.frames_dropped,
                    stats.sink_restarts
                );
            }
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    tracing::warn!("Signal handler failed: {}", e);
                }
                tracing::info!("Shutting down");
                break Ok(());
            }
        }
    };

    if let Some(task) = tuning {
        task.abort();
    }
    pipeline.shutdown();
    outcome
}
