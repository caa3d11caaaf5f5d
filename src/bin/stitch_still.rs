//! Stitch Still
//!
//! Stitches a single dual-fisheye image into an equirectangular panorama
//! file, for checking a calibration without a camera or ingest server.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use panorama_streamer::{
    capture::load_image,
    compose::FrameCompositor,
    config::{default_config_path, PipelineConfig},
    constants::CALIBRATION_FILE,
    projection::CalibrationSet,
};

#[derive(Parser, Debug)]
#[command(name = "stitch-still", version, about = "Stitch one dual-fisheye image")]
struct Args {
    /// Dual-fisheye input image
    input: PathBuf,

    /// Equirectangular output image (format from the extension)
    output: PathBuf,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Calibration document (JSON)
    #[arg(long, default_value = CALIBRATION_FILE)]
    calibration: PathBuf,

    /// Output width
    #[arg(long)]
    width: Option<u32>,

    /// Output height
    #[arg(long)]
    height: Option<u32>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config = PipelineConfig::load_or_default(&config_path);
    if let Some(width) = args.width {
        config.output.width = width;
    }
    if let Some(height) = args.height {
        config.output.height = height;
    }
    config.validate().context("Invalid configuration")?;

    let calibration = CalibrationSet::load_or_default(&args.calibration);
    let compositor =
        FrameCompositor::new(&config, calibration).context("Failed to build compositor")?;

    let raw = load_image(&args.input).context("Failed to read input image")?;
    tracing::info!("Stitching {} ({}x{})", args.input.display(), raw.width, raw.height);

    let panorama = compositor.process(&raw);
    let image = panorama
        .to_rgb_image()
        .context("Stitched frame is not 3-channel")?;
    image
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    tracing::info!(
        "Wrote {}x{} panorama to {}",
        panorama.width,
        panorama.height,
        args.output.display()
    );
    Ok(())
}
