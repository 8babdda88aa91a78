//! petroflux CLI — Petrosian-radius aperture photometry on grayscale images.

use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Args, Parser, Subcommand};

use petroflux::{
    measure_sources, Centroid, CheckImage, EllipseShape, Frame, MeasureConfig, MeasurementFrame,
    PixelBuffer, RadiusConfig, Source,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "petroflux")]
#[command(about = "Measure Petrosian radii and aperture photometry of detected sources")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure sources on an image.
    Measure(CliMeasureArgs),

    /// Render a synthetic Gaussian field with its source list, for testing.
    Synth(CliSynthArgs),
}

#[derive(Debug, Clone, Args)]
struct CliMeasureArgs {
    /// Path to the input image (any format readable as grayscale).
    #[arg(long)]
    image: PathBuf,

    /// Path to the source list (JSON array of sources).
    #[arg(long)]
    sources: PathBuf,

    /// Path to write measurement results (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Optional variance map, same dimensions as the image.
    #[arg(long)]
    variance: Option<PathBuf>,

    /// Pixels with variance at or above this threshold are treated as bad.
    #[arg(long, default_value = "inf")]
    variance_threshold: f64,

    /// Optional label raster; non-zero pixels belong to detected sources.
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Surface-brightness ratio at which the radius scan converges.
    #[arg(long, default_value = "0.2")]
    eta: f64,

    /// Scale factor applied to the converged Petrosian radius.
    #[arg(long, default_value = "2.0")]
    factor: f64,

    /// Minimum aperture radius in units of the ellipse scale.
    #[arg(long, default_value = "3.5")]
    min_radius: f64,

    /// Magnitude zero point.
    #[arg(long, default_value = "0.0")]
    zeropoint: f64,

    /// Detector gain in e-/ADU for the Poisson error term; 0 disables it.
    #[arg(long, default_value = "0.0")]
    gain: f64,

    /// Disable point-symmetry recovery of bad pixels.
    #[arg(long)]
    no_symmetry: bool,

    /// Path to write a check image of the measured apertures (PNG).
    #[arg(long)]
    check_image: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct CliSynthArgs {
    /// Path to write the synthetic image (PNG).
    #[arg(long)]
    out: PathBuf,

    /// Path to write the matching source list (JSON).
    #[arg(long)]
    sources_out: PathBuf,

    /// Image width in pixels.
    #[arg(long, default_value = "512")]
    width: usize,

    /// Image height in pixels.
    #[arg(long, default_value = "512")]
    height: usize,

    /// Sources per row and column of the grid.
    #[arg(long, default_value = "4")]
    grid: usize,

    /// Gaussian sigma of each source in pixels.
    #[arg(long, default_value = "3.0")]
    sigma: f64,

    /// Peak amplitude of each source.
    #[arg(long, default_value = "200.0")]
    amplitude: f64,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Measure(args) => run_measure(&args),
        Commands::Synth(args) => run_synth(&args),
    }
}

fn load_buffer(path: &PathBuf) -> CliResult<PixelBuffer> {
    let img = image::open(path)
        .map_err(|e| -> CliError { format!("failed to open {}: {}", path.display(), e).into() })?;
    Ok(PixelBuffer::from_gray(&img.to_luma8()))
}

// ── measure ────────────────────────────────────────────────────────────

fn run_measure(args: &CliMeasureArgs) -> CliResult<()> {
    tracing::info!("loading image: {}", args.image.display());
    let image = load_buffer(&args.image)?;
    let (width, height) = (image.width(), image.height());
    tracing::info!("image size: {}x{}", width, height);

    let mut frame = Frame::from_image(image);
    frame.variance_threshold = args.variance_threshold;
    frame.gain = args.gain;
    if let Some(path) = &args.variance {
        frame.variance = Some(load_buffer(path)?);
    }
    if let Some(path) = &args.labels {
        frame.labels = Some(load_buffer(path)?);
    }
    frame.validate()?;

    let sources: Vec<Source> = {
        let text = std::fs::read_to_string(&args.sources).map_err(|e| -> CliError {
            format!("failed to read {}: {}", args.sources.display(), e).into()
        })?;
        serde_json::from_str(&text)?
    };
    tracing::info!("loaded {} sources", sources.len());

    let config = MeasureConfig {
        radius: RadiusConfig {
            eta: args.eta,
            factor: args.factor,
            min_radius: args.min_radius,
        },
        zero_point: args.zeropoint,
        use_symmetry: !args.no_symmetry,
    };

    // One raster per measurement frame; the CLI measures a single frame.
    let check = args
        .check_image
        .as_ref()
        .map(|_| vec![Mutex::new(CheckImage::new(width, height))]);

    let frames = [MeasurementFrame::untransformed(frame.clone())];
    let results = measure_sources(&sources, &frame, &frames, &config, check.as_deref())?;

    let converged = results.iter().filter(|r| r.radius.converged).count();
    tracing::info!(
        "measured {} sources ({} converged radius scans)",
        results.len(),
        converged
    );

    let json = serde_json::to_string_pretty(&results)?;
    std::fs::write(&args.out, &json)?;
    tracing::info!("results written to {}", args.out.display());

    if let (Some(path), Some(check)) = (&args.check_image, check) {
        let raster = check
            .into_iter()
            .next()
            .ok_or("missing check image raster")?;
        let raster = raster.into_inner().map_err(|_| "check image lock poisoned")?;
        raster.save(path)?;
        tracing::info!("check image written to {}", path.display());
    }

    Ok(())
}

// ── synth ──────────────────────────────────────────────────────────────

fn run_synth(args: &CliSynthArgs) -> CliResult<()> {
    let pitch_x = args.width as f64 / (args.grid as f64 + 1.0);
    let pitch_y = args.height as f64 / (args.grid as f64 + 1.0);

    let mut sources = Vec::new();
    for row in 0..args.grid {
        for col in 0..args.grid {
            let cx = pitch_x * (col as f64 + 1.0);
            let cy = pitch_y * (row as f64 + 1.0);
            sources.push(Source {
                id: (row * args.grid + col) as u32,
                centroid: Centroid { x: cx, y: cy },
                shape: EllipseShape::from_axes(args.sigma, args.sigma, 0.0)?,
                pixels: Vec::new(),
                frame_centroids: Vec::new(),
            });
        }
    }

    let sigma2 = args.sigma * args.sigma;
    let image = PixelBuffer::from_fn(args.width, args.height, |x, y| {
        sources
            .iter()
            .map(|s| {
                let dx = x as f64 - s.centroid.x;
                let dy = y as f64 - s.centroid.y;
                args.amplitude * (-0.5 * (dx * dx + dy * dy) / sigma2).exp()
            })
            .sum()
    });

    let peak = image.as_slice().iter().cloned().fold(0.0f64, f64::max);
    let scale = if peak > 0.0 { 255.0 / peak } else { 0.0 };
    let mut png = image::GrayImage::new(args.width as u32, args.height as u32);
    for y in 0..args.height {
        for x in 0..args.width {
            let v = (image.value(x as i64, y as i64) * scale).round().clamp(0.0, 255.0);
            png.put_pixel(x as u32, y as u32, image::Luma([v as u8]));
        }
    }
    png.save(&args.out)?;
    tracing::info!("synthetic image written to {}", args.out.display());

    let json = serde_json::to_string_pretty(&sources)?;
    std::fs::write(&args.sources_out, &json)?;
    tracing::info!(
        "{} sources written to {}",
        sources.len(),
        args.sources_out.display()
    );

    Ok(())
}
