//! car-studio CLI: run one studio request (or a batch file) against a media
//! directory and print the JSON response.

use std::path::{Path, PathBuf};

use car_studio::{
    MediaStore, Operation, OverlayWheelRequest, Point, RecolorRequest, SeedRect, SegmentRequest, Studio,
    StudioConfig,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "car-studio")]
#[command(about = "Segment, recolor and dress up car photos (masks, HSV shifts, wheel overlays)")]
#[command(version)]
struct Cli {
    /// JSON config file (media root, log filter, segmenter defaults).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Media directory; overrides the config file.
    #[arg(long, global = true)]
    media_root: Option<PathBuf>,

    /// Show the produced image in a window (ESC or close to exit).
    #[cfg(feature = "preview")]
    #[arg(long, global = true)]
    preview: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Foreground mask of a car photo.
    Segment(CliSegmentArgs),

    /// Shift hue/saturation/value inside a mask.
    Recolor(CliRecolorArgs),

    /// Perspective-place a wheel image onto four points of a photo.
    Overlay(CliOverlayArgs),

    /// Copy an upload into the media store and report its size.
    Ingest {
        /// File to ingest.
        file: PathBuf,
        /// Store category.
        #[arg(long, default_value = "uploads")]
        category: String,
    },

    /// Run a JSON array of operations in parallel.
    Batch {
        /// JSON file with `[{"op": "segment", ...}, ...]`.
        file: PathBuf,
        /// Worker threads; overrides the config file.
        #[arg(long)]
        threads: Option<usize>,
    },
}

#[derive(Debug, Clone, Args)]
struct CliSegmentArgs {
    /// Stored photo reference.
    image: String,

    /// Seed rectangle `x,y,width,height` in pixels (default: inset heuristic).
    #[arg(long, value_parser = parse_rect)]
    rect: Option<SeedRect>,
}

#[derive(Debug, Clone, Args)]
struct CliRecolorArgs {
    /// Stored photo reference.
    image: String,

    /// Stored mask reference (any value > 0 is inside).
    mask: String,

    /// Hue shift in OpenCV units (0..180 wraps).
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    dh: f32,

    /// Relative saturation change (0.2 = +20%).
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    ds: f32,

    /// Relative value change.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    dv: f32,
}

#[derive(Debug, Clone, Args)]
struct CliOverlayArgs {
    /// Stored base photo reference.
    base: String,

    /// Stored wheel reference (must carry alpha).
    wheel: String,

    /// Destination corners `x,y` in TL TR BR BL order.
    #[arg(long, num_args = 4, value_parser = parse_point, allow_hyphen_values = true)]
    pts: Vec<Point>,

    /// Also store the base annotated with the picked points.
    #[arg(long)]
    guide: bool,
}

fn parse_numbers(s: &str, expect: usize) -> Result<Vec<f64>, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != expect {
        return Err(format!("expected {expect} comma-separated numbers, got {s:?}"));
    }
    parts
        .iter()
        .map(|p| p.parse::<f64>().map_err(|e| format!("{p:?}: {e}")))
        .collect()
}

fn parse_point(s: &str) -> Result<Point, String> {
    let v = parse_numbers(s, 2)?;
    Ok(Point::new(v[0], v[1]))
}

fn parse_rect(s: &str) -> Result<SeedRect, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!("expected x,y,width,height, got {s:?}"));
    }
    let mut v = [0i64; 4];
    for (slot, p) in v.iter_mut().zip(&parts) {
        *slot = p.parse().map_err(|e| format!("{p:?}: {e}"))?;
    }
    Ok(SeedRect { x: v[0], y: v[1], width: v[2], height: v[3] })
}

fn load_config(cli: &Cli) -> CliResult<StudioConfig> {
    let mut config = match &cli.config {
        Some(path) => StudioConfig::load(path)?,
        None => StudioConfig::default(),
    };
    if let Some(root) = &cli.media_root {
        config.media_root = root.clone();
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(feature = "preview")]
fn maybe_preview(cli: &Cli, store: &MediaStore, reference: &str) -> CliResult<()> {
    use car_studio::ImageSource;
    if cli.preview {
        let image = store.resolve_color(reference)?;
        car_studio::preview::show(reference, &image)?;
    }
    Ok(())
}

#[cfg(not(feature = "preview"))]
fn maybe_preview(_cli: &Cli, _store: &MediaStore, _reference: &str) -> CliResult<()> {
    Ok(())
}

fn run_batch(studio: &Studio<MediaStore>, file: &Path, threads: Option<usize>) -> CliResult<()> {
    let text = std::fs::read_to_string(file).map_err(|e| format!("{}: {e}", file.display()))?;
    let ops: Vec<Operation> = serde_json::from_str(&text).map_err(|e| format!("{}: {e}", file.display()))?;
    info!(count = ops.len(), "loaded batch {}", file.display());
    let outcomes = studio.run_batch(&ops, threads)?;
    print_json(&outcomes)
}

fn run(cli: &Cli, config: &StudioConfig) -> CliResult<()> {
    let store = MediaStore::new(&config.media_root);
    let studio = Studio::new(store, config.segment.clone());

    // Single requests go through `Studio::run` so the CLI answers exactly
    // like a batch entry would.
    let op = match &cli.command {
        Commands::Segment(a) => Operation::Segment(SegmentRequest { image_path: a.image.clone(), rect: a.rect }),
        Commands::Recolor(a) => Operation::Recolor(RecolorRequest {
            image_path: a.image.clone(),
            mask_path: a.mask.clone(),
            dh: a.dh,
            ds: a.ds,
            dv: a.dv,
        }),
        Commands::Overlay(a) => Operation::OverlayWheel(OverlayWheelRequest {
            base_image_path: a.base.clone(),
            wheel_image_path: a.wheel.clone(),
            dst_pts: a.pts.clone(),
            guide: a.guide,
        }),
        Commands::Ingest { file, category } => {
            let bytes = std::fs::read(file).map_err(|e| format!("{}: {e}", file.display()))?;
            let name = file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            let ingested = studio.store().ingest(&bytes, &name, category)?;
            return print_json(&ingested);
        }
        Commands::Batch { file, threads } => {
            return run_batch(&studio, file, threads.or(config.batch_threads));
        }
    };

    match studio.run(&op) {
        Ok(response) => {
            print_json(&response)?;
            maybe_preview(cli, studio.store(), response.output_path())
        }
        Err(e) => {
            error!(status = e.http_status(), "request failed: {e}");
            Err(e.into())
        }
    }
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    run(&cli, &config)
}
