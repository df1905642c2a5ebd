// CLI front-end for the conversion engine. Plays the role of the UI layer:
// argument parsing, file collection, event rendering and Ctrl-C handling.
// Contains no conversion logic.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use walkdir::WalkDir;

use converterx::{
    AppSettingsStore, BatchEvent, BatchScheduler, ConversionSettings, ImageFile, OutputFormat,
    OutputLocation, ResizeMode,
};
use converterx::utils::is_supported_input;

#[derive(Parser, Debug)]
#[command(
    name = "converterx",
    version,
    about = "Convert images between formats with resize, quality and target-size controls"
)]
struct Cli {
    /// Image files or directories to convert
    #[arg(required = true, value_name = "PATH")]
    inputs: Vec<PathBuf>,

    /// Output format (webp, avif, jpeg, png, tiff, gif, bmp, ico)
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Encoder quality (1-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Lossless encoding (WebP/AVIF)
    #[arg(long)]
    lossless: bool,

    /// Desired output size in KB (WebP/AVIF/JPEG)
    #[arg(long, value_name = "KB")]
    target_size: Option<f64>,

    /// Scale to a percentage of the original dimensions
    #[arg(long, value_name = "PCT", conflicts_with_all = ["fit_width", "fit_height", "fit_box"])]
    scale: Option<f64>,

    /// Fit to a target width in pixels, preserving aspect ratio
    #[arg(long, value_name = "PX", conflicts_with_all = ["fit_height", "fit_box"])]
    fit_width: Option<u32>,

    /// Fit to a target height in pixels, preserving aspect ratio
    #[arg(long, value_name = "PX", conflicts_with = "fit_box")]
    fit_height: Option<u32>,

    /// Fit within a bounding box, e.g. 1920x1080
    #[arg(long, value_name = "WxH")]
    fit_box: Option<String>,

    /// Allow upscaling beyond the original dimensions
    #[arg(long)]
    allow_upscaling: bool,

    /// Output directory (defaults to the configured folder)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Simultaneous conversions (1-16, defaults to the configured value)
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Recurse into directories
    #[arg(short, long)]
    recursive: bool,

    /// Do not append a suffix to output filenames
    #[arg(long)]
    no_suffix: bool,

    /// Settings file (defaults to the per-user config location)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let store = AppSettingsStore::open(
        cli.config
            .clone()
            .unwrap_or_else(default_settings_path),
    );

    let settings = build_settings(&cli, &store)?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let paths = collect_inputs(&cli.inputs, cli.recursive)?;
    let files = ImageFile::load_many(&paths);
    if files.is_empty() {
        bail!("No supported image files found");
    }

    let output_folder = match &cli.output {
        Some(folder) => folder.clone(),
        None => match &settings.output_location {
            OutputLocation::CustomFolder { folder } => folder.clone(),
            _ => converterx::core::default_output_folder(),
        },
    };
    tokio::fs::create_dir_all(&output_folder)
        .await
        .with_context(|| format!("Cannot create output folder '{}'", output_folder.display()))?;

    let workers = cli.workers.unwrap_or_else(|| store.max_concurrent_workers());
    let total_files = files.len();
    info!(
        "Converting {total_files} files to {} ({} workers) → {}",
        settings.output_format.name(),
        workers.clamp(1, 16),
        output_folder.display()
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = BatchScheduler::new(tx, workers);
    if !scheduler.start_batch(files, settings, output_folder) {
        bail!("A batch is already running");
    }

    // Ctrl-C requests cooperative cancellation; in-flight files finish
    let cancel_target = scheduler.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested; finishing in-flight conversions");
            cancel_target.cancel_all();
        }
    });

    let mut total_saved: i64 = 0;
    let mut failed_count = 0usize;
    while let Some(event) = rx.recv().await {
        match event {
            BatchEvent::FileStarted { file, index, total } => {
                info!("[{index}/{total}] {}", file.filename());
            }
            BatchEvent::FileProgress { .. } => {}
            BatchEvent::FileCompleted {
                file,
                output_path,
                bytes_saved,
            } => {
                total_saved += bytes_saved;
                info!(
                    "  {} → {} (saved {:.1} KB)",
                    file.filename(),
                    output_path.display(),
                    bytes_saved as f64 / 1024.0
                );
            }
            BatchEvent::FileFailed { file, error } => {
                warn!("  {} failed: {error}", file.filename());
            }
            BatchEvent::BatchFinished {
                total,
                successful,
                failed,
            } => {
                failed_count = failed;
                let skipped = total - successful - failed;
                info!(
                    "Done: {successful}/{total} converted, {failed} failed{} ({:.1} KB saved)",
                    if skipped > 0 {
                        format!(", {skipped} skipped")
                    } else {
                        String::new()
                    },
                    total_saved as f64 / 1024.0
                );
                break;
            }
        }
    }

    if failed_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Per-user settings file location.
fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("converterx")
        .join("settings.json")
}

/// Merges store defaults with command-line overrides.
fn build_settings(cli: &Cli, store: &AppSettingsStore) -> Result<ConversionSettings> {
    let defaults = store.defaults();

    let resize = if let Some(percent) = cli.scale {
        ResizeMode::Percentage { percent }
    } else if let Some(width) = cli.fit_width {
        ResizeMode::FitToWidth { width }
    } else if let Some(height) = cli.fit_height {
        ResizeMode::FitToHeight { height }
    } else if let Some(spec) = &cli.fit_box {
        let (max_width, max_height) = parse_box(spec)?;
        ResizeMode::FitToDimensions {
            max_width,
            max_height,
        }
    } else {
        ResizeMode::None
    };

    Ok(ConversionSettings {
        output_format: cli.format.unwrap_or(defaults.output_format),
        quality: cli.quality.unwrap_or(defaults.quality),
        lossless: cli.lossless,
        target_size_kb: cli.target_size,
        resize,
        allow_upscaling: cli.allow_upscaling,
        output_location: defaults.output_location,
        filename_template: defaults.filename_template,
        enable_filename_suffix: !cli.no_suffix && defaults.enable_filename_suffix,
        auto_increment: defaults.auto_increment,
        ..Default::default()
    })
}

/// Parses a `WIDTHxHEIGHT` bounding box; either side may be omitted
/// (`800x`, `x600`).
fn parse_box(spec: &str) -> Result<(Option<u32>, Option<u32>)> {
    let (w, h) = spec
        .split_once(['x', 'X'])
        .with_context(|| format!("Invalid bounding box '{spec}', expected WIDTHxHEIGHT"))?;
    let parse_side = |s: &str| -> Result<Option<u32>> {
        if s.is_empty() {
            return Ok(None);
        }
        let value: u32 = s
            .parse()
            .with_context(|| format!("Invalid bounding box dimension '{s}'"))?;
        Ok(Some(value))
    };
    Ok((parse_side(w)?, parse_side(h)?))
}

/// Expands files and directories into a flat list of candidate paths.
fn collect_inputs(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let walker = if recursive {
                WalkDir::new(input).follow_links(true)
            } else {
                WalkDir::new(input).max_depth(1)
            };
            for entry in walker.into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file() && is_supported_input(entry.path()) {
                    paths.push(entry.path().to_path_buf());
                }
            }
        } else if input.exists() {
            paths.push(input.clone());
        } else {
            bail!("Input does not exist: {}", input.display());
        }
    }
    paths.sort();
    Ok(paths)
}
