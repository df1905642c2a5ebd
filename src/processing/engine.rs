//! Single-file conversion pipeline.
//!
//! decode → EXIF orientation → resize → format preparation → encode (plain
//! quality or target-size search) → write. This is the single error
//! boundary for one file: every failure below it surfaces as a
//! [`ConverterError`] result, never as a panic or an escaped fault.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, warn};

use crate::core::{ConversionOutcome, ConversionSettings, SizeTargetStatus};
use crate::processing::target_size::{self, SearchOutcome, MIN_QUALITY};
use crate::processing::{codec, prepare, resize};
use crate::utils::{ensure_parent_dir, ConverterError, ConverterResult};

// Coarse per-file progress milestones
const PROGRESS_DECODED: u8 = 25;
const PROGRESS_TRANSFORMED: u8 = 50;
const PROGRESS_ENCODED: u8 = 90;
const PROGRESS_DONE: u8 = 100;

/// A per-file converter the batch scheduler can drive.
///
/// The production implementation is [`ConversionEngine`]; tests substitute
/// stubs to exercise scheduling behavior without real pixel work.
pub trait FileConverter: Send + Sync {
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        settings: &ConversionSettings,
        progress: &(dyn Fn(u8) + Send + Sync),
    ) -> ConverterResult<ConversionOutcome>;
}

/// The real conversion engine backed by the image codecs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConversionEngine;

impl ConversionEngine {
    pub fn new() -> Self {
        Self
    }
}

impl FileConverter for ConversionEngine {
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        settings: &ConversionSettings,
        progress: &(dyn Fn(u8) + Send + Sync),
    ) -> ConverterResult<ConversionOutcome> {
        convert_file(input, output, settings, progress)
    }
}

/// Converts one file and writes the result to `output`.
pub fn convert_file(
    input: &Path,
    output: &Path,
    settings: &ConversionSettings,
    progress: &(dyn Fn(u8) + Send + Sync),
) -> ConverterResult<ConversionOutcome> {
    let started = Instant::now();

    let img = codec::decode_oriented(input)?;
    progress(PROGRESS_DECODED);

    let img = resize::apply_resize(img, settings);
    let img = prepare::prepare_for_format(img, settings);
    progress(PROGRESS_TRANSFORMED);

    let (buf, quality_used, size_target, note) = match settings.target_size_kb {
        Some(target_kb) if settings.output_format.supports_target_size() => {
            let (buf, outcome) = target_size::compress_to_target(&img, settings, target_kb)?;
            match outcome {
                SearchOutcome::Achieved { quality, .. } => (
                    buf,
                    Some(quality),
                    SizeTargetStatus::Achieved,
                    format!("Compressed to target size (quality {quality})"),
                ),
                SearchOutcome::ClosestMatch { quality, size } => (
                    buf,
                    Some(quality),
                    SizeTargetStatus::ClosestMatch,
                    format!(
                        "Closest match at quality {quality} ({:.1} KB)",
                        size as f64 / 1024.0
                    ),
                ),
                SearchOutcome::NotAchievable {
                    size,
                    suggested_scale,
                } => {
                    warn!(
                        "'{}': target size not achievable ({:.1} KB at minimum quality)",
                        input.display(),
                        size as f64 / 1024.0
                    );
                    (
                        buf,
                        Some(MIN_QUALITY),
                        SizeTargetStatus::NotAchievable,
                        format!(
                            "Target size not achievable at any quality; consider resizing to \
                             ~{:.0}% ({:.1} KB at minimum quality)",
                            suggested_scale * 100.0,
                            size as f64 / 1024.0
                        ),
                    )
                }
            }
        }
        requested => {
            if requested.is_some() {
                debug!(
                    "Target size ignored: {} has no variable-quality encoder",
                    settings.output_format.name()
                );
            }
            let buf = codec::encode(&img, settings, None)?;
            let quality = settings
                .output_format
                .supports_quality()
                .then_some(settings.quality);
            (
                buf,
                quality,
                SizeTargetStatus::NotRequested,
                "Converted successfully".to_string(),
            )
        }
    };
    progress(PROGRESS_ENCODED);

    ensure_parent_dir(output)?;
    std::fs::write(output, &buf)
        .map_err(|e| ConverterError::io(format!("Cannot write '{}': {e}", output.display())))?;
    progress(PROGRESS_DONE);

    let output_size = buf.len() as u64;
    let elapsed = started.elapsed().as_secs_f64();
    debug!(
        "'{}' → '{}' ({} B, {:.2}s)",
        input.display(),
        output.display(),
        output_size,
        elapsed
    );

    Ok(ConversionOutcome {
        message: format!("{note} ({elapsed:.2}s)"),
        output_path: output.to_path_buf(),
        output_size,
        quality_used,
        size_target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResizeMode;
    use crate::utils::OutputFormat;
    use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};

    fn no_progress() -> impl Fn(u8) + Send + Sync {
        |_| {}
    }

    fn write_sample(dir: &Path, name: &str, w: u32, h: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 3) as u8, (y * 5) as u8, 99, 255])
        }))
        .save(&path)
        .unwrap();
        path
    }

    #[test]
    fn converts_png_to_webp_with_resize() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path(), "in.png", 80, 40);
        let output = dir.path().join("out.webp");

        let settings = ConversionSettings {
            output_format: OutputFormat::WebP,
            resize: ResizeMode::Percentage { percent: 50.0 },
            ..Default::default()
        };
        let outcome = convert_file(&input, &output, &settings, &no_progress()).unwrap();

        assert_eq!(outcome.size_target, SizeTargetStatus::NotRequested);
        assert_eq!(outcome.output_size, std::fs::metadata(&output).unwrap().len());
        let decoded = image::open(&output).unwrap();
        assert_eq!(decoded.dimensions(), (40, 20));
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path(), "in.png", 8, 8);
        let output = dir.path().join("nested/deep/out.jpg");

        let settings = ConversionSettings {
            output_format: OutputFormat::Jpeg,
            ..Default::default()
        };
        convert_file(&input, &output, &settings, &no_progress()).unwrap();
        assert!(output.exists());
    }

    #[test]
    fn rgba_to_jpeg_yields_opaque_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alpha.png");
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([50, 60, 70, 0])))
            .save(&path)
            .unwrap();
        let output = dir.path().join("alpha.jpg");

        let settings = ConversionSettings {
            output_format: OutputFormat::Jpeg,
            ..Default::default()
        };
        convert_file(&path, &output, &settings, &no_progress()).unwrap();

        let decoded = image::open(&output).unwrap();
        assert!(!decoded.color().has_alpha());
        // Fully transparent source pixels come out white (JPEG is lossy, so
        // allow a small margin)
        let px = decoded.to_rgb8().get_pixel(5, 5).0;
        assert!(px.iter().all(|&c| c > 250), "expected near-white, got {px:?}");
    }

    #[test]
    fn decode_failure_is_a_per_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.jpg");
        std::fs::write(&input, b"not a jpeg").unwrap();
        let output = dir.path().join("out.webp");

        let settings = ConversionSettings::default();
        let result = convert_file(&input, &output, &settings, &no_progress());
        assert!(matches!(result, Err(ConverterError::Decode(_))));
        assert!(!output.exists());
    }

    #[test]
    fn target_size_for_fixed_size_format_falls_back_to_plain_encode() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path(), "in.png", 16, 16);
        let output = dir.path().join("out.png");

        let settings = ConversionSettings {
            output_format: OutputFormat::Png,
            target_size_kb: Some(10.0),
            ..Default::default()
        };
        let outcome = convert_file(&input, &output, &settings, &no_progress()).unwrap();
        assert_eq!(outcome.size_target, SizeTargetStatus::NotRequested);
        assert_eq!(outcome.quality_used, None);
    }

    #[test]
    fn unreachable_target_still_writes_floor_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.png");
        DynamicImage::ImageRgba8(RgbaImage::from_fn(256, 256, |x, y| {
            let seed = x.wrapping_mul(7919).wrapping_add(y.wrapping_mul(104_729));
            Rgba([
                (seed % 251) as u8,
                (seed.wrapping_mul(31) % 241) as u8,
                (seed.wrapping_mul(17) % 239) as u8,
                255,
            ])
        }))
        .save(&path)
        .unwrap();
        let output = dir.path().join("noise.jpg");

        let settings = ConversionSettings {
            output_format: OutputFormat::Jpeg,
            target_size_kb: Some(1.0),
            ..Default::default()
        };
        let outcome = convert_file(&path, &output, &settings, &no_progress()).unwrap();
        assert_eq!(outcome.size_target, SizeTargetStatus::NotAchievable);
        assert_eq!(outcome.quality_used, Some(MIN_QUALITY));
        assert!(outcome.message.contains("consider resizing"));
        assert!(output.exists());
    }

    #[test]
    fn progress_milestones_are_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path(), "in.png", 8, 8);
        let output = dir.path().join("out.webp");

        let seen = std::sync::Mutex::new(Vec::new());
        let progress = |p: u8| seen.lock().unwrap().push(p);
        convert_file(&input, &output, &ConversionSettings::default(), &progress).unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec![25, 50, 90, 100]);
    }
}
