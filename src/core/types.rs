//! Core types for conversion settings and results.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::{OutputFormat, ValidationError};

/// How output pixel dimensions are derived from the original.
///
/// Geometry parameters of zero (or an empty bounding box) are treated as a
/// no-op: the resize calculator returns the original dimensions unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ResizeMode {
    None,
    Percentage { percent: f64 },
    FitToWidth { width: u32 },
    FitToHeight { height: u32 },
    #[serde(rename_all = "camelCase")]
    FitToDimensions {
        max_width: Option<u32>,
        max_height: Option<u32>,
    },
}

/// Where converted files are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum OutputLocation {
    CustomFolder { folder: PathBuf },
    SameAsSource,
    /// The UI asks the user per run; the chosen folder must be resolved
    /// before the batch starts.
    #[serde(rename_all = "camelCase")]
    AskEveryTime { resolved_folder: PathBuf },
}

/// Filename suffix template for output files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "camelCase")]
pub enum FilenameTemplate {
    /// `photo` → `photo_converted`
    Converted,
    /// `photo` → `photo_WEBP`
    Format,
    /// `photo` → `photo_Q85`
    Quality,
    /// User-provided suffix; a leading underscore is added when missing.
    Custom { suffix: String },
}

impl FilenameTemplate {
    /// Apply the template to a filename stem.
    pub fn apply(&self, stem: &str, format: OutputFormat, quality: u8, enabled: bool) -> String {
        if !enabled {
            return stem.to_string();
        }
        match self {
            Self::Converted => format!("{stem}_converted"),
            Self::Format => format!("{stem}_{}", format.name()),
            Self::Quality => format!("{stem}_Q{quality}"),
            Self::Custom { suffix } => {
                if suffix.is_empty() {
                    stem.to_string()
                } else if suffix.starts_with('_') {
                    format!("{stem}{suffix}")
                } else {
                    format!("{stem}_{suffix}")
                }
            }
        }
    }
}

/// GIF palette dithering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GifDithering {
    #[serde(rename = "floyd")]
    FloydSteinberg,
    #[serde(rename = "none")]
    None,
}

/// How a non-square image is made square before ICO encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IcoSquareMode {
    /// Pad with transparency to the larger side, centering the original.
    Pad,
    /// Crop the center square of the smaller side.
    Crop,
}

/// Settings for one conversion attempt.
///
/// Captured by value when a batch starts; the snapshot is never mutated, so
/// later edits in the UI cannot affect in-flight work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionSettings {
    pub output_format: OutputFormat,
    /// Encoder quality (1-100) for formats that take one
    pub quality: u8,
    /// Lossless mode for WebP/AVIF
    pub lossless: bool,
    /// Ancillary metadata is not carried through re-encoding by the codecs
    /// in this pipeline; EXIF orientation is always baked into the pixels.
    pub keep_metadata: bool,
    /// PNG compression level (0-9)
    pub png_compression: u8,
    /// Desired output size in kilobytes; drives the quality search for
    /// formats with a variable-quality encoder
    pub target_size_kb: Option<f64>,
    /// WebP encoder effort (0-6)
    pub webp_method: i32,
    /// AVIF encoder speed (1-10)
    pub avif_speed: u8,
    pub gif_dithering: GifDithering,
    /// Square icon dimension (16-256)
    pub ico_size: u32,
    pub ico_square_mode: IcoSquareMode,
    pub resize: ResizeMode,
    pub allow_upscaling: bool,
    pub output_location: OutputLocation,
    pub filename_template: FilenameTemplate,
    pub enable_filename_suffix: bool,
    /// Append `_1`, `_2`, ... instead of overwriting an existing output
    pub auto_increment: bool,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::WebP,
            quality: 85,
            lossless: false,
            keep_metadata: true,
            png_compression: 6,
            target_size_kb: None,
            webp_method: 6,
            avif_speed: 4,
            gif_dithering: GifDithering::FloydSteinberg,
            ico_size: 256,
            ico_square_mode: IcoSquareMode::Pad,
            resize: ResizeMode::None,
            allow_upscaling: false,
            output_location: OutputLocation::CustomFolder {
                folder: default_output_folder(),
            },
            filename_template: FilenameTemplate::Converted,
            enable_filename_suffix: true,
            auto_increment: true,
        }
    }
}

impl ConversionSettings {
    /// Validates parameter ranges.
    ///
    /// Called at the settings boundary (CLI, settings store) so the
    /// conversion path never sees out-of-range values.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.quality == 0 || self.quality > 100 {
            return Err(ValidationError::settings(format!(
                "Invalid quality value: {}. Must be between 1 and 100",
                self.quality
            )));
        }
        if self.png_compression > 9 {
            return Err(ValidationError::settings(format!(
                "Invalid PNG compression level: {}. Must be between 0 and 9",
                self.png_compression
            )));
        }
        if !(0..=6).contains(&self.webp_method) {
            return Err(ValidationError::settings(format!(
                "Invalid WebP method: {}. Must be between 0 and 6",
                self.webp_method
            )));
        }
        if !(1..=10).contains(&self.avif_speed) {
            return Err(ValidationError::settings(format!(
                "Invalid AVIF speed: {}. Must be between 1 and 10",
                self.avif_speed
            )));
        }
        if !(16..=256).contains(&self.ico_size) {
            return Err(ValidationError::settings(format!(
                "Invalid ICO size: {}. Must be between 16 and 256",
                self.ico_size
            )));
        }
        if let Some(kb) = self.target_size_kb {
            if !kb.is_finite() || kb <= 0.0 {
                return Err(ValidationError::settings(format!(
                    "Invalid target size: {} KB. Must be positive",
                    kb
                )));
            }
        }
        Ok(())
    }
}

/// Default output folder: `Downloads/Converted` under the user profile.
pub fn default_output_folder() -> PathBuf {
    dirs::download_dir()
        .map(|d| d.join("Converted"))
        .unwrap_or_else(|| PathBuf::from("Converted"))
}

/// Outcome of the target-size search for one conversion, as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SizeTargetStatus {
    /// No target size was requested (or the format has no quality knob)
    NotRequested,
    /// Output landed within tolerance of the target
    Achieved,
    /// Search converged outside tolerance; closest result was kept
    ClosestMatch,
    /// Even the floor quality exceeded the target; floor output was kept.
    /// A degraded success, not a failure.
    NotAchievable,
}

/// Result of a single successful conversion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOutcome {
    /// Human-readable status, including elapsed seconds
    pub message: String,
    /// Path the output was written to
    pub output_path: PathBuf,
    /// Output size in bytes
    pub output_size: u64,
    /// Encoder quality actually used, when the format takes one
    pub quality_used: Option<u8>,
    pub size_target: SizeTargetStatus,
}
