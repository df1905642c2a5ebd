use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use crate::utils::ConverterError;

/// Supported output image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    WebP,
    Avif,
    Jpeg,
    Png,
    Tiff,
    Gif,
    Bmp,
    Ico,
}

/// File extensions the conversion engine accepts as input.
///
/// AVIF is intentionally absent: the bundled decoders cannot read it, so
/// listing it would only defer the failure from file selection to decode.
pub const SUPPORTED_INPUT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif", "gif",
];

impl OutputFormat {
    /// Get the default quality value for this format
    pub fn default_quality(&self) -> u8 {
        match self {
            Self::Jpeg => 85,
            Self::WebP => 80,
            Self::Avif => 70,
            // Fixed-size or compression-level formats
            _ => 100,
        }
    }

    /// Uppercase name used in filename templates and log output
    pub fn name(&self) -> &'static str {
        match self {
            Self::WebP => "WEBP",
            Self::Avif => "AVIF",
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Tiff => "TIFF",
            Self::Gif => "GIF",
            Self::Bmp => "BMP",
            Self::Ico => "ICO",
        }
    }

    /// Get file extensions associated with this format
    pub fn extensions(&self) -> &[&str] {
        match self {
            Self::WebP => &["webp"],
            Self::Avif => &["avif"],
            Self::Jpeg => &["jpg", "jpeg"],
            Self::Png => &["png"],
            Self::Tiff => &["tiff", "tif"],
            Self::Gif => &["gif"],
            Self::Bmp => &["bmp"],
            Self::Ico => &["ico"],
        }
    }

    /// Get the primary extension for this format
    pub fn primary_extension(&self) -> &str {
        self.extensions()[0]
    }

    /// Whether the encoder for this format takes a variable quality parameter.
    pub fn supports_quality(&self) -> bool {
        matches!(self, Self::WebP | Self::Avif | Self::Jpeg)
    }

    /// Whether the target-size search can drive this format's encoder.
    ///
    /// PNG, BMP, GIF and ICO have no quality knob; TIFF is written without
    /// one by this codec, so re-encoding at a different "quality" would
    /// produce identical bytes.
    pub fn supports_target_size(&self) -> bool {
        self.supports_quality()
    }
}

impl FromStr for OutputFormat {
    type Err = ConverterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "webp" => Ok(Self::WebP),
            "avif" => Ok(Self::Avif),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "tiff" | "tif" => Ok(Self::Tiff),
            "gif" => Ok(Self::Gif),
            "bmp" => Ok(Self::Bmp),
            "ico" => Ok(Self::Ico),
            other => Err(ConverterError::format(format!(
                "Unsupported image format: {}", other
            ))),
        }
    }
}

/// Check whether `path` has an extension the engine can decode.
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_INPUT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_extensions_case_insensitively() {
        assert_eq!("WebP".parse::<OutputFormat>().ok(), Some(OutputFormat::WebP));
        assert_eq!("JPG".parse::<OutputFormat>().ok(), Some(OutputFormat::Jpeg));
        assert_eq!("tif".parse::<OutputFormat>().ok(), Some(OutputFormat::Tiff));
        assert!("heic".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn target_size_only_for_variable_quality_formats() {
        assert!(OutputFormat::Jpeg.supports_target_size());
        assert!(OutputFormat::WebP.supports_target_size());
        assert!(OutputFormat::Avif.supports_target_size());
        assert!(!OutputFormat::Png.supports_target_size());
        assert!(!OutputFormat::Bmp.supports_target_size());
        assert!(!OutputFormat::Gif.supports_target_size());
        assert!(!OutputFormat::Ico.supports_target_size());
    }

    #[test]
    fn input_support_by_extension() {
        assert!(is_supported_input(&PathBuf::from("photo.JPG")));
        assert!(is_supported_input(&PathBuf::from("scan.tif")));
        assert!(!is_supported_input(&PathBuf::from("clip.avif")));
        assert!(!is_supported_input(&PathBuf::from("noext")));
    }
}
