//! The immutable record for a file in the conversion queue.

use std::fmt;
use std::path::{Path, PathBuf};

use image::ImageReader;
use serde::Serialize;
use tracing::warn;

use crate::utils::{is_supported_input, ConverterResult, ValidationError};

/// An image file queued for conversion.
///
/// Created once when the file is added to a queue and never mutated.
/// Equality and hashing are by value so the scheduler can use it as a map
/// key for in-flight work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Source format tag as detected from the file contents (e.g. "JPEG")
    pub format: Option<String>,
}

impl ImageFile {
    /// Reads filesystem metadata and the image header for `path`.
    ///
    /// A file whose dimensions cannot be read is still accepted (the decode
    /// failure, if real, surfaces later as a per-file conversion error).
    pub fn load(path: &Path) -> ConverterResult<Self> {
        let metadata = std::fs::metadata(path)
            .map_err(|_| ValidationError::path_not_found(path))?;
        if !metadata.is_file() {
            return Err(ValidationError::not_a_file(path).into());
        }

        let (dimensions, format) = match ImageReader::open(path)
            .and_then(|r| r.with_guessed_format())
        {
            Ok(reader) => {
                let format = reader.format().map(|f| format!("{f:?}").to_uppercase());
                match reader.into_dimensions() {
                    Ok(dims) => (Some(dims), format),
                    Err(e) => {
                        warn!("Could not read image header for '{}': {e}", path.display());
                        (None, format)
                    }
                }
            }
            Err(e) => {
                warn!("Could not open '{}': {e}", path.display());
                (None, None)
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            width: dimensions.map(|(w, _)| w),
            height: dimensions.map(|(_, h)| h),
            format,
        })
    }

    /// Loads every supported file in `paths`, skipping unsupported or
    /// unreadable entries with a warning.
    pub fn load_many(paths: &[PathBuf]) -> Vec<Self> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            if !is_supported_input(path) {
                warn!("Skipping unsupported file: {}", path.display());
                continue;
            }
            match Self::load(path) {
                Ok(file) => files.push(file),
                Err(e) => warn!("Skipping '{}': {e}", path.display()),
            }
        }
        files
    }

    /// Filename without the directory part.
    pub fn filename(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("<invalid>")
    }

    /// Human-readable file size (B / KB / MB).
    pub fn size_display(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = 1024 * 1024;
        if self.size_bytes < KB {
            format!("{} B", self.size_bytes)
        } else if self.size_bytes < MB {
            format!("{:.1} KB", self.size_bytes as f64 / KB as f64)
        } else {
            format!("{:.2} MB", self.size_bytes as f64 / MB as f64)
        }
    }

    /// `width × height`, or "Unknown" when the header was unreadable.
    pub fn dimensions_display(&self) -> String {
        match (self.width, self.height) {
            (Some(w), Some(h)) => format!("{w} × {h}"),
            _ => "Unknown".to_string(),
        }
    }
}

impl fmt::Display for ImageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {})",
            self.filename(),
            self.dimensions_display(),
            self.size_display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    #[test]
    fn loads_metadata_and_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.png");
        DynamicImage::ImageRgb8(RgbImage::new(12, 7))
            .save(&path)
            .unwrap();

        let file = ImageFile::load(&path).unwrap();
        assert_eq!(file.width, Some(12));
        assert_eq!(file.height, Some(7));
        assert_eq!(file.format.as_deref(), Some("PNG"));
        assert!(file.size_bytes > 0);
        assert_eq!(file.filename(), "sample.png");
    }

    #[test]
    fn missing_file_is_a_validation_error() {
        assert!(ImageFile::load(Path::new("/nonexistent/missing.png")).is_err());
    }

    #[test]
    fn load_many_skips_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("ok.png");
        DynamicImage::ImageRgb8(RgbImage::new(2, 2)).save(&good).unwrap();
        let bad = dir.path().join("notes.txt");
        std::fs::write(&bad, b"not an image").unwrap();

        let files = ImageFile::load_many(&[good.clone(), bad]);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, good);
    }

    #[test]
    fn size_display_units() {
        let mut file = ImageFile {
            path: PathBuf::from("a.png"),
            size_bytes: 512,
            width: None,
            height: None,
            format: None,
        };
        assert_eq!(file.size_display(), "512 B");
        file.size_bytes = 10 * 1024;
        assert_eq!(file.size_display(), "10.0 KB");
        file.size_bytes = 3 * 1024 * 1024;
        assert_eq!(file.size_display(), "3.00 MB");
    }
}
