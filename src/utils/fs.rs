//! Filesystem helpers: output path generation, template application, and
//! collision handling.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::{ConversionSettings, ImageFile, OutputLocation};
use crate::utils::{ConverterError, ConverterResult};

/// Get file size in bytes
pub fn get_file_size(path: impl AsRef<Path>) -> ConverterResult<u64> {
    std::fs::metadata(path.as_ref())
        .map(|m| m.len())
        .map_err(|e| ConverterError::io(format!("Failed to get file size: {}", e)))
}

/// Creates the parent directory of `path` if it does not exist.
pub fn ensure_parent_dir(path: &Path) -> ConverterResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConverterError::io(format!("Cannot create output directory: {}", e))
        })?;
    }
    Ok(())
}

/// Output filename (stem with suffix template applied, plus the format's
/// primary extension).
pub fn output_file_name(file: &ImageFile, settings: &ConversionSettings) -> String {
    let stem = file
        .path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let stem = settings.filename_template.apply(
        stem,
        settings.output_format,
        settings.quality,
        settings.enable_filename_suffix,
    );
    format!("{stem}.{}", settings.output_format.primary_extension())
}

/// The output folder implied by the settings' output-location mode.
pub fn resolve_output_folder(file: &ImageFile, settings: &ConversionSettings) -> PathBuf {
    match &settings.output_location {
        OutputLocation::CustomFolder { folder } => folder.clone(),
        OutputLocation::SameAsSource => file
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
        OutputLocation::AskEveryTime { resolved_folder } => resolved_folder.clone(),
    }
}

/// Finds the next available filename by appending `_1`, `_2`, ...
///
/// Falls back to a timestamp suffix after 9999 attempts.
pub fn next_available_path(base: &Path) -> PathBuf {
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let extension = base
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let folder = base.parent().unwrap_or_else(|| Path::new("."));

    for counter in 1..=9999u32 {
        let candidate = folder.join(format!("{stem}_{counter}{extension}"));
        if !candidate.exists() {
            return candidate;
        }
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    folder.join(format!("{stem}_{timestamp}{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FilenameTemplate;
    use crate::utils::OutputFormat;

    fn image_file(path: &str) -> ImageFile {
        ImageFile {
            path: PathBuf::from(path),
            size_bytes: 1,
            width: None,
            height: None,
            format: None,
        }
    }

    #[test]
    fn output_name_applies_template_and_extension() {
        let file = image_file("/pics/holiday.jpg");
        let settings = ConversionSettings::default();
        assert_eq!(output_file_name(&file, &settings), "holiday_converted.webp");

        let settings = ConversionSettings {
            output_format: OutputFormat::Jpeg,
            filename_template: FilenameTemplate::Quality,
            quality: 70,
            ..Default::default()
        };
        assert_eq!(output_file_name(&file, &settings), "holiday_Q70.jpg");
    }

    #[test]
    fn resolves_folder_per_location_mode() {
        let file = image_file("/pics/holiday.jpg");

        let settings = ConversionSettings {
            output_location: OutputLocation::CustomFolder {
                folder: PathBuf::from("/out"),
            },
            ..Default::default()
        };
        assert_eq!(resolve_output_folder(&file, &settings), PathBuf::from("/out"));

        let settings = ConversionSettings {
            output_location: OutputLocation::SameAsSource,
            ..Default::default()
        };
        assert_eq!(resolve_output_folder(&file, &settings), PathBuf::from("/pics"));

        let settings = ConversionSettings {
            output_location: OutputLocation::AskEveryTime {
                resolved_folder: PathBuf::from("/chosen"),
            },
            ..Default::default()
        };
        assert_eq!(resolve_output_folder(&file, &settings), PathBuf::from("/chosen"));
    }

    #[test]
    fn increments_until_free() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("photo_converted.webp");
        std::fs::write(&base, b"x").unwrap();
        std::fs::write(dir.path().join("photo_converted_1.webp"), b"x").unwrap();

        let next = next_available_path(&base);
        assert_eq!(next, dir.path().join("photo_converted_2.webp"));
    }
}
