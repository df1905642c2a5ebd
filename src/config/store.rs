//! Persistent application settings.
//!
//! Named values grouped into performance / preview / defaults categories,
//! persisted as JSON and exposed through range-validated accessors. Each
//! category has a change-notification channel; the conversion core never
//! subscribes, only UI components would.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::core::{default_output_folder, FilenameTemplate, OutputLocation};
use crate::utils::{ensure_parent_dir, ConverterError, ConverterResult, OutputFormat, ValidationError};

/// Batch processing limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceSettings {
    /// Simultaneous conversions (1-16)
    pub max_concurrent_workers: usize,
    /// Thread pool size for background work such as thumbnails (1-32)
    pub threadpool_max_threads: usize,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            max_concurrent_workers: crate::worker::DEFAULT_MAX_CONCURRENT,
            threadpool_max_threads: available.clamp(1, 32),
        }
    }
}

/// Preview subsystem tuning, persisted for the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewSettings {
    /// Preview images kept in memory (1-50)
    pub preview_cache_size: usize,
    /// Full-resolution images kept in memory (1-20)
    pub hd_cache_size: usize,
    /// Max width/height for preview rendering (720-4096)
    pub preview_max_dimension: u32,
    /// Delay before regenerating the output preview (100-2000 ms)
    pub output_preview_debounce_ms: u64,
    /// Output previews kept in memory (1-20)
    pub output_preview_cache_size: usize,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            preview_cache_size: 10,
            hd_cache_size: 2,
            preview_max_dimension: 1500,
            output_preview_debounce_ms: 250,
            output_preview_cache_size: 2,
        }
    }
}

/// Default conversion parameters applied to new sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultsSettings {
    /// Default quality (1-100)
    pub quality: u8,
    pub output_format: OutputFormat,
    pub output_location: OutputLocation,
    pub enable_filename_suffix: bool,
    pub filename_template: FilenameTemplate,
    pub auto_increment: bool,
}

impl Default for DefaultsSettings {
    fn default() -> Self {
        Self {
            quality: 85,
            output_format: OutputFormat::WebP,
            output_location: OutputLocation::CustomFolder {
                folder: default_output_folder(),
            },
            enable_filename_suffix: true,
            filename_template: FilenameTemplate::Converted,
            auto_increment: true,
        }
    }
}

/// Settings categories, for change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsCategory {
    Performance,
    Preview,
    Defaults,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredSettings {
    performance: PerformanceSettings,
    preview: PreviewSettings,
    defaults: DefaultsSettings,
}

/// JSON-backed settings store with per-category change notifications.
///
/// Not a singleton: create one at startup and inject it into the
/// components that need it.
pub struct AppSettingsStore {
    path: PathBuf,
    data: Mutex<StoredSettings>,
    performance_tx: watch::Sender<()>,
    preview_tx: watch::Sender<()>,
    defaults_tx: watch::Sender<()>,
}

impl AppSettingsStore {
    /// Opens the store at `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Settings file '{}' is corrupt ({e}); using defaults", path.display());
                    StoredSettings::default()
                }
            },
            Err(_) => {
                debug!("No settings file at '{}'; using defaults", path.display());
                StoredSettings::default()
            }
        };

        Self {
            path,
            data: Mutex::new(data),
            performance_tx: watch::channel(()).0,
            preview_tx: watch::channel(()).0,
            defaults_tx: watch::channel(()).0,
        }
    }

    /// Subscribes to change notifications for one category.
    pub fn subscribe(&self, category: SettingsCategory) -> watch::Receiver<()> {
        match category {
            SettingsCategory::Performance => self.performance_tx.subscribe(),
            SettingsCategory::Preview => self.preview_tx.subscribe(),
            SettingsCategory::Defaults => self.defaults_tx.subscribe(),
        }
    }

    /// Persists the current values to disk.
    pub fn save(&self) -> ConverterResult<()> {
        let json = serde_json::to_string_pretty(&*self.data())
            .map_err(|e| ConverterError::io(format!("Cannot serialize settings: {e}")))?;
        ensure_parent_dir(&self.path)?;
        std::fs::write(&self.path, json)
            .map_err(|e| ConverterError::io(format!("Cannot write settings: {e}")))?;
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Performance ──────────────────────────────────────────────────────

    pub fn max_concurrent_workers(&self) -> usize {
        self.data().performance.max_concurrent_workers
    }

    pub fn set_max_concurrent_workers(&self, value: usize) -> ConverterResult<()> {
        if !(1..=16).contains(&value) {
            return Err(
                ValidationError::settings("max_concurrent_workers must be between 1 and 16").into(),
            );
        }
        self.data().performance.max_concurrent_workers = value;
        self.persist_and_notify(SettingsCategory::Performance)
    }

    pub fn threadpool_max_threads(&self) -> usize {
        self.data().performance.threadpool_max_threads
    }

    pub fn set_threadpool_max_threads(&self, value: usize) -> ConverterResult<()> {
        if !(1..=32).contains(&value) {
            return Err(
                ValidationError::settings("threadpool_max_threads must be between 1 and 32").into(),
            );
        }
        self.data().performance.threadpool_max_threads = value;
        self.persist_and_notify(SettingsCategory::Performance)
    }

    // ── Preview ──────────────────────────────────────────────────────────

    pub fn preview_cache_size(&self) -> usize {
        self.data().preview.preview_cache_size
    }

    pub fn set_preview_cache_size(&self, value: usize) -> ConverterResult<()> {
        if !(1..=50).contains(&value) {
            return Err(
                ValidationError::settings("preview_cache_size must be between 1 and 50").into(),
            );
        }
        self.data().preview.preview_cache_size = value;
        self.persist_and_notify(SettingsCategory::Preview)
    }

    pub fn hd_cache_size(&self) -> usize {
        self.data().preview.hd_cache_size
    }

    pub fn set_hd_cache_size(&self, value: usize) -> ConverterResult<()> {
        if !(1..=20).contains(&value) {
            return Err(ValidationError::settings("hd_cache_size must be between 1 and 20").into());
        }
        self.data().preview.hd_cache_size = value;
        self.persist_and_notify(SettingsCategory::Preview)
    }

    pub fn preview_max_dimension(&self) -> u32 {
        self.data().preview.preview_max_dimension
    }

    pub fn set_preview_max_dimension(&self, value: u32) -> ConverterResult<()> {
        if !(720..=4096).contains(&value) {
            return Err(
                ValidationError::settings("preview_max_dimension must be between 720 and 4096")
                    .into(),
            );
        }
        self.data().preview.preview_max_dimension = value;
        self.persist_and_notify(SettingsCategory::Preview)
    }

    pub fn output_preview_debounce_ms(&self) -> u64 {
        self.data().preview.output_preview_debounce_ms
    }

    pub fn set_output_preview_debounce_ms(&self, value: u64) -> ConverterResult<()> {
        if !(100..=2000).contains(&value) {
            return Err(
                ValidationError::settings("output_preview_debounce_ms must be between 100 and 2000")
                    .into(),
            );
        }
        self.data().preview.output_preview_debounce_ms = value;
        self.persist_and_notify(SettingsCategory::Preview)
    }

    pub fn output_preview_cache_size(&self) -> usize {
        self.data().preview.output_preview_cache_size
    }

    pub fn set_output_preview_cache_size(&self, value: usize) -> ConverterResult<()> {
        if !(1..=20).contains(&value) {
            return Err(
                ValidationError::settings("output_preview_cache_size must be between 1 and 20")
                    .into(),
            );
        }
        self.data().preview.output_preview_cache_size = value;
        self.persist_and_notify(SettingsCategory::Preview)
    }

    // ── Defaults ─────────────────────────────────────────────────────────

    pub fn default_quality(&self) -> u8 {
        self.data().defaults.quality
    }

    pub fn set_default_quality(&self, value: u8) -> ConverterResult<()> {
        if value == 0 || value > 100 {
            return Err(ValidationError::settings("quality must be between 1 and 100").into());
        }
        self.data().defaults.quality = value;
        self.persist_and_notify(SettingsCategory::Defaults)
    }

    pub fn default_output_format(&self) -> OutputFormat {
        self.data().defaults.output_format
    }

    pub fn set_default_output_format(&self, value: OutputFormat) -> ConverterResult<()> {
        self.data().defaults.output_format = value;
        self.persist_and_notify(SettingsCategory::Defaults)
    }

    pub fn default_output_location(&self) -> OutputLocation {
        self.data().defaults.output_location.clone()
    }

    pub fn set_default_output_location(&self, value: OutputLocation) -> ConverterResult<()> {
        self.data().defaults.output_location = value;
        self.persist_and_notify(SettingsCategory::Defaults)
    }

    /// Snapshot of the whole defaults category.
    pub fn defaults(&self) -> DefaultsSettings {
        self.data().defaults.clone()
    }

    /// Clears all settings and reverts to defaults, notifying every
    /// category.
    pub fn reset_to_defaults(&self) -> ConverterResult<()> {
        *self.data() = StoredSettings::default();
        self.save()?;
        let _ = self.performance_tx.send(());
        let _ = self.preview_tx.send(());
        let _ = self.defaults_tx.send(());
        Ok(())
    }

    fn data(&self) -> MutexGuard<'_, StoredSettings> {
        self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn persist_and_notify(&self, category: SettingsCategory) -> ConverterResult<()> {
        self.save()?;
        let tx = match category {
            SettingsCategory::Performance => &self.performance_tx,
            SettingsCategory::Preview => &self.preview_tx,
            SettingsCategory::Defaults => &self.defaults_tx,
        };
        let _ = tx.send(());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> AppSettingsStore {
        AppSettingsStore::open(dir.path().join("settings.json"))
    }

    #[test]
    fn defaults_when_no_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.max_concurrent_workers(), 4);
        assert_eq!(store.default_quality(), 85);
        assert_eq!(store.preview_max_dimension(), 1500);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        assert!(store.set_max_concurrent_workers(0).is_err());
        assert!(store.set_max_concurrent_workers(17).is_err());
        assert!(store.set_preview_cache_size(51).is_err());
        assert!(store.set_preview_max_dimension(100).is_err());
        assert!(store.set_output_preview_debounce_ms(50).is_err());
        assert!(store.set_default_quality(0).is_err());
        assert!(store.set_default_quality(101).is_err());

        // Rejected writes leave the stored value untouched
        assert_eq!(store.max_concurrent_workers(), 4);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store_in(&dir);
            store.set_max_concurrent_workers(8).unwrap();
            store.set_default_quality(70).unwrap();
            store.set_default_output_format(OutputFormat::Avif).unwrap();
        }
        let store = store_in(&dir);
        assert_eq!(store.max_concurrent_workers(), 8);
        assert_eq!(store.default_quality(), 70);
        assert_eq!(store.default_output_format(), OutputFormat::Avif);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let store = AppSettingsStore::open(path);
        assert_eq!(store.max_concurrent_workers(), 4);
    }

    #[test]
    fn notifies_the_changed_category_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut performance = store.subscribe(SettingsCategory::Performance);
        let mut preview = store.subscribe(SettingsCategory::Preview);

        store.set_max_concurrent_workers(2).unwrap();
        assert!(performance.has_changed().unwrap());
        assert!(!preview.has_changed().unwrap());
    }

    #[test]
    fn reset_restores_defaults_and_notifies_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.set_default_quality(40).unwrap();

        let mut defaults = store.subscribe(SettingsCategory::Defaults);
        store.reset_to_defaults().unwrap();
        assert_eq!(store.default_quality(), 85);
        assert!(defaults.has_changed().unwrap());
    }
}
