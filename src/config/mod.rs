//! Persistent application settings store.

mod store;

pub use store::{
    AppSettingsStore, DefaultsSettings, PerformanceSettings, PreviewSettings, SettingsCategory,
};
