//! Event stream from the batch scheduler to the UI layer.

use serde::Serialize;
use std::path::PathBuf;

use crate::core::ImageFile;

/// Events emitted while a batch runs.
///
/// Within one file, `FileStarted` → `FileProgress`* → (`FileCompleted` |
/// `FileFailed`) are strictly ordered; events for different files may
/// interleave arbitrarily. Exactly one `BatchFinished` terminates a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BatchEvent {
    #[serde(rename_all = "camelCase")]
    FileStarted {
        file: ImageFile,
        /// 1-based admission index
        index: usize,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    FileProgress {
        file: ImageFile,
        /// 0-100, best effort (coarse milestones)
        percent: u8,
    },
    #[serde(rename_all = "camelCase")]
    FileCompleted {
        file: ImageFile,
        output_path: PathBuf,
        /// Negative when the output is larger than the source
        bytes_saved: i64,
    },
    #[serde(rename_all = "camelCase")]
    FileFailed { file: ImageFile, error: String },
    #[serde(rename_all = "camelCase")]
    BatchFinished {
        total: usize,
        successful: usize,
        failed: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn serializes_with_event_tag() {
        let event = BatchEvent::BatchFinished {
            total: 3,
            successful: 2,
            failed: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "batchFinished");
        assert_eq!(json["successful"], 2);

        let file = ImageFile {
            path: PathBuf::from("a.png"),
            size_bytes: 10,
            width: Some(1),
            height: Some(1),
            format: Some("PNG".into()),
        };
        let event = BatchEvent::FileCompleted {
            file,
            output_path: PathBuf::from("a.webp"),
            bytes_saved: -4,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "fileCompleted");
        assert_eq!(json["bytesSaved"], -4);
    }
}
