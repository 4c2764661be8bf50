use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Where the recorded video track came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoOrigin {
    Screen,
    Camera,
    FilteredCamera,
}

/// The single exported file produced by a completed recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingArtifact {
    pub file_name: String,
    pub data: Vec<u8>,
    pub metadata: RecordingMetadata,
}

impl RecordingArtifact {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Metadata stored alongside a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub mime_type: String,
    pub extension: String,
    /// Whether negotiation settled on the baseline container.
    pub baseline_format: bool,
    pub started_at: String,
    pub duration_secs: f64,
    pub chunk_count: usize,
    pub byte_length: u64,
    pub checksum: String,
    pub video_origin: Option<VideoOrigin>,
    pub has_audio: bool,
    pub encoder_faults: Vec<String>,
}

/// A still frame of the screen source, PNG encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Screenshot {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

/// ISO 8601 timestamp with `:` and `.` replaced by `-`, safe for file names.
///
/// `2024-05-01T12:30:45.123Z` becomes `2024-05-01T12-30-45-123Z`.
pub fn file_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true).replace([':', '.'], "-")
}

pub fn recording_file_name(at: DateTime<Utc>, extension: &str) -> String {
    format!("recording-{}.{}", file_timestamp(at), extension)
}

pub fn screenshot_file_name(at: DateTime<Utc>) -> String {
    format!("screenshot-{}.png", file_timestamp(at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_is_file_name_safe() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap() + chrono::Duration::milliseconds(123);
        assert_eq!(file_timestamp(at), "2024-05-01T12-30-45-123Z");
    }

    #[test]
    fn recording_and_screenshot_names() {
        let at = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(recording_file_name(at, "webm"), "recording-2023-01-02T03-04-05-000Z.webm");
        assert_eq!(screenshot_file_name(at), "screenshot-2023-01-02T03-04-05-000Z.png");
    }
}
