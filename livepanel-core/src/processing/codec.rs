//! Container/codec negotiation for the recorder.
//!
//! Preferred formats are tried in order; the baseline is assumed to be
//! supported by every encoder and is never queried.

use serde::Serialize;

/// A candidate MIME type and the file extension it exports with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatCandidate {
    pub mime_type: &'static str,
    pub extension: &'static str,
}

const fn candidate(mime_type: &'static str, extension: &'static str) -> FormatCandidate {
    FormatCandidate { mime_type, extension }
}

pub const VIDEO_PREFERENCES: &[FormatCandidate] = &[
    candidate("video/mp4;codecs=avc1.42E01E,mp4a.40.2", "mp4"),
    candidate("video/webm;codecs=vp9,opus", "webm"),
    candidate("video/webm;codecs=vp8,opus", "webm"),
];
pub const VIDEO_BASELINE: FormatCandidate = candidate("video/webm", "webm");

pub const AUDIO_PREFERENCES: &[FormatCandidate] = &[
    candidate("audio/mp4;codecs=mp4a.40.2", "m4a"),
    candidate("audio/webm;codecs=opus", "weba"),
];
pub const AUDIO_BASELINE: FormatCandidate = candidate("audio/webm", "weba");

/// Outcome of negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerFormat {
    pub mime_type: String,
    pub extension: String,
    /// True when no preferred format was supported.
    pub baseline: bool,
}

impl From<(FormatCandidate, bool)> for ContainerFormat {
    fn from((candidate, baseline): (FormatCandidate, bool)) -> Self {
        Self {
            mime_type: candidate.mime_type.to_string(),
            extension: candidate.extension.to_string(),
            baseline,
        }
    }
}

/// Pick the first preferred format `is_supported` accepts, else the baseline.
/// Never fails.
pub fn negotiate(has_video: bool, is_supported: impl Fn(&str) -> bool) -> ContainerFormat {
    let (preferences, baseline) = if has_video {
        (VIDEO_PREFERENCES, VIDEO_BASELINE)
    } else {
        (AUDIO_PREFERENCES, AUDIO_BASELINE)
    };

    match preferences.iter().find(|c| is_supported(c.mime_type)) {
        Some(found) => {
            log::info!("Negotiated recording format {}", found.mime_type);
            ContainerFormat::from((*found, false))
        }
        None => {
            log::warn!(
                "No preferred recording format supported; falling back to {}",
                baseline.mime_type
            );
            ContainerFormat::from((baseline, true))
        }
    }
}
