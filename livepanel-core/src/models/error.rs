use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::media::SourceKind;

/// Errors that can occur while acquiring, composing or recording media.
///
/// Acquisition failures are returned to the caller as-is; the session never
/// retries on its own. `FilterUnavailable` and `EncoderFault` are non-fatal
/// and normally travel through the delegate instead of a `Result`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("{0} permission denied")]
    PermissionDenied(SourceKind),

    #[error("no {0} device found")]
    DeviceNotFound(SourceKind),

    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    #[error("{0} capture cancelled by the user")]
    UserCancelled(SourceKind),

    #[error("{0} acquisition superseded by a later command")]
    AcquisitionSuperseded(SourceKind),

    #[error("device busy: {0}")]
    DeviceBusy(String),

    #[error("{0} is not active")]
    SourceInactive(SourceKind),

    #[error("no tracks available to record")]
    NoTracksAvailable,

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("visual filter unavailable: {0}")]
    FilterUnavailable(String),

    #[error("encoder fault: {0}")]
    EncoderFault(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),
}

/// Coarse grouping of errors for user-facing messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Permission,
    DeviceMissing,
    Unsupported,
    Cancelled,
    Busy,
    Composition,
    Filter,
    Encoder,
    Storage,
    Configuration,
}

impl ErrorCategory {
    /// Short explanation a UI can show next to the failed control.
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::Permission => {
                "Access was blocked. Allow screen, camera or microphone access in your system settings and try again."
            }
            Self::DeviceMissing => "No matching device was found. Check that it is connected and not disabled.",
            Self::Unsupported => "This environment cannot capture this kind of media.",
            Self::Cancelled => "The capture request was dismissed before a source was chosen.",
            Self::Busy => "The device is in use by the current recording. Stop recording first.",
            Self::Composition => "Nothing to record yet. Start the screen, camera or microphone first.",
            Self::Filter => "The visual filter is not available; the camera is shown without it.",
            Self::Encoder => "The recorder reported a problem. Captured data has been kept where possible.",
            Self::Storage => "The file could not be saved.",
            Self::Configuration => "The session settings are invalid.",
        }
    }
}

impl CaptureError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::PermissionDenied(_) => ErrorCategory::Permission,
            Self::DeviceNotFound(_) => ErrorCategory::DeviceMissing,
            Self::UnsupportedEnvironment(_) => ErrorCategory::Unsupported,
            Self::UserCancelled(_) | Self::AcquisitionSuperseded(_) => ErrorCategory::Cancelled,
            Self::DeviceBusy(_) | Self::AlreadyRecording => ErrorCategory::Busy,
            Self::SourceInactive(_) | Self::NoTracksAvailable => ErrorCategory::Composition,
            Self::FilterUnavailable(_) => ErrorCategory::Filter,
            Self::EncoderFault(_) => ErrorCategory::Encoder,
            Self::StorageError(_) => ErrorCategory::Storage,
            Self::ConfigurationFailed(_) => ErrorCategory::Configuration,
        }
    }

    /// Whether the session keeps running normally after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::FilterUnavailable(_) | Self::EncoderFault(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_errors_map_to_distinct_categories() {
        let errors = [
            CaptureError::PermissionDenied(SourceKind::Camera),
            CaptureError::DeviceNotFound(SourceKind::Microphone),
            CaptureError::UnsupportedEnvironment("no display server".into()),
            CaptureError::UserCancelled(SourceKind::Screen),
        ];
        let categories: Vec<ErrorCategory> = errors.iter().map(CaptureError::category).collect();

        for (i, a) in categories.iter().enumerate() {
            for b in &categories[i + 1..] {
                assert_ne!(a, b);
                assert_ne!(a.guidance(), b.guidance());
            }
        }
    }

    #[test]
    fn only_filter_and_encoder_faults_are_recoverable() {
        assert!(CaptureError::FilterUnavailable("gpu lost".into()).is_recoverable());
        assert!(CaptureError::EncoderFault("muxer".into()).is_recoverable());
        assert!(!CaptureError::NoTracksAvailable.is_recoverable());
        assert!(!CaptureError::PermissionDenied(SourceKind::Screen).is_recoverable());
    }

    #[test]
    fn display_names_the_source() {
        let err = CaptureError::PermissionDenied(SourceKind::Microphone);
        assert_eq!(err.to_string(), "microphone permission denied");
    }
}
