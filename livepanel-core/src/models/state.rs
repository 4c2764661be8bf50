use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Recorder state machine.
///
/// ```text
/// idle → recording → finalizing → idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    #[default]
    Idle,
    Recording,
    Finalizing,
}

impl RecorderState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    /// Recording or finalizing: the session still holds its input tracks.
    pub fn holds_tracks(&self) -> bool {
        !self.is_idle()
    }
}

/// Cosmetic camera filter selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    None,
    A,
    B,
}

impl FilterMode {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::str::FromStr for FilterMode {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "a" => Ok(Self::A),
            "b" => Ok(Self::B),
            other => Err(CaptureError::ConfigurationFailed(format!("unknown filter mode: {other}"))),
        }
    }
}

/// Snapshot of the visual filter state.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FilterStatus {
    pub mode: FilterMode,
    pub processing: bool,
    pub last_error: Option<String>,
    /// Camera generation the current filtered output belongs to.
    pub output_generation: Option<u64>,
}

/// On/off status of every source plus recorder and filter state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub screen_active: bool,
    pub camera_active: bool,
    pub microphone_active: bool,
    pub microphone_device: Option<String>,
    pub recorder: RecorderState,
    pub filter: FilterStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_mode_parses_case_insensitively() {
        assert_eq!("A".parse::<FilterMode>().unwrap(), FilterMode::A);
        assert_eq!("b".parse::<FilterMode>().unwrap(), FilterMode::B);
        assert_eq!("off".parse::<FilterMode>().unwrap(), FilterMode::None);
        assert!("sepia".parse::<FilterMode>().is_err());
    }

    #[test]
    fn finalizing_still_holds_tracks() {
        assert!(RecorderState::Finalizing.holds_tracks());
        assert!(RecorderState::Recording.holds_tracks());
        assert!(!RecorderState::Idle.holds_tracks());
    }
}
