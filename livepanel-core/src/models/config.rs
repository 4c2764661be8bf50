use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::processing::gain::GainCurve;

/// Screen capture request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenConstraints {
    /// Ask for the shared surface's system audio alongside the video.
    pub capture_system_audio: bool,
    pub max_width: u32,
    pub max_height: u32,
    pub frame_rate: u32,
}

impl Default for ScreenConstraints {
    fn default() -> Self {
        Self {
            capture_system_audio: true,
            max_width: 1920,
            max_height: 1080,
            frame_rate: 30,
        }
    }
}

/// Camera capture request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30,
        }
    }
}

/// Microphone processing flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Gain curves for each independently controlled audio path.
///
/// The boost values are product policy, not a contract. Only monotonicity and
/// the recording-path floor are relied upon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainPolicy {
    pub mic_monitor: GainCurve,
    pub mic_recording: GainCurve,
    pub screen_recording: GainCurve,
}

impl Default for GainPolicy {
    fn default() -> Self {
        Self {
            mic_monitor: GainCurve::new(1.0, 0.0),
            mic_recording: GainCurve::new(2.0, 0.02),
            screen_recording: GainCurve::new(1.0, 0.02),
        }
    }
}

/// Configuration for a media session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Interval between recorder chunk deliveries (default: 1 s).
    pub timeslice: Duration,

    /// Interval of the mixer's processing loop (default: 10 ms).
    pub mix_tick: Duration,

    /// Sample rate of the mixed recording audio (default: 48000).
    pub sample_rate: f64,

    pub screen: ScreenConstraints,
    pub camera: CameraConstraints,
    pub microphone: AudioConstraints,
    pub gain: GainPolicy,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.timeslice.is_zero() {
            return Err("timeslice must be positive".into());
        }
        if self.mix_tick.is_zero() {
            return Err("mixer tick must be positive".into());
        }
        if !(self.sample_rate > 0.0) {
            return Err("sample rate must be positive".into());
        }
        for (name, curve) in [
            ("mic monitor", &self.gain.mic_monitor),
            ("mic recording", &self.gain.mic_recording),
            ("screen recording", &self.gain.screen_recording),
        ] {
            curve.validate().map_err(|e| format!("{name} gain: {e}"))?;
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeslice: Duration::from_secs(1),
            mix_tick: Duration::from_millis(10),
            sample_rate: 48000.0,
            screen: ScreenConstraints::default(),
            camera: CameraConstraints::default(),
            microphone: AudioConstraints::default(),
            gain: GainPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_timeslice() {
        let config = SessionConfig {
            timeslice: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_nan_sample_rate() {
        let config = SessionConfig {
            sample_rate: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_boost() {
        let mut config = SessionConfig::default();
        config.gain.screen_recording = GainCurve::new(-1.0, 0.0);
        let err = config.validate().unwrap_err();
        assert!(err.starts_with("screen recording gain"));
    }
}
