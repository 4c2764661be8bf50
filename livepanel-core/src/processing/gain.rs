use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::error::CaptureError;
use crate::models::media::{AudioTap, MediaTrack};

/// Maps a user-facing volume percentage to an amplitude multiplier.
///
/// `multiplier = max(percent / 100 * boost, floor)`. Monotonic in `percent`
/// and never negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainCurve {
    pub boost: f32,
    pub floor: f32,
}

impl GainCurve {
    pub const fn new(boost: f32, floor: f32) -> Self {
        Self { boost, floor }
    }

    pub fn multiplier(&self, percent: u8) -> f32 {
        let linear = f32::from(percent.min(100)) / 100.0 * self.boost.max(0.0);
        linear.max(self.floor.max(0.0))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.boost.is_finite() || self.boost < 0.0 {
            return Err(format!("boost must be a non-negative number, got {}", self.boost));
        }
        if !self.floor.is_finite() || self.floor < 0.0 {
            return Err(format!("floor must be a non-negative number, got {}", self.floor));
        }
        Ok(())
    }
}

/// Independently volume-controlled audio paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GainPath {
    MicMonitor,
    MicRecording,
    ScreenAudio,
}

/// Raw percentage and applied multiplier of one gain stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GainTelemetry {
    pub path: GainPath,
    pub percent: u8,
    pub multiplier: f32,
}

/// Live gain setting shared between a stage and whoever adjusts it.
///
/// Lock-free so the processing loop picks up a change on its next tick.
#[derive(Debug)]
pub struct GainControl {
    path: GainPath,
    curve: GainCurve,
    percent: AtomicU8,
    multiplier_bits: AtomicU32,
}

impl GainControl {
    fn new(path: GainPath, curve: GainCurve, percent: u8) -> Self {
        let control = Self {
            path,
            curve,
            percent: AtomicU8::new(0),
            multiplier_bits: AtomicU32::new(0),
        };
        control.set_percent(percent);
        control
    }

    pub fn set_percent(&self, percent: u8) {
        let percent = percent.min(100);
        let multiplier = self.curve.multiplier(percent);
        self.percent.store(percent, Ordering::SeqCst);
        self.multiplier_bits.store(multiplier.to_bits(), Ordering::SeqCst);
        log::debug!(
            "{:?} gain set to {}% (multiplier {:.3})",
            self.path,
            percent,
            multiplier
        );
    }

    pub fn multiplier(&self) -> f32 {
        f32::from_bits(self.multiplier_bits.load(Ordering::SeqCst))
    }

    pub fn telemetry(&self) -> GainTelemetry {
        GainTelemetry {
            path: self.path,
            percent: self.percent.load(Ordering::SeqCst),
            multiplier: self.multiplier(),
        }
    }
}

/// Amplification stage wrapping one raw audio track.
///
/// The stage subscribes to the track on creation; `set_gain` only swaps the
/// multiplier, so the tap (and the source) is never re-created.
pub struct GainStage {
    tap: AudioTap,
    control: Arc<GainControl>,
}

impl GainStage {
    pub fn create(
        track: &MediaTrack,
        path: GainPath,
        curve: GainCurve,
        initial_percent: u8,
    ) -> Result<Self, CaptureError> {
        if !track.is_live() {
            return Err(CaptureError::ConfigurationFailed(format!(
                "cannot stage gain on ended track '{}'",
                track.label()
            )));
        }
        let tap = track.subscribe().ok_or_else(|| {
            CaptureError::ConfigurationFailed(format!("track '{}' carries no audio", track.label()))
        })?;
        Ok(Self {
            tap,
            control: Arc::new(GainControl::new(path, curve, initial_percent)),
        })
    }

    pub fn set_gain(&self, percent: u8) {
        self.control.set_percent(percent);
    }

    /// Handle for adjusting the gain from outside the processing loop.
    pub fn control(&self) -> Arc<GainControl> {
        Arc::clone(&self.control)
    }

    pub fn path(&self) -> GainPath {
        self.control.path
    }

    pub fn multiplier(&self) -> f32 {
        self.control.multiplier()
    }

    pub fn telemetry(&self) -> GainTelemetry {
        self.control.telemetry()
    }

    pub fn sample_rate(&self) -> f64 {
        self.tap.sample_rate()
    }

    /// Samples waiting in the source tap.
    pub fn available(&self) -> usize {
        self.tap.available()
    }

    /// Drain pending samples from the source, scaled by the current gain.
    pub fn process(&self) -> Vec<f32> {
        self.scale(self.tap.drain())
    }

    /// Like `process`, but takes at most `count` samples.
    pub fn process_frames(&self, count: usize) -> Vec<f32> {
        self.scale(self.tap.read(count))
    }

    fn scale(&self, mut samples: Vec<f32>) -> Vec<f32> {
        let gain = self.control.multiplier();
        for sample in &mut samples {
            *sample *= gain;
        }
        samples
    }

    /// Unsubscribe from the source track.
    pub fn dispose(self) {
        log::debug!("Disposing {:?} gain stage", self.control.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn curve_is_monotonic_and_non_negative() {
        let curve = GainCurve::new(2.0, 0.02);
        let mut previous = 0.0;
        for percent in 0..=100u8 {
            let m = curve.multiplier(percent);
            assert!(m >= previous);
            assert!(m >= 0.0);
            previous = m;
        }
    }

    #[test]
    fn recording_floor_keeps_zero_audible() {
        let curve = GainCurve::new(2.0, 0.02);
        assert_relative_eq!(curve.multiplier(0), 0.02);
        assert_relative_eq!(curve.multiplier(40), 0.8);
        assert_relative_eq!(curve.multiplier(200), 2.0);
    }

    #[test]
    fn monitor_curve_allows_silence() {
        let curve = GainCurve::new(1.0, 0.0);
        assert_eq!(curve.multiplier(0), 0.0);
        assert_relative_eq!(curve.multiplier(75), 0.75);
    }

    #[test]
    fn negative_boost_never_yields_negative_gain() {
        let curve = GainCurve::new(-3.0, -1.0);
        assert_eq!(curve.multiplier(100), 0.0);
        assert!(curve.validate().is_err());
    }

    #[test]
    fn set_gain_applies_to_live_stage() {
        let track = MediaTrack::audio("mic", 48000.0);
        let stage = GainStage::create(&track, GainPath::MicRecording, GainCurve::new(1.0, 0.0), 50).unwrap();

        track.push_samples(&[0.4, -0.4]);
        let first = stage.process();
        assert_relative_eq!(first[0], 0.2);
        assert_relative_eq!(first[1], -0.2);

        stage.set_gain(100);
        track.push_samples(&[0.4]);
        let second = stage.process();
        assert_relative_eq!(second[0], 0.4);
        assert_eq!(track.subscriber_count(), 1);
    }

    #[test]
    fn control_handle_shares_setting() {
        let track = MediaTrack::audio("screen-audio", 48000.0);
        let stage = GainStage::create(&track, GainPath::ScreenAudio, GainCurve::new(1.0, 0.02), 80).unwrap();
        let control = stage.control();

        control.set_percent(40);

        let telemetry = stage.telemetry();
        assert_eq!(telemetry.percent, 40);
        assert_relative_eq!(telemetry.multiplier, 0.4);
    }

    #[test]
    fn dispose_unsubscribes() {
        let track = MediaTrack::audio("mic", 48000.0);
        let stage = GainStage::create(&track, GainPath::MicMonitor, GainCurve::new(1.0, 0.0), 75).unwrap();
        stage.dispose();
        track.push_samples(&[0.1]);
        assert_eq!(track.subscriber_count(), 0);
    }

    #[test]
    fn rejects_video_and_ended_tracks() {
        let video = MediaTrack::video("camera");
        assert!(GainStage::create(&video, GainPath::MicMonitor, GainCurve::new(1.0, 0.0), 75).is_err());

        let ended = MediaTrack::audio("mic", 48000.0);
        ended.stop();
        assert!(GainStage::create(&ended, GainPath::MicMonitor, GainCurve::new(1.0, 0.0), 75).is_err());
    }
}
