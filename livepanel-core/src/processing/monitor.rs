use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::models::media::MediaTrack;
use crate::processing::gain::{GainControl, GainCurve, GainPath, GainStage, GainTelemetry};
use crate::processing::mixer::{peak_level, rms_level};

/// Preview/metering path for the microphone.
///
/// Has its own gain stage so the monitor volume never touches what gets
/// recorded.
pub struct AudioMonitor {
    stage: GainStage,
    last_levels: (f32, f32),
}

impl AudioMonitor {
    pub fn new(track: &MediaTrack, curve: GainCurve, percent: u8) -> Result<Self, CaptureError> {
        Ok(Self {
            stage: GainStage::create(track, GainPath::MicMonitor, curve, percent)?,
            last_levels: (0.0, 0.0),
        })
    }

    pub fn set_gain(&self, percent: u8) {
        self.stage.set_gain(percent);
    }

    pub fn control(&self) -> Arc<GainControl> {
        self.stage.control()
    }

    pub fn telemetry(&self) -> GainTelemetry {
        self.stage.telemetry()
    }

    /// (RMS, peak) of everything delivered since the last call. Keeps the
    /// previous reading when nothing new arrived.
    pub fn sample_levels(&mut self) -> (f32, f32) {
        let samples = self.stage.process();
        if !samples.is_empty() {
            self.last_levels = (rms_level(&samples), peak_level(&samples));
        }
        self.last_levels
    }

    pub fn dispose(self) {
        self.stage.dispose();
    }
}
