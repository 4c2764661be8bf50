use serde::{Deserialize, Serialize};

/// An audio input device available for selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
    pub is_default: bool,
}

/// Real-time audio level metering (RMS and peak, 0.0–1.0).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioLevels {
    pub mic_level: f32,
    pub screen_level: f32,
    pub peak_mic_level: f32,
    pub peak_screen_level: f32,
}

/// Counters for debugging a media session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionDiagnostics {
    pub chunks_received: u64,
    pub empty_chunks_dropped: u64,
    pub bytes_buffered: u64,
    pub mix_cycles: u64,
    pub encoder_faults: u64,
    pub stale_acquisitions_released: u64,
    pub stale_filters_discarded: u64,
}
