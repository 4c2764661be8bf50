use serde::{Deserialize, Serialize};

use crate::traits::preference_store::PreferenceStore;

pub const MIC_VOLUME_KEY: &str = "mic-volume";
pub const SCREEN_VOLUME_KEY: &str = "screen-volume";
pub const SELECTED_MICROPHONE_KEY: &str = "selected-microphone";

pub const DEFAULT_MIC_VOLUME: u8 = 75;
pub const DEFAULT_SCREEN_VOLUME: u8 = 80;
pub const DEFAULT_MICROPHONE: &str = "default";

/// User preferences read once when a session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub mic_volume: u8,
    pub screen_volume: u8,
    pub selected_microphone: String,
}

impl Preferences {
    /// Read every key from `store`, falling back to defaults for missing or
    /// unparseable values. Volumes above 100 are clamped.
    pub fn load(store: &dyn PreferenceStore) -> Self {
        Self {
            mic_volume: read_volume(store, MIC_VOLUME_KEY, DEFAULT_MIC_VOLUME),
            screen_volume: read_volume(store, SCREEN_VOLUME_KEY, DEFAULT_SCREEN_VOLUME),
            selected_microphone: store
                .get(SELECTED_MICROPHONE_KEY)
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MICROPHONE.to_string()),
        }
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            mic_volume: DEFAULT_MIC_VOLUME,
            screen_volume: DEFAULT_SCREEN_VOLUME,
            selected_microphone: DEFAULT_MICROPHONE.to_string(),
        }
    }
}

fn read_volume(store: &dyn PreferenceStore, key: &str, default: u8) -> u8 {
    let Some(raw) = store.get(key) else {
        return default;
    };
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value.round().clamp(0.0, 100.0) as u8,
        _ => {
            log::warn!("Ignoring unparseable preference {}={:?}", key, raw);
            default
        }
    }
}
