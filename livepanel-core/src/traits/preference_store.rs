use crate::models::error::CaptureError;

/// Key-value persistence for scalar user settings.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), CaptureError>;
}
