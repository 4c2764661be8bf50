use async_trait::async_trait;

use crate::models::audio_models::DeviceInfo;
use crate::models::config::{AudioConstraints, CameraConstraints, ScreenConstraints};
use crate::models::error::CaptureError;
use crate::models::media::MediaStream;

/// Platform capture backend: the only place raw media handles are created.
///
/// Every acquisition may suspend while the user answers a permission prompt.
/// Returned streams are owned by the caller, who must `stop_all()` them to
/// release the hardware.
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    /// Acquire a screen or window share. The stream holds one video track and,
    /// when requested and available, one system-audio track.
    async fn acquire_screen(&self, constraints: &ScreenConstraints) -> Result<MediaStream, CaptureError>;

    /// Acquire the camera. The stream holds one video track.
    async fn acquire_camera(&self, constraints: &CameraConstraints) -> Result<MediaStream, CaptureError>;

    /// Acquire the microphone identified by `device_id` (`"default"` for the
    /// system default). The stream holds one audio track.
    async fn acquire_microphone(
        &self,
        device_id: &str,
        constraints: &AudioConstraints,
    ) -> Result<MediaStream, CaptureError>;

    /// List available audio input devices.
    fn audio_inputs(&self) -> Result<Vec<DeviceInfo>, CaptureError>;
}
