use crate::models::error::CaptureError;
use crate::models::media::SourceKind;
use crate::models::recording_result::RecordingArtifact;
use crate::models::state::RecorderState;

/// Event delegate for media session notifications.
///
/// Recorder-side callbacks may arrive on the encoder thread. Implementations
/// should marshal to the UI thread if needed.
pub trait SessionDelegate: Send + Sync {
    /// Called when a capture source turns on or off.
    fn on_source_changed(&self, kind: SourceKind, active: bool);

    /// Called on every recorder state transition.
    fn on_recorder_state_changed(&self, state: RecorderState);

    /// Called for non-fatal problems (filter fallback, video-only recording).
    fn on_warning(&self, warning: &CaptureError);

    /// Called when an error occurs outside a command's return path.
    fn on_error(&self, error: &CaptureError);

    /// Called when a recording has been finalized.
    fn on_recording_finished(&self, artifact: &RecordingArtifact);
}
