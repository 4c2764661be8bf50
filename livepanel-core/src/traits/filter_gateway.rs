use async_trait::async_trait;

use crate::models::error::CaptureError;
use crate::models::media::MediaStream;
use crate::models::state::FilterMode;

/// Boundary to the cosmetic camera filter.
///
/// The gateway owns its frame loop and the streams it returns; the session
/// only asks for cancellation and never stops a filtered stream itself.
#[async_trait]
pub trait FilterGateway: Send + Sync {
    /// Start transforming `camera` with `mode`, resolving once the first
    /// filtered frame is ready. Ends the output of every earlier call,
    /// including calls that have not resolved yet.
    async fn apply(&self, camera: &MediaStream, mode: FilterMode) -> Result<MediaStream, CaptureError>;

    /// Stop the frame loop and end every output, including one still
    /// starting. Idempotent.
    fn cancel(&self);
}
