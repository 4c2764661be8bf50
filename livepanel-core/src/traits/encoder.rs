use std::sync::Arc;
use std::time::Duration;

use crate::models::error::CaptureError;
use crate::models::media::MediaStream;

/// Callback invoked with each encoded chunk. Chunks may be empty.
pub type ChunkCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync + 'static>;

/// Callback invoked when the encoder hits a runtime error it can continue past.
pub type EncoderErrorCallback = Arc<dyn Fn(CaptureError) + Send + Sync + 'static>;

/// Settings negotiated by the recorder before starting the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub mime_type: String,
    /// Interval between chunk deliveries.
    pub timeslice: Duration,
}

/// Container/codec encoder consuming a composed stream.
///
/// Chunks are delivered from the encoder's own thread every `timeslice`.
pub trait MediaEncoder: Send {
    /// Whether the encoder can produce `mime_type`.
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Begin encoding `stream`.
    fn start(
        &mut self,
        stream: &MediaStream,
        settings: &EncoderSettings,
        on_chunk: ChunkCallback,
        on_error: EncoderErrorCallback,
    ) -> Result<(), CaptureError>;

    /// Stop encoding. Must deliver the final chunk through `on_chunk` before
    /// returning.
    fn stop(&mut self) -> Result<(), CaptureError>;
}
