//! Stand-in for the cosmetic camera filter.
//!
//! Mode A warms the image, mode B cools it. A frame loop copies the latest
//! camera frame, tints it and pushes it to the output track until the
//! output is cancelled or the camera ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use livepanel_core::models::error::CaptureError;
use livepanel_core::models::media::{MediaStream, MediaTrack, VideoFrame};
use livepanel_core::models::state::FilterMode;
use livepanel_core::traits::filter_gateway::FilterGateway;

/// Tint a single RGBA frame.
pub fn tint(frame: &VideoFrame, mode: FilterMode) -> VideoFrame {
    let (dr, dg, db): (i16, i16, i16) = match mode {
        FilterMode::None => (0, 0, 0),
        FilterMode::A => (40, 10, -30),
        FilterMode::B => (-30, 5, 40),
    };
    let shift = |value: u8, delta: i16| (i16::from(value) + delta).clamp(0, 255) as u8;

    let mut data = frame.data.to_vec();
    for pixel in data.chunks_exact_mut(4) {
        pixel[0] = shift(pixel[0], dr);
        pixel[1] = shift(pixel[1], dg);
        pixel[2] = shift(pixel[2], db);
    }
    VideoFrame::new(frame.width, frame.height, data)
}

/// `FilterGateway` running a tint loop per applied camera.
pub struct TintFilter {
    available: AtomicBool,
    /// Time until the first filtered frame is ready.
    warmup: Duration,
    frame_period: Duration,
    outputs: Mutex<Vec<Arc<MediaTrack>>>,
}

impl TintFilter {
    pub fn new(warmup: Duration) -> Self {
        Self {
            available: AtomicBool::new(true),
            warmup,
            frame_period: Duration::from_millis(33),
            outputs: Mutex::new(Vec::new()),
        }
    }

    /// Make every later `apply` fail, as when the model cannot load.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Filtered outputs that are still running.
    pub fn live_outputs(&self) -> usize {
        self.outputs.lock().iter().filter(|t| t.is_live()).count()
    }

    fn end_outputs(&self) {
        let mut outputs = self.outputs.lock();
        for output in outputs.iter() {
            output.stop();
        }
        outputs.clear();
    }

    fn spawn_loop(&self, camera: Arc<MediaTrack>, output: Arc<MediaTrack>, mode: FilterMode) -> Result<(), CaptureError> {
        let period = self.frame_period;
        thread::Builder::new()
            .name("sim-filter".into())
            .spawn(move || {
                let mut last = 0;
                while output.is_live() {
                    if !camera.is_live() {
                        output.stop();
                        break;
                    }
                    if let Some(frame) = camera.latest_frame().filter(|f| f.sequence > last) {
                        last = frame.sequence;
                        output.push_frame(tint(&frame, mode));
                    }
                    thread::sleep(period);
                }
                log::debug!("Filter loop for {:?} finished", mode);
            })
            .map_err(|e| CaptureError::FilterUnavailable(format!("failed to spawn filter loop: {e}")))?;
        Ok(())
    }
}

impl Default for TintFilter {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

#[async_trait]
impl FilterGateway for TintFilter {
    async fn apply(&self, camera: &MediaStream, mode: FilterMode) -> Result<MediaStream, CaptureError> {
        self.end_outputs();

        if !self.available.load(Ordering::SeqCst) {
            return Err(CaptureError::FilterUnavailable("segmentation model failed to load".into()));
        }
        let source = camera
            .live_video()
            .cloned()
            .ok_or_else(|| CaptureError::FilterUnavailable("camera has no live video".into()))?;

        let output = MediaTrack::video(format!("filtered-{:?}", mode).to_lowercase());
        self.outputs.lock().push(Arc::clone(&output));
        self.spawn_loop(Arc::clone(&source), Arc::clone(&output), mode)?;

        if !self.warmup.is_zero() {
            tokio::time::sleep(self.warmup).await;
        }
        if let Some(frame) = source.latest_frame() {
            output.push_frame(tint(&frame, mode));
        }

        if !output.is_live() {
            return Err(CaptureError::FilterUnavailable("filter cancelled before first frame".into()));
        }
        log::info!("Tint filter {:?} running", mode);
        MediaStream::with_tracks([output])
    }

    fn cancel(&self) {
        self.end_outputs();
    }
}
