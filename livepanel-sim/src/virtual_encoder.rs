//! Timesliced encoder producing a simple framed container.
//!
//! Every timeslice the encoder thread drains the audio track, looks at the
//! latest video frame and emits one chunk:
//!
//! ```text
//! "LPCK" | index u32 | frame_sequence u64 | width u32 | height u32 | pcm_len u32 | pcm (int16 LE)
//! ```
//!
//! A slice with no new audio and no new frame yields an empty chunk.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use livepanel_core::models::error::CaptureError;
use livepanel_core::models::media::{AudioTap, MediaStream, MediaTrack};
use livepanel_core::processing::codec::{AUDIO_PREFERENCES, VIDEO_PREFERENCES};
use livepanel_core::processing::mixer::to_int16_pcm;
use livepanel_core::traits::encoder::{ChunkCallback, EncoderErrorCallback, EncoderSettings, MediaEncoder};

pub const CHUNK_MAGIC: &[u8; 4] = b"LPCK";
const HEADER_LEN: usize = 4 + 4 + 8 + 4 + 4 + 4;

/// Header fields of one decoded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSummary {
    pub index: u32,
    pub frame_sequence: u64,
    pub width: u32,
    pub height: u32,
    pub audio_bytes: usize,
}

/// Split a recording produced by `VirtualEncoder` back into its chunks.
pub fn decode_chunks(mut data: &[u8]) -> Result<Vec<ChunkSummary>, CaptureError> {
    let mut chunks = Vec::new();
    while !data.is_empty() {
        if data.len() < HEADER_LEN || &data[..4] != CHUNK_MAGIC {
            return Err(CaptureError::EncoderFault(format!(
                "malformed chunk after {} chunk(s)",
                chunks.len()
            )));
        }
        let u32_at = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        let mut frame_sequence = [0u8; 8];
        frame_sequence.copy_from_slice(&data[8..16]);
        let audio_bytes = u32_at(24) as usize;
        if data.len() < HEADER_LEN + audio_bytes {
            return Err(CaptureError::EncoderFault("truncated chunk".into()));
        }
        chunks.push(ChunkSummary {
            index: u32_at(4),
            frame_sequence: u64::from_le_bytes(frame_sequence),
            width: u32_at(16),
            height: u32_at(20),
            audio_bytes,
        });
        data = &data[HEADER_LEN + audio_bytes..];
    }
    Ok(chunks)
}

#[derive(Debug, Default)]
struct ProbeState {
    running: AtomicBool,
    chunks_emitted: AtomicU64,
    empty_emitted: AtomicU64,
    last_settings: Mutex<Option<EncoderSettings>>,
}

/// Observes a `VirtualEncoder` after it has been handed to a session.
#[derive(Debug, Clone, Default)]
pub struct EncoderProbe(Arc<ProbeState>);

impl EncoderProbe {
    pub fn is_running(&self) -> bool {
        self.0.running.load(Ordering::SeqCst)
    }

    /// Chunks delivered, empty ones included.
    pub fn chunks_emitted(&self) -> u64 {
        self.0.chunks_emitted.load(Ordering::SeqCst)
    }

    pub fn empty_emitted(&self) -> u64 {
        self.0.empty_emitted.load(Ordering::SeqCst)
    }

    /// Settings of the most recent `start`.
    pub fn settings(&self) -> Option<EncoderSettings> {
        self.0.last_settings.lock().clone()
    }
}

/// `MediaEncoder` with knobs for the failure modes a browser encoder has.
pub struct VirtualEncoder {
    supported: Vec<String>,
    refuse_start: bool,
    fault_after: Option<u64>,
    silent: bool,
    probe: EncoderProbe,
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl VirtualEncoder {
    /// Encoder supporting every preferred container.
    pub fn new() -> Self {
        let supported = VIDEO_PREFERENCES
            .iter()
            .chain(AUDIO_PREFERENCES.iter())
            .map(|c| c.mime_type.to_string())
            .collect();
        Self {
            supported,
            refuse_start: false,
            fault_after: None,
            silent: false,
            probe: EncoderProbe::default(),
            stop_tx: None,
            handle: None,
        }
    }

    /// Only claim support for `mime_types`.
    pub fn supporting<S: Into<String>>(mut self, mime_types: impl IntoIterator<Item = S>) -> Self {
        self.supported = mime_types.into_iter().map(Into::into).collect();
        self
    }

    /// Reject every `start`.
    pub fn refusing_start(mut self) -> Self {
        self.refuse_start = true;
        self
    }

    /// Report a recoverable fault once `count` chunks have been emitted.
    pub fn fault_after(mut self, count: u64) -> Self {
        self.fault_after = Some(count);
        self
    }

    /// Emit only empty chunks.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn probe(&self) -> EncoderProbe {
        self.probe.clone()
    }

    fn shutdown_thread(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.probe.0.running.store(false, Ordering::SeqCst);
    }
}

impl Default for VirtualEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEncoder for VirtualEncoder {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|m| m == mime_type)
    }

    fn start(
        &mut self,
        stream: &MediaStream,
        settings: &EncoderSettings,
        on_chunk: ChunkCallback,
        on_error: EncoderErrorCallback,
    ) -> Result<(), CaptureError> {
        if self.handle.is_some() {
            return Err(CaptureError::EncoderFault("encoder already running".into()));
        }
        if self.refuse_start {
            return Err(CaptureError::EncoderFault(format!(
                "encoder refused stream as {}",
                settings.mime_type
            )));
        }

        let mut slicer = Slicer {
            audio: stream.live_audio().and_then(|t| t.subscribe()),
            video: stream.live_video().cloned(),
            index: 0,
            last_frame: 0,
            silent: self.silent,
            fault_after: self.fault_after,
            probe: self.probe.clone(),
            on_chunk,
            on_error,
        };
        *self.probe.0.last_settings.lock() = Some(settings.clone());

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let timeslice = settings.timeslice;
        let handle = thread::Builder::new()
            .name("sim-encoder".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(timeslice) {
                    Err(RecvTimeoutError::Timeout) => slicer.emit(),
                    _ => {
                        slicer.emit();
                        break;
                    }
                }
            })
            .map_err(|e| CaptureError::EncoderFault(format!("failed to spawn encoder thread: {e}")))?;

        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        self.probe.0.running.store(true, Ordering::SeqCst);
        log::info!("Virtual encoder started as {} every {:?}", settings.mime_type, timeslice);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if self.handle.is_none() {
            return Ok(());
        }
        self.shutdown_thread();
        log::info!("Virtual encoder stopped after {} chunk(s)", self.probe.chunks_emitted());
        Ok(())
    }
}

impl Drop for VirtualEncoder {
    fn drop(&mut self) {
        self.shutdown_thread();
    }
}

/// State owned by the encoder thread.
struct Slicer {
    audio: Option<AudioTap>,
    video: Option<Arc<MediaTrack>>,
    index: u32,
    last_frame: u64,
    silent: bool,
    fault_after: Option<u64>,
    probe: EncoderProbe,
    on_chunk: ChunkCallback,
    on_error: EncoderErrorCallback,
}

impl Slicer {
    fn emit(&mut self) {
        let chunk = if self.silent { Vec::new() } else { self.encode_slice() };
        if chunk.is_empty() {
            self.probe.0.empty_emitted.fetch_add(1, Ordering::SeqCst);
        }
        (self.on_chunk)(chunk);

        let emitted = self.probe.0.chunks_emitted.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fault_after == Some(emitted) {
            (self.on_error)(CaptureError::EncoderFault(format!("dropped frames after chunk {emitted}")));
        }
    }

    fn encode_slice(&mut self) -> Vec<u8> {
        let pcm = self
            .audio
            .as_ref()
            .map(|tap| to_int16_pcm(&tap.drain()))
            .unwrap_or_default();
        let frame = self
            .video
            .as_ref()
            .and_then(|track| track.latest_frame())
            .filter(|frame| frame.sequence > self.last_frame);

        if pcm.is_empty() && frame.is_none() {
            return Vec::new();
        }

        let (frame_sequence, width, height) = match &frame {
            Some(frame) => {
                self.last_frame = frame.sequence;
                (frame.sequence, frame.width, frame.height)
            }
            None => (self.last_frame, 0, 0),
        };

        let mut chunk = Vec::with_capacity(HEADER_LEN + pcm.len());
        chunk.extend_from_slice(CHUNK_MAGIC);
        chunk.extend_from_slice(&self.index.to_le_bytes());
        chunk.extend_from_slice(&frame_sequence.to_le_bytes());
        chunk.extend_from_slice(&width.to_le_bytes());
        chunk.extend_from_slice(&height.to_le_bytes());
        chunk.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
        chunk.extend_from_slice(&pcm);
        self.index += 1;
        chunk
    }
}
