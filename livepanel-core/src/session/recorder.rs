use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::error::CaptureError;
use crate::models::recording_result::{recording_file_name, RecordingArtifact, RecordingMetadata};
use crate::models::state::RecorderState;
use crate::processing::codec::{self, ContainerFormat};
use crate::session::composer::ComposedStream;
use crate::storage::export::sha256_hex;
use crate::traits::encoder::{ChunkCallback, EncoderErrorCallback, EncoderSettings, MediaEncoder};
use crate::traits::session_delegate::SessionDelegate;

/// Counters kept across recordings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub chunks_received: u64,
    pub empty_chunks_dropped: u64,
    pub bytes_buffered: u64,
    pub encoder_faults: u64,
}

#[derive(Debug, Default)]
struct ChunkBuffer {
    chunks: Vec<Vec<u8>>,
    bytes: u64,
}

/// State reachable from encoder callbacks and from status queries while the
/// recorder itself is busy finalizing.
#[derive(Default)]
struct RecorderShared {
    state: Mutex<RecorderState>,
    buffer: Mutex<ChunkBuffer>,
    faults: Mutex<Vec<String>>,
    stats: Mutex<RecorderStats>,
}

impl RecorderShared {
    fn push_chunk(&self, chunk: Vec<u8>) {
        let mut stats = self.stats.lock();
        if chunk.is_empty() {
            stats.empty_chunks_dropped += 1;
            return;
        }
        stats.chunks_received += 1;

        let mut buffer = self.buffer.lock();
        buffer.bytes += chunk.len() as u64;
        stats.bytes_buffered = buffer.bytes;
        buffer.chunks.push(chunk);
    }

    fn record_fault(&self, error: &CaptureError) {
        self.faults.lock().push(error.to_string());
        self.stats.lock().encoder_faults += 1;
    }
}

/// Read-only view of a recorder that does not need the recorder itself.
#[derive(Clone)]
pub struct RecorderProbe(Arc<RecorderShared>);

impl RecorderProbe {
    pub fn state(&self) -> RecorderState {
        *self.0.state.lock()
    }

    /// Non-empty chunks buffered for the current recording.
    pub fn chunk_count(&self) -> usize {
        self.0.buffer.lock().chunks.len()
    }

    pub fn stats(&self) -> RecorderStats {
        *self.0.stats.lock()
    }
}

struct ActiveRecording {
    id: Uuid,
    format: ContainerFormat,
    composed: ComposedStream,
    started_at: DateTime<Utc>,
    started: Instant,
}

/// Idle -> Recording -> Finalizing -> Idle.
///
/// Chunks arrive on the encoder thread and are buffered in order; empty
/// chunks are dropped. `stop` waits for the encoder to flush and then joins
/// the buffer into a single artifact.
pub struct RecorderSession {
    encoder: Box<dyn MediaEncoder>,
    shared: Arc<RecorderShared>,
    active: Option<ActiveRecording>,
    delegate: Option<Arc<dyn SessionDelegate>>,
}

impl RecorderSession {
    pub fn new(encoder: Box<dyn MediaEncoder>) -> Self {
        Self {
            encoder,
            shared: Arc::new(RecorderShared::default()),
            active: None,
            delegate: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn SessionDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn state(&self) -> RecorderState {
        *self.shared.state.lock()
    }

    pub fn probe(&self) -> RecorderProbe {
        RecorderProbe(Arc::clone(&self.shared))
    }

    /// Format of the recording in progress.
    pub fn format(&self) -> Option<&ContainerFormat> {
        self.active.as_ref().map(|a| &a.format)
    }

    /// Negotiate a container and start the encoder on `composed`.
    ///
    /// Fails with `AlreadyRecording` unless idle. If the encoder refuses to
    /// start the recorder stays idle.
    pub fn start(&mut self, composed: ComposedStream, timeslice: Duration) -> Result<ContainerFormat, CaptureError> {
        if !self.state().is_idle() {
            return Err(CaptureError::AlreadyRecording);
        }
        if composed.stream.is_empty() {
            return Err(CaptureError::NoTracksAvailable);
        }

        let format = codec::negotiate(composed.has_video(), |mime| self.encoder.is_type_supported(mime));
        *self.shared.buffer.lock() = ChunkBuffer::default();
        self.shared.faults.lock().clear();

        let on_chunk: ChunkCallback = {
            let shared = Arc::clone(&self.shared);
            Arc::new(move |chunk| shared.push_chunk(chunk))
        };
        let on_error: EncoderErrorCallback = {
            let shared = Arc::clone(&self.shared);
            let delegate = self.delegate.clone();
            Arc::new(move |error| {
                log::error!("Encoder fault: {}", error);
                shared.record_fault(&error);
                if let Some(delegate) = &delegate {
                    delegate.on_error(&error);
                }
            })
        };

        let settings = EncoderSettings {
            mime_type: format.mime_type.clone(),
            timeslice,
        };
        self.encoder
            .start(&composed.stream, &settings, on_chunk, on_error)
            .map_err(|e| {
                log::error!("Encoder failed to start: {}", e);
                e
            })?;

        self.active = Some(ActiveRecording {
            id: Uuid::new_v4(),
            format: format.clone(),
            composed,
            started_at: Utc::now(),
            started: Instant::now(),
        });
        self.transition(RecorderState::Recording);
        log::info!("Recording started as {} (timeslice {:?})", format.mime_type, timeslice);
        Ok(format)
    }

    /// Flush the encoder and produce the artifact.
    ///
    /// `Ok(None)` when nothing was recording. A recording that produced no
    /// bytes still returns to idle but reports `EncoderFault`.
    pub fn stop(&mut self) -> Result<Option<RecordingArtifact>, CaptureError> {
        if !self.state().is_recording() {
            return Ok(None);
        }
        self.transition(RecorderState::Finalizing);

        if let Err(e) = self.encoder.stop() {
            log::error!("Encoder failed while stopping: {}", e);
            self.shared.record_fault(&e);
        }

        let buffer = std::mem::take(&mut *self.shared.buffer.lock());
        let faults = std::mem::take(&mut *self.shared.faults.lock());
        let active = self.active.take();
        self.shared.stats.lock().bytes_buffered = 0;
        self.transition(RecorderState::Idle);

        let Some(active) = active else {
            return Err(CaptureError::EncoderFault("recording state was lost".into()));
        };
        if buffer.bytes == 0 {
            log::warn!("Recording {} produced no data", active.id);
            return Err(CaptureError::EncoderFault("recording produced no data".into()));
        }

        let chunk_count = buffer.chunks.len();
        let data = buffer.chunks.concat();
        let finished_at = Utc::now();
        let metadata = RecordingMetadata {
            id: active.id.to_string(),
            mime_type: active.format.mime_type.clone(),
            extension: active.format.extension.clone(),
            baseline_format: active.format.baseline,
            started_at: active.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_secs: active.started.elapsed().as_secs_f64(),
            chunk_count,
            byte_length: data.len() as u64,
            checksum: sha256_hex(&data),
            video_origin: active.composed.video_origin,
            has_audio: active.composed.has_audio,
            encoder_faults: faults,
        };
        let artifact = RecordingArtifact {
            file_name: recording_file_name(finished_at, &active.format.extension),
            data,
            metadata,
        };
        log::info!(
            "Recording finalized: {} ({} bytes in {} chunks)",
            artifact.file_name,
            artifact.len(),
            chunk_count
        );
        Ok(Some(artifact))
    }

    fn transition(&self, next: RecorderState) {
        *self.shared.state.lock() = next;
        log::debug!("Recorder state -> {:?}", next);
        if let Some(delegate) = &self.delegate {
            delegate.on_recorder_state_changed(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media::{MediaStream, MediaTrack};
    use crate::models::recording_result::VideoOrigin;

    /// Encoder that emits a scripted list of chunks: all but the last on
    /// start, the last on stop.
    struct ScriptedEncoder {
        supported: Vec<&'static str>,
        script: Vec<Vec<u8>>,
        fail_start: bool,
        fault_on_start: bool,
        on_chunk: Option<ChunkCallback>,
        last_settings: Arc<Mutex<Option<EncoderSettings>>>,
    }

    impl ScriptedEncoder {
        fn new(script: Vec<Vec<u8>>) -> Self {
            Self {
                supported: vec!["video/webm;codecs=vp9,opus", "audio/webm;codecs=opus"],
                script,
                fail_start: false,
                fault_on_start: false,
                on_chunk: None,
                last_settings: Arc::new(Mutex::new(None)),
            }
        }
    }

    impl MediaEncoder for ScriptedEncoder {
        fn is_type_supported(&self, mime_type: &str) -> bool {
            self.supported.iter().any(|m| *m == mime_type)
        }

        fn start(
            &mut self,
            _stream: &MediaStream,
            settings: &EncoderSettings,
            on_chunk: ChunkCallback,
            on_error: EncoderErrorCallback,
        ) -> Result<(), CaptureError> {
            if self.fail_start {
                return Err(CaptureError::EncoderFault("no encoder for stream".into()));
            }
            *self.last_settings.lock() = Some(settings.clone());
            if self.fault_on_start {
                on_error(CaptureError::EncoderFault("dropped a frame".into()));
            }
            let last = self.script.len().saturating_sub(1);
            for chunk in self.script.iter().take(last) {
                on_chunk(chunk.clone());
            }
            self.on_chunk = Some(on_chunk);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), CaptureError> {
            if let (Some(on_chunk), Some(last)) = (self.on_chunk.take(), self.script.last()) {
                on_chunk(last.clone());
            }
            Ok(())
        }
    }

    fn composed_video() -> ComposedStream {
        let stream = MediaStream::with_tracks([MediaTrack::video("screen"), MediaTrack::audio("mix", 48000.0)]).unwrap();
        ComposedStream {
            stream,
            video_origin: Some(VideoOrigin::Screen),
            has_audio: true,
        }
    }

    fn composed_audio() -> ComposedStream {
        ComposedStream {
            stream: MediaStream::with_tracks([MediaTrack::audio("mix", 48000.0)]).unwrap(),
            video_origin: None,
            has_audio: true,
        }
    }

    #[test]
    fn concatenates_chunks_in_order_and_drops_empty_ones() {
        let script = vec![b"aa".to_vec(), Vec::new(), b"bb".to_vec(), b"cc".to_vec()];
        let mut recorder = RecorderSession::new(Box::new(ScriptedEncoder::new(script)));

        recorder.start(composed_video(), Duration::from_secs(1)).unwrap();
        assert_eq!(recorder.state(), RecorderState::Recording);
        assert_eq!(recorder.probe().chunk_count(), 2);

        let artifact = recorder.stop().unwrap().unwrap();

        assert_eq!(artifact.data, b"aabbcc");
        assert_eq!(artifact.metadata.chunk_count, 3);
        assert_eq!(artifact.metadata.byte_length, 6);
        assert_eq!(artifact.metadata.checksum, sha256_hex(b"aabbcc"));
        assert!(artifact.file_name.starts_with("recording-"));
        assert!(artifact.file_name.ends_with(".webm"));
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert_eq!(recorder.probe().stats().empty_chunks_dropped, 1);
        assert_eq!(recorder.probe().chunk_count(), 0);
    }

    #[test]
    fn second_start_is_rejected() {
        let mut recorder = RecorderSession::new(Box::new(ScriptedEncoder::new(vec![b"x".to_vec()])));
        recorder.start(composed_video(), Duration::from_secs(1)).unwrap();

        let err = recorder.start(composed_video(), Duration::from_secs(1)).unwrap_err();
        assert_eq!(err, CaptureError::AlreadyRecording);
        assert_eq!(recorder.state(), RecorderState::Recording);
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let mut recorder = RecorderSession::new(Box::new(ScriptedEncoder::new(Vec::new())));
        assert_eq!(recorder.stop().unwrap(), None);
        assert_eq!(recorder.state(), RecorderState::Idle);
    }

    #[test]
    fn zero_bytes_returns_to_idle_with_fault() {
        let mut recorder = RecorderSession::new(Box::new(ScriptedEncoder::new(vec![Vec::new()])));
        recorder.start(composed_video(), Duration::from_secs(1)).unwrap();

        let err = recorder.stop().unwrap_err();

        assert!(matches!(err, CaptureError::EncoderFault(_)));
        assert_eq!(recorder.state(), RecorderState::Idle);
        recorder.start(composed_video(), Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn encoder_start_failure_stays_idle() {
        let mut encoder = ScriptedEncoder::new(Vec::new());
        encoder.fail_start = true;
        let mut recorder = RecorderSession::new(Box::new(encoder));

        assert!(recorder.start(composed_video(), Duration::from_secs(1)).is_err());
        assert_eq!(recorder.state(), RecorderState::Idle);
    }

    #[test]
    fn audio_only_uses_audio_container() {
        let encoder = ScriptedEncoder::new(vec![b"ogg".to_vec()]);
        let settings = Arc::clone(&encoder.last_settings);
        let mut recorder = RecorderSession::new(Box::new(encoder));

        let format = recorder.start(composed_audio(), Duration::from_millis(250)).unwrap();
        assert_eq!(format.mime_type, "audio/webm;codecs=opus");
        assert_eq!(settings.lock().as_ref().unwrap().timeslice, Duration::from_millis(250));

        let artifact = recorder.stop().unwrap().unwrap();
        assert!(artifact.file_name.ends_with(".weba"));
        assert_eq!(artifact.metadata.video_origin, None);
    }

    #[test]
    fn unsupported_everything_uses_baseline() {
        let mut encoder = ScriptedEncoder::new(vec![b"x".to_vec()]);
        encoder.supported.clear();
        let mut recorder = RecorderSession::new(Box::new(encoder));

        let format = recorder.start(composed_video(), Duration::from_secs(1)).unwrap();
        assert_eq!(format.mime_type, "video/webm");
        assert!(recorder.stop().unwrap().unwrap().metadata.baseline_format);
    }

    #[test]
    fn runtime_faults_are_recorded_in_metadata() {
        let mut encoder = ScriptedEncoder::new(vec![b"x".to_vec()]);
        encoder.fault_on_start = true;
        let mut recorder = RecorderSession::new(Box::new(encoder));

        recorder.start(composed_video(), Duration::from_secs(1)).unwrap();
        let artifact = recorder.stop().unwrap().unwrap();

        assert_eq!(artifact.metadata.encoder_faults.len(), 1);
        assert_eq!(recorder.probe().stats().encoder_faults, 1);
    }
}
