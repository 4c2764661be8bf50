use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::CaptureError;
use crate::processing::ring_buffer::RingBuffer;

/// Seconds of audio a subscriber tap holds before dropping the oldest samples.
const TAP_CAPACITY_SECS: f64 = 5.0;

/// The three raw capture kinds owned by the device manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Screen,
    Camera,
    Microphone,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Screen, SourceKind::Camera, SourceKind::Microphone];
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Screen => "screen",
            Self::Camera => "camera",
            Self::Microphone => "microphone",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// One RGBA8 video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<Vec<u8>>,
    /// Assigned by the track when the frame is pushed.
    pub sequence: u64,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data: Arc::new(data),
            sequence: 0,
        }
    }

    /// A frame filled with a single RGBA colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self::new(width, height, data)
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.width as usize * self.height as usize * 4
    }
}

/// Subscriber side of an audio track: a private ring buffer the track writes into.
///
/// Dropping the tap unsubscribes it.
pub struct AudioTap {
    buffer: Arc<Mutex<RingBuffer>>,
    sample_rate: f64,
    track_id: Uuid,
}

impl AudioTap {
    /// Take every sample delivered since the last drain.
    pub fn drain(&self) -> Vec<f32> {
        let mut buffer = self.buffer.lock();
        let available = buffer.count();
        buffer.read(available)
    }

    /// Take at most `count` samples, leaving the rest buffered.
    pub fn read(&self, count: usize) -> Vec<f32> {
        self.buffer.lock().read(count)
    }

    pub fn available(&self) -> usize {
        self.buffer.lock().count()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn track_id(&self) -> Uuid {
        self.track_id
    }
}

/// An indivisible audio or video unit within a stream.
///
/// Audio tracks fan mono f32 samples out to every live `AudioTap`.
/// Video tracks keep only the most recent frame.
pub struct MediaTrack {
    id: Uuid,
    kind: TrackKind,
    label: String,
    sample_rate: f64,
    live: AtomicBool,
    taps: Mutex<Vec<Weak<Mutex<RingBuffer>>>>,
    latest_frame: Mutex<Option<VideoFrame>>,
    frame_sequence: AtomicU64,
}

impl MediaTrack {
    pub fn audio(label: impl Into<String>, sample_rate: f64) -> Arc<Self> {
        Arc::new(Self::new(TrackKind::Audio, label.into(), sample_rate))
    }

    pub fn video(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(TrackKind::Video, label.into(), 0.0))
    }

    fn new(kind: TrackKind, label: String, sample_rate: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            label,
            sample_rate,
            live: AtomicBool::new(true),
            taps: Mutex::new(Vec::new()),
            latest_frame: Mutex::new(None),
            frame_sequence: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Sample rate of an audio track, `None` for video.
    pub fn sample_rate(&self) -> Option<f64> {
        match self.kind {
            TrackKind::Audio => Some(self.sample_rate),
            TrackKind::Video => None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// End the track. Idempotent.
    pub fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            log::debug!("{:?} track '{}' ({}) ended", self.kind, self.label, self.id);
            self.taps.lock().clear();
        }
    }

    /// Subscribe to an audio track's samples. Returns `None` for video tracks.
    pub fn subscribe(&self) -> Option<AudioTap> {
        if self.kind != TrackKind::Audio {
            return None;
        }
        let capacity = (self.sample_rate * TAP_CAPACITY_SECS).max(1.0) as usize;
        let buffer = Arc::new(Mutex::new(RingBuffer::new(capacity)));
        self.taps.lock().push(Arc::downgrade(&buffer));
        Some(AudioTap {
            buffer,
            sample_rate: self.sample_rate,
            track_id: self.id,
        })
    }

    /// Deliver samples to every subscriber. Returns false once the track has ended.
    pub fn push_samples(&self, samples: &[f32]) -> bool {
        if !self.is_live() || self.kind != TrackKind::Audio {
            return false;
        }
        let mut taps = self.taps.lock();
        taps.retain(|tap| match tap.upgrade() {
            Some(buffer) => {
                buffer.lock().write(samples);
                true
            }
            None => false,
        });
        true
    }

    /// Replace the current frame. Returns false once the track has ended.
    pub fn push_frame(&self, mut frame: VideoFrame) -> bool {
        if !self.is_live() || self.kind != TrackKind::Video {
            return false;
        }
        frame.sequence = self.frame_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        *self.latest_frame.lock() = Some(frame);
        true
    }

    pub fn latest_frame(&self) -> Option<VideoFrame> {
        self.latest_frame.lock().clone()
    }

    /// Number of frames pushed so far.
    pub fn frame_sequence(&self) -> u64 {
        self.frame_sequence.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.taps.lock().iter().filter(|tap| tap.strong_count() > 0).count()
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("live", &self.is_live())
            .finish()
    }
}

/// An ordered set of tracks. A track appears at most once.
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: Uuid,
    tracks: Vec<Arc<MediaTrack>>,
}

impl MediaStream {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            tracks: Vec::new(),
        }
    }

    pub fn with_tracks(tracks: impl IntoIterator<Item = Arc<MediaTrack>>) -> Result<Self, CaptureError> {
        let mut stream = Self::new();
        for track in tracks {
            stream.add_track(track)?;
        }
        Ok(stream)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracks(&self) -> &[Arc<MediaTrack>] {
        &self.tracks
    }

    pub fn add_track(&mut self, track: Arc<MediaTrack>) -> Result<(), CaptureError> {
        if self.contains(track.id()) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "track {} is already part of stream {}",
                track.id(),
                self.id
            )));
        }
        self.tracks.push(track);
        Ok(())
    }

    pub fn contains(&self, track_id: Uuid) -> bool {
        self.tracks.iter().any(|t| t.id() == track_id)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &Arc<MediaTrack>> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &Arc<MediaTrack>> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    /// First video track that has not ended.
    pub fn live_video(&self) -> Option<&Arc<MediaTrack>> {
        self.video_tracks().find(|t| t.is_live())
    }

    /// First audio track that has not ended.
    pub fn live_audio(&self) -> Option<&Arc<MediaTrack>> {
        self.audio_tracks().find(|t| t.is_live())
    }

    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(|t| t.is_live())
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

impl Default for MediaStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_samples_fan_out_to_every_tap() {
        let track = MediaTrack::audio("mic", 48000.0);
        let a = track.subscribe().unwrap();
        let b = track.subscribe().unwrap();

        assert!(track.push_samples(&[0.1, 0.2]));

        assert_eq!(a.drain(), vec![0.1, 0.2]);
        assert_eq!(b.drain(), vec![0.1, 0.2]);
        assert!(a.drain().is_empty());

        track.push_samples(&[0.3, 0.4, 0.5]);
        assert_eq!(b.read(2), vec![0.3, 0.4]);
        assert_eq!(b.available(), 1);
        assert_eq!(b.drain(), vec![0.5]);
    }

    #[test]
    fn dropped_tap_is_pruned() {
        let track = MediaTrack::audio("mic", 48000.0);
        let tap = track.subscribe().unwrap();
        assert_eq!(track.subscriber_count(), 1);

        drop(tap);
        track.push_samples(&[0.5]);
        assert_eq!(track.subscriber_count(), 0);
    }

    #[test]
    fn stopped_track_ignores_pushes() {
        let track = MediaTrack::video("screen");
        track.stop();
        track.stop();

        assert!(!track.is_live());
        assert!(!track.push_frame(VideoFrame::solid(2, 2, [0, 0, 0, 255])));
        assert!(track.latest_frame().is_none());
    }

    #[test]
    fn frames_are_sequenced() {
        let track = MediaTrack::video("camera");
        track.push_frame(VideoFrame::solid(2, 2, [255, 0, 0, 255]));
        track.push_frame(VideoFrame::solid(2, 2, [0, 255, 0, 255]));

        let frame = track.latest_frame().unwrap();
        assert_eq!(frame.sequence, 2);
        assert_eq!(&frame.data[0..4], &[0, 255, 0, 255]);
        assert!(frame.is_well_formed());
    }

    #[test]
    fn video_track_has_no_tap() {
        assert!(MediaTrack::video("screen").subscribe().is_none());
    }

    #[test]
    fn stream_rejects_duplicate_track() {
        let track = MediaTrack::audio("mix", 48000.0);
        let mut stream = MediaStream::new();
        stream.add_track(Arc::clone(&track)).unwrap();

        let err = stream.add_track(track).unwrap_err();
        assert!(matches!(err, CaptureError::ConfigurationFailed(_)));
        assert_eq!(stream.tracks().len(), 1);
    }

    #[test]
    fn live_lookups_skip_ended_tracks() {
        let ended = MediaTrack::video("old");
        ended.stop();
        let fresh = MediaTrack::video("new");
        let stream = MediaStream::with_tracks([ended, Arc::clone(&fresh)]).unwrap();

        assert_eq!(stream.live_video().map(|t| t.id()), Some(fresh.id()));
        assert!(stream.live_audio().is_none());

        stream.stop_all();
        assert!(!stream.is_live());
    }
}
