use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::models::media::{MediaStream, MediaTrack};
use crate::models::recording_result::VideoOrigin;

/// The stream handed to the encoder: at most one video and one audio track.
#[derive(Debug, Clone)]
pub struct ComposedStream {
    pub stream: MediaStream,
    pub video_origin: Option<VideoOrigin>,
    pub has_audio: bool,
}

impl ComposedStream {
    pub fn has_video(&self) -> bool {
        self.video_origin.is_some()
    }
}

/// Pick the video and audio tracks to record.
///
/// Video priority is screen, then the filtered camera, then the raw camera.
/// Only live tracks are used. Audio comes solely from the mixer output.
pub fn compose(
    screen: Option<&MediaStream>,
    camera: Option<&MediaStream>,
    filtered_camera: Option<&MediaStream>,
    mixed_audio: Option<&Arc<MediaTrack>>,
) -> Result<ComposedStream, CaptureError> {
    let video = screen
        .and_then(|s| s.live_video())
        .map(|t| (Arc::clone(t), VideoOrigin::Screen))
        .or_else(|| {
            camera?;
            filtered_camera
                .and_then(|s| s.live_video())
                .map(|t| (Arc::clone(t), VideoOrigin::FilteredCamera))
        })
        .or_else(|| {
            camera
                .and_then(|s| s.live_video())
                .map(|t| (Arc::clone(t), VideoOrigin::Camera))
        });

    let audio = mixed_audio.filter(|t| t.is_live()).map(Arc::clone);

    if video.is_none() && audio.is_none() {
        return Err(CaptureError::NoTracksAvailable);
    }

    let mut stream = MediaStream::new();
    let video_origin = match video {
        Some((track, origin)) => {
            stream.add_track(track)?;
            Some(origin)
        }
        None => None,
    };
    let has_audio = match audio {
        Some(track) => {
            stream.add_track(track)?;
            true
        }
        None => false,
    };

    log::info!("Composed recording stream: video {:?}, audio {}", video_origin, has_audio);
    Ok(ComposedStream {
        stream,
        video_origin,
        has_audio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_stream(label: &str) -> MediaStream {
        MediaStream::with_tracks([MediaTrack::video(label)]).unwrap()
    }

    #[test]
    fn nothing_live_is_an_error() {
        let err = compose(None, None, None, None).unwrap_err();
        assert_eq!(err, CaptureError::NoTracksAvailable);

        let ended = video_stream("screen");
        ended.stop_all();
        assert!(compose(Some(&ended), None, None, None).is_err());
    }

    #[test]
    fn audio_only_when_just_the_mix_exists() {
        let mix = MediaTrack::audio("mix", 48000.0);
        let composed = compose(None, None, None, Some(&mix)).unwrap();

        assert_eq!(composed.stream.tracks().len(), 1);
        assert!(composed.has_audio);
        assert!(!composed.has_video());
    }

    #[test]
    fn screen_beats_camera() {
        let screen = video_stream("screen");
        let camera = video_stream("camera");
        let filtered = video_stream("filtered");

        let composed = compose(Some(&screen), Some(&camera), Some(&filtered), None).unwrap();

        assert_eq!(composed.video_origin, Some(VideoOrigin::Screen));
        assert!(composed.stream.contains(screen.tracks()[0].id()));
        assert!(!composed.stream.contains(camera.tracks()[0].id()));
    }

    #[test]
    fn filtered_camera_beats_raw_camera() {
        let camera = video_stream("camera");
        let filtered = video_stream("filtered");

        let composed = compose(None, Some(&camera), Some(&filtered), None).unwrap();
        assert_eq!(composed.video_origin, Some(VideoOrigin::FilteredCamera));

        filtered.stop_all();
        let composed = compose(None, Some(&camera), Some(&filtered), None).unwrap();
        assert_eq!(composed.video_origin, Some(VideoOrigin::Camera));
    }

    #[test]
    fn filtered_output_without_camera_is_ignored() {
        let filtered = video_stream("filtered");
        assert!(compose(None, None, Some(&filtered), None).is_err());
    }

    #[test]
    fn at_most_one_track_per_kind() {
        let mut screen = video_stream("screen");
        screen.add_track(MediaTrack::audio("system", 48000.0)).unwrap();
        let mix = MediaTrack::audio("mix", 48000.0);

        let composed = compose(Some(&screen), None, None, Some(&mix)).unwrap();

        assert_eq!(composed.stream.video_tracks().count(), 1);
        assert_eq!(composed.stream.audio_tracks().count(), 1);
        assert!(composed.stream.contains(mix.id()));
    }
}
