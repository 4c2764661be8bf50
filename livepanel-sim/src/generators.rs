//! Background threads that feed synthetic media into tracks.
//!
//! Each generator runs until its track ends; stopping the track is the only
//! way to stop it.

use std::f32::consts::TAU;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use livepanel_core::models::error::CaptureError;
use livepanel_core::models::media::{MediaTrack, VideoFrame};

/// Interval between audio pushes.
pub const AUDIO_PERIOD: Duration = Duration::from_millis(10);

/// Push a sine tone of `frequency` Hz at `amplitude` into `track`.
pub fn spawn_tone(track: Arc<MediaTrack>, frequency: f32, amplitude: f32) -> Result<(), CaptureError> {
    let sample_rate = track.sample_rate().ok_or_else(|| {
        CaptureError::ConfigurationFailed(format!("track '{}' is not an audio track", track.label()))
    })?;
    let per_period = (sample_rate * AUDIO_PERIOD.as_secs_f64()).round().max(1.0) as usize;
    let step = TAU * frequency / sample_rate as f32;

    thread::Builder::new()
        .name(format!("sim-tone-{}", track.label()))
        .spawn(move || {
            let mut phase = 0.0f32;
            let mut buffer = vec![0.0f32; per_period];
            loop {
                for sample in &mut buffer {
                    *sample = phase.sin() * amplitude;
                    phase = (phase + step) % TAU;
                }
                if !track.push_samples(&buffer) {
                    break;
                }
                thread::sleep(AUDIO_PERIOD);
            }
            log::debug!("Tone generator for '{}' finished", track.label());
        })
        .map_err(|e| CaptureError::UnsupportedEnvironment(format!("failed to spawn tone thread: {e}")))?;
    Ok(())
}

/// Push `width`x`height` frames at `frame_rate` into `track`, cycling the
/// colour so consecutive frames differ.
pub fn spawn_frames(
    track: Arc<MediaTrack>,
    width: u32,
    height: u32,
    frame_rate: u32,
    base: [u8; 3],
) -> Result<(), CaptureError> {
    let period = Duration::from_secs_f64(1.0 / f64::from(frame_rate.max(1)));
    // First frame is available as soon as the source is handed out.
    track.push_frame(VideoFrame::solid(width, height, [base[0], base[1], base[2], 255]));

    thread::Builder::new()
        .name(format!("sim-frames-{}", track.label()))
        .spawn(move || {
            let mut shade: u8 = 0;
            loop {
                thread::sleep(period);
                shade = shade.wrapping_add(4);
                let frame = VideoFrame::solid(
                    width,
                    height,
                    [base[0], base[1], base[2].wrapping_add(shade), 255],
                );
                if !track.push_frame(frame) {
                    break;
                }
            }
            log::debug!("Frame generator for '{}' finished", track.label());
        })
        .map_err(|e| CaptureError::UnsupportedEnvironment(format!("failed to spawn frame thread: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn tone_reaches_subscribers_until_stopped() {
        let track = MediaTrack::audio("tone", 8000.0);
        let tap = track.subscribe().unwrap();
        spawn_tone(Arc::clone(&track), 440.0, 0.5).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while tap.available() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let samples = tap.drain();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|s| s.abs() <= 0.5 + f32::EPSILON));

        track.stop();
        assert!(!track.push_samples(&[0.0]));
    }

    #[test]
    fn frames_start_immediately() {
        let track = MediaTrack::video("screen");
        spawn_frames(Arc::clone(&track), 4, 4, 30, [10, 20, 30]).unwrap();

        let frame = track.latest_frame().unwrap();
        assert!(frame.is_well_formed());
        assert_eq!(frame.data[0], 10);
        track.stop();
    }

    #[test]
    fn tone_on_video_track_is_rejected() {
        assert!(spawn_tone(MediaTrack::video("screen"), 440.0, 0.5).is_err());
    }
}
