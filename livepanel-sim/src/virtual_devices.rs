//! Virtual screen, camera and microphones.
//!
//! Every granted request produces fresh tracks fed by generator threads.
//! The provider remembers every stream it handed out, so tests can count how
//! many raw handles of a kind are still live.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use livepanel_core::models::audio_models::DeviceInfo;
use livepanel_core::models::config::{AudioConstraints, CameraConstraints, ScreenConstraints};
use livepanel_core::models::error::CaptureError;
use livepanel_core::models::media::{MediaStream, MediaTrack, SourceKind};
use livepanel_core::traits::capture_provider::CaptureProvider;

use crate::generators::{spawn_frames, spawn_tone};
use crate::permissions::{PermissionScript, PromptStep};

/// Sample rate of every virtual audio source.
pub const SIM_SAMPLE_RATE: f64 = 48000.0;

/// A virtual microphone.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualMicrophone {
    pub info: DeviceInfo,
    /// Tone frequency, so mixes of different devices are distinguishable.
    pub frequency: f32,
}

/// Size of the synthetic frames and which inputs exist.
#[derive(Debug, Clone)]
pub struct VirtualRig {
    pub frame_width: u32,
    pub frame_height: u32,
    pub microphones: Vec<VirtualMicrophone>,
    /// Whether the shared screen offers system audio at all.
    pub screen_has_audio: bool,
}

impl Default for VirtualRig {
    fn default() -> Self {
        Self {
            frame_width: 64,
            frame_height: 36,
            microphones: vec![
                VirtualMicrophone {
                    info: DeviceInfo {
                        id: "default".into(),
                        label: "Default Microphone".into(),
                        is_default: true,
                    },
                    frequency: 440.0,
                },
                VirtualMicrophone {
                    info: DeviceInfo {
                        id: "usb-headset".into(),
                        label: "USB Headset".into(),
                        is_default: false,
                    },
                    frequency: 660.0,
                },
            ],
            screen_has_audio: true,
        }
    }
}

/// `CaptureProvider` backed by synthetic sources and a permission script.
pub struct VirtualCaptureProvider {
    rig: VirtualRig,
    script: PermissionScript,
    issued: Mutex<Vec<(SourceKind, MediaStream)>>,
}

impl VirtualCaptureProvider {
    pub fn new(rig: VirtualRig) -> Self {
        Self {
            rig,
            script: PermissionScript::new(),
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Queue the answer to the next request of `kind`.
    pub fn script(&self, kind: SourceKind, step: PromptStep) {
        self.script.push(kind, step);
    }

    /// Raw handles of `kind` handed out and not yet stopped.
    pub fn live_handles(&self, kind: SourceKind) -> usize {
        self.issued
            .lock()
            .iter()
            .filter(|(k, stream)| *k == kind && stream.is_live())
            .count()
    }

    /// Every stream of `kind` handed out so far, oldest first.
    pub fn issued(&self, kind: SourceKind) -> Vec<MediaStream> {
        self.issued
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, stream)| stream.clone())
            .collect()
    }

    /// Simulate the user ending a share from outside the app.
    pub fn end_externally(&self, kind: SourceKind) {
        for stream in self.issued(kind) {
            stream.stop_all();
        }
    }

    async fn prompt(&self, kind: SourceKind) -> Result<(), CaptureError> {
        let step = self.script.next(kind);
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        match step.answer.to_error(kind) {
            Some(err) => {
                log::info!("Virtual {} request refused: {}", kind, err);
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn issue(&self, kind: SourceKind, stream: MediaStream) -> MediaStream {
        self.issued.lock().push((kind, stream.clone()));
        log::info!("Virtual {} granted ({} track(s))", kind, stream.tracks().len());
        stream
    }
}

impl Default for VirtualCaptureProvider {
    fn default() -> Self {
        Self::new(VirtualRig::default())
    }
}

#[async_trait]
impl CaptureProvider for VirtualCaptureProvider {
    async fn acquire_screen(&self, constraints: &ScreenConstraints) -> Result<MediaStream, CaptureError> {
        self.prompt(SourceKind::Screen).await?;

        let video = MediaTrack::video("screen");
        spawn_frames(
            Arc::clone(&video),
            self.rig.frame_width,
            self.rig.frame_height,
            constraints.frame_rate,
            [32, 96, 160],
        )?;
        let mut stream = MediaStream::with_tracks([video])?;

        if constraints.capture_system_audio && self.rig.screen_has_audio {
            let audio = MediaTrack::audio("screen-audio", SIM_SAMPLE_RATE);
            spawn_tone(Arc::clone(&audio), 220.0, 0.3)?;
            stream.add_track(audio)?;
        }
        Ok(self.issue(SourceKind::Screen, stream))
    }

    async fn acquire_camera(&self, constraints: &CameraConstraints) -> Result<MediaStream, CaptureError> {
        self.prompt(SourceKind::Camera).await?;

        let video = MediaTrack::video("camera");
        spawn_frames(
            Arc::clone(&video),
            self.rig.frame_width,
            self.rig.frame_height,
            constraints.frame_rate,
            [200, 160, 120],
        )?;
        let stream = MediaStream::with_tracks([video])?;
        Ok(self.issue(SourceKind::Camera, stream))
    }

    async fn acquire_microphone(
        &self,
        device_id: &str,
        _constraints: &AudioConstraints,
    ) -> Result<MediaStream, CaptureError> {
        self.prompt(SourceKind::Microphone).await?;

        let microphone = self
            .rig
            .microphones
            .iter()
            .find(|m| m.info.id == device_id)
            .ok_or(CaptureError::DeviceNotFound(SourceKind::Microphone))?;

        let audio = MediaTrack::audio(format!("mic-{}", microphone.info.id), SIM_SAMPLE_RATE);
        spawn_tone(Arc::clone(&audio), microphone.frequency, 0.4)?;
        let stream = MediaStream::with_tracks([audio])?;
        Ok(self.issue(SourceKind::Microphone, stream))
    }

    fn audio_inputs(&self) -> Result<Vec<DeviceInfo>, CaptureError> {
        Ok(self.rig.microphones.iter().map(|m| m.info.clone()).collect())
    }
}
