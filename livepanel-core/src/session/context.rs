use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::models::audio_models::{AudioLevels, DeviceInfo, SessionDiagnostics};
use crate::models::config::{CameraConstraints, ScreenConstraints, SessionConfig};
use crate::models::error::CaptureError;
use crate::models::media::{MediaStream, SourceKind};
use crate::models::preferences::{Preferences, MIC_VOLUME_KEY, SCREEN_VOLUME_KEY, SELECTED_MICROPHONE_KEY};
use crate::models::recording_result::{screenshot_file_name, RecordingArtifact, Screenshot, VideoOrigin};
use crate::models::state::{FilterMode, RecorderState, SessionStatus};
use crate::processing::codec::ContainerFormat;
use crate::processing::gain::{GainPath, GainTelemetry};
use crate::processing::mixer::{AudioMixer, MixInput, MixedAudioOutput};
use crate::processing::monitor::AudioMonitor;
use crate::session::composer::compose;
use crate::session::devices::{DeviceSourceManager, StopOutcome};
use crate::session::filter::{FilterController, FilterOutcome};
use crate::session::recorder::{RecorderProbe, RecorderSession};
use crate::storage::export::encode_png;
use crate::traits::capture_provider::CaptureProvider;
use crate::traits::encoder::MediaEncoder;
use crate::traits::filter_gateway::FilterGateway;
use crate::traits::preference_store::PreferenceStore;
use crate::traits::session_delegate::SessionDelegate;

/// What `start_recording` set up.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingStarted {
    pub format: ContainerFormat,
    pub video_origin: Option<VideoOrigin>,
    pub has_audio: bool,
}

/// The media session: owns every source, the mixer, the filter and the
/// recorder, and exposes the control-panel commands.
///
/// Commands take `&self` and may be issued concurrently from several tasks.
/// No lock is held across an `.await`; acquisitions that resolve after a
/// later command superseded them are released on arrival.
///
/// ```text
/// [Screen] ──video──────────────────────────────┐
///    └──system audio─→ [GainStage] ─┐           │
///                                   ├→ [Mixer] ─┼→ [Composer] → [Recorder] → artifact
/// [Mic] ─→ [GainStage] ─────────────┘           │
///   └────→ [Monitor GainStage] → levels         │
/// [Camera] ─→ [Filter gateway] ─────────────────┘
/// ```
pub struct MediaSession {
    config: SessionConfig,
    devices: DeviceSourceManager,
    filter: FilterController,
    mixer: AudioMixer,
    recorder: Mutex<RecorderSession>,
    recorder_probe: RecorderProbe,
    mixed: Mutex<Option<MixedAudioOutput>>,
    monitor: Mutex<Option<AudioMonitor>>,
    levels: Mutex<AudioLevels>,
    preferences: Mutex<Preferences>,
    store: Arc<dyn PreferenceStore>,
    delegate: Option<Arc<dyn SessionDelegate>>,
    finished_mix_cycles: AtomicU64,
}

impl MediaSession {
    /// Build a session. Preferences are read from `store` once, here.
    pub fn new(
        config: SessionConfig,
        provider: Arc<dyn CaptureProvider>,
        encoder: Box<dyn MediaEncoder>,
        store: Arc<dyn PreferenceStore>,
    ) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;

        let preferences = Preferences::load(store.as_ref());
        log::info!(
            "Session preferences: mic {}%, screen {}%, microphone '{}'",
            preferences.mic_volume,
            preferences.screen_volume,
            preferences.selected_microphone
        );

        let recorder = RecorderSession::new(encoder);
        let recorder_probe = recorder.probe();
        Ok(Self {
            mixer: AudioMixer::new(config.sample_rate, config.mix_tick),
            config,
            devices: DeviceSourceManager::new(provider),
            filter: FilterController::new(None),
            recorder: Mutex::new(recorder),
            recorder_probe,
            mixed: Mutex::new(None),
            monitor: Mutex::new(None),
            levels: Mutex::new(AudioLevels::default()),
            preferences: Mutex::new(preferences),
            store,
            delegate: None,
            finished_mix_cycles: AtomicU64::new(0),
        })
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn SessionDelegate>) {
        self.recorder.get_mut().set_delegate(Arc::clone(&delegate));
        self.delegate = Some(delegate);
    }

    pub fn set_filter_gateway(&mut self, gateway: Arc<dyn FilterGateway>) {
        self.filter = FilterController::new(Some(gateway));
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Acquire the screen, replacing any current screen source.
    pub async fn start_screen(&self, constraints: Option<ScreenConstraints>) -> Result<MediaStream, CaptureError> {
        let constraints = constraints.unwrap_or_else(|| self.config.screen.clone());
        let acquired = self.devices.start_screen(&constraints).await?;
        self.notify_source(SourceKind::Screen, true);
        Ok(acquired.stream)
    }

    /// Release the screen. Idempotent.
    pub fn stop_screen(&self) -> StopOutcome {
        let outcome = self.devices.stop(SourceKind::Screen);
        if outcome == StopOutcome::Released {
            self.notify_source(SourceKind::Screen, false);
        }
        outcome
    }

    /// Acquire the camera, replacing any current camera source.
    ///
    /// The filter is not re-applied here; call `refresh_filter` once the
    /// camera is up.
    pub async fn start_camera(&self, constraints: Option<CameraConstraints>) -> Result<MediaStream, CaptureError> {
        let constraints = constraints.unwrap_or_else(|| self.config.camera.clone());
        self.filter.invalidate();
        let acquired = self.devices.start_camera(&constraints).await?;
        self.notify_source(SourceKind::Camera, true);
        Ok(acquired.stream)
    }

    /// Release the camera and cancel any filter built on it. Idempotent.
    pub fn stop_camera(&self) -> StopOutcome {
        self.filter.invalidate();
        let outcome = self.devices.stop(SourceKind::Camera);
        if outcome == StopOutcome::Released {
            self.notify_source(SourceKind::Camera, false);
        }
        outcome
    }

    /// Acquire a microphone (the saved selection when `device_id` is `None`)
    /// and attach the monitor path.
    pub async fn start_microphone(&self, device_id: Option<&str>) -> Result<MediaStream, CaptureError> {
        let (device_id, mic_volume) = {
            let prefs = self.preferences.lock();
            let id = device_id.map(str::to_string).unwrap_or_else(|| prefs.selected_microphone.clone());
            (id, prefs.mic_volume)
        };

        let acquired = self.devices.start_microphone(&device_id, &self.config.microphone).await?;

        {
            let mut monitor = self.monitor.lock();
            if !acquired.reused || monitor.is_none() {
                if let Some(old) = monitor.take() {
                    old.dispose();
                }
                match acquired.stream.live_audio() {
                    Some(track) => match AudioMonitor::new(track, self.config.gain.mic_monitor, mic_volume) {
                        Ok(created) => *monitor = Some(created),
                        Err(e) => log::warn!("Microphone monitor unavailable: {}", e),
                    },
                    None => log::warn!("Microphone stream for '{}' has no live audio track", device_id),
                }
            }
        }

        self.notify_source(SourceKind::Microphone, true);
        Ok(acquired.stream)
    }

    /// Turn the microphone off. While recording, the raw handle stays with
    /// the recording and is released once the recorder is idle.
    pub fn stop_microphone(&self) -> StopOutcome {
        if let Some(monitor) = self.monitor.lock().take() {
            monitor.dispose();
        }
        {
            let mut levels = self.levels.lock();
            levels.mic_level = 0.0;
            levels.peak_mic_level = 0.0;
        }

        let outcome = self.devices.stop(SourceKind::Microphone);
        if outcome != StopOutcome::AlreadyInactive {
            self.notify_source(SourceKind::Microphone, false);
        }
        outcome
    }

    /// Persist the selection; if the microphone is on, switch to it.
    ///
    /// While recording the switch fails with `DeviceBusy`, but the
    /// preference is still saved.
    pub async fn set_microphone_device(&self, device_id: &str) -> Result<(), CaptureError> {
        self.preferences.lock().selected_microphone = device_id.to_string();
        self.persist(SELECTED_MICROPHONE_KEY, device_id);

        let current = self.devices.microphone_device();
        if self.devices.is_active(SourceKind::Microphone) && current.as_deref() != Some(device_id) {
            self.start_microphone(Some(device_id)).await?;
        }
        Ok(())
    }

    pub fn list_audio_inputs(&self) -> Result<Vec<DeviceInfo>, CaptureError> {
        self.devices.audio_inputs()
    }

    /// Set the microphone volume (0–100) for both the monitor and the
    /// recording path and persist it.
    pub fn set_mic_volume(&self, percent: u8) {
        let percent = percent.min(100);
        self.preferences.lock().mic_volume = percent;
        if let Some(monitor) = self.monitor.lock().as_ref() {
            monitor.set_gain(percent);
        }
        if let Some(mixed) = self.mixed.lock().as_ref() {
            mixed.set_gain(SourceKind::Microphone, percent);
        }
        self.persist(MIC_VOLUME_KEY, &percent.to_string());
    }

    /// Set the screen-audio volume (0–100) of the recording path and persist it.
    pub fn set_screen_volume(&self, percent: u8) {
        let percent = percent.min(100);
        self.preferences.lock().screen_volume = percent;
        if let Some(mixed) = self.mixed.lock().as_ref() {
            mixed.set_gain(SourceKind::Screen, percent);
        }
        self.persist(SCREEN_VOLUME_KEY, &percent.to_string());
    }

    /// Select a filter mode and apply it to the current camera.
    ///
    /// Never fails: a gateway failure leaves the raw camera in use and is
    /// reported through `on_warning`.
    pub async fn set_filter_mode(&self, mode: FilterMode) -> FilterOutcome {
        let camera = self
            .devices
            .active(SourceKind::Camera)
            .map(|source| (source.stream, source.generation));
        let outcome = self
            .filter
            .apply(mode, camera, || self.devices.generation(SourceKind::Camera))
            .await;
        if let FilterOutcome::Fallback(warning) = &outcome {
            self.warn(warning);
        }
        outcome
    }

    /// Re-apply the current mode, e.g. after the camera was restarted.
    pub async fn refresh_filter(&self) -> FilterOutcome {
        self.set_filter_mode(self.filter.mode()).await
    }

    /// Filtered camera when a valid one exists, otherwise the raw camera.
    pub fn camera_preview(&self) -> Option<MediaStream> {
        let camera = self.devices.stream(SourceKind::Camera)?;
        let filtered = self.filter.valid_output(self.devices.generation(SourceKind::Camera));
        Some(filtered.unwrap_or(camera))
    }

    /// Mix the audio sources, compose the recording stream and start the
    /// encoder.
    pub fn start_recording(&self) -> Result<RecordingStarted, CaptureError> {
        let mut recorder = self.recorder.lock();
        if !recorder.state().is_idle() {
            return Err(CaptureError::AlreadyRecording);
        }

        let prefs = self.preferences.lock().clone();
        let gain = &self.config.gain;
        let screen = self.devices.stream(SourceKind::Screen);
        let camera = self.devices.stream(SourceKind::Camera);
        let microphone = self.devices.stream(SourceKind::Microphone);

        let mut inputs = Vec::new();
        if let Some(track) = screen.as_ref().and_then(|s| s.live_audio()) {
            inputs.push(MixInput {
                kind: SourceKind::Screen,
                track: Arc::clone(track),
                path: GainPath::ScreenAudio,
                curve: gain.screen_recording,
                percent: prefs.screen_volume,
            });
        }
        if let Some(track) = microphone.as_ref().and_then(|s| s.live_audio()) {
            inputs.push(MixInput {
                kind: SourceKind::Microphone,
                track: Arc::clone(track),
                path: GainPath::MicRecording,
                curve: gain.mic_recording,
                percent: prefs.mic_volume,
            });
        }
        let mixed = self.mixer.mix(inputs)?;

        let filtered = self.filter.valid_output(self.devices.generation(SourceKind::Camera));
        let composed = compose(
            screen.as_ref(),
            camera.as_ref(),
            filtered.as_ref(),
            mixed.as_ref().map(|m| m.track()),
        )?;
        let video_origin = composed.video_origin;
        let has_audio = composed.has_audio;

        let format = recorder.start(composed, self.config.timeslice)?;
        if microphone.is_some() {
            self.devices.retain_for_recording();
        }
        *self.mixed.lock() = mixed;
        drop(recorder);

        if !has_audio {
            log::warn!("Recording without audio");
            self.warn(&CaptureError::SourceInactive(SourceKind::Microphone));
        }
        Ok(RecordingStarted {
            format,
            video_origin,
            has_audio,
        })
    }

    /// Finalize the recording. `Ok(None)` when nothing was recording.
    ///
    /// Once the recorder is idle, the mix is torn down and a microphone
    /// stopped mid-recording is released.
    pub fn stop_recording(&self) -> Result<Option<RecordingArtifact>, CaptureError> {
        let outcome = self.recorder.lock().stop();
        if matches!(outcome, Ok(None)) {
            return Ok(None);
        }

        if let Some(mixed) = self.mixed.lock().take() {
            self.finished_mix_cycles.fetch_add(mixed.mix_cycles(), Ordering::Relaxed);
            mixed.dispose();
        }
        if self.devices.release_after_recording() {
            log::info!("Released microphone held by the recording");
        }

        match &outcome {
            Ok(Some(artifact)) => {
                if let Some(delegate) = &self.delegate {
                    delegate.on_recording_finished(artifact);
                }
            }
            Err(e) => {
                log::error!("Recording failed: {}", e);
                if let Some(delegate) = &self.delegate {
                    delegate.on_error(e);
                }
            }
            Ok(None) => {}
        }
        outcome
    }

    /// PNG of the latest screen frame.
    pub fn take_screenshot(&self) -> Result<Screenshot, CaptureError> {
        let screen = self
            .devices
            .stream(SourceKind::Screen)
            .ok_or(CaptureError::SourceInactive(SourceKind::Screen))?;
        let frame = screen
            .live_video()
            .and_then(|track| track.latest_frame())
            .ok_or(CaptureError::SourceInactive(SourceKind::Screen))?;

        let png = encode_png(&frame)?;
        log::info!("Screenshot captured ({}x{}, {} bytes)", frame.width, frame.height, png.len());
        Ok(Screenshot {
            file_name: screenshot_file_name(Utc::now()),
            width: frame.width,
            height: frame.height,
            png,
        })
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            screen_active: self.devices.is_active(SourceKind::Screen),
            camera_active: self.devices.is_active(SourceKind::Camera),
            microphone_active: self.devices.is_active(SourceKind::Microphone),
            microphone_device: self.devices.microphone_device(),
            recorder: self.recorder_probe.state(),
            filter: self.filter.status(),
        }
    }

    pub fn recorder_state(&self) -> RecorderState {
        self.recorder_probe.state()
    }

    /// Non-empty chunks buffered for the recording in progress.
    pub fn recorded_chunks(&self) -> usize {
        self.recorder_probe.chunk_count()
    }

    /// Sample the monitor and mixer meters.
    pub fn current_levels(&self) -> AudioLevels {
        let mic = self.monitor.lock().as_mut().map(|m| m.sample_levels());
        let screen = self.mixed.lock().as_ref().and_then(|m| m.levels(SourceKind::Screen));

        let mut levels = self.levels.lock();
        let (mic_level, mic_peak) = mic.unwrap_or((0.0, 0.0));
        let (screen_level, screen_peak) = screen.unwrap_or((0.0, 0.0));
        levels.mic_level = mic_level;
        levels.screen_level = screen_level;
        levels.peak_mic_level = levels.peak_mic_level.max(mic_peak);
        levels.peak_screen_level = levels.peak_screen_level.max(screen_peak);
        *levels
    }

    pub fn preferences(&self) -> Preferences {
        self.preferences.lock().clone()
    }

    /// Percent and multiplier of every live gain stage.
    pub fn gain_telemetry(&self) -> Vec<GainTelemetry> {
        let mut telemetry = Vec::new();
        if let Some(monitor) = self.monitor.lock().as_ref() {
            telemetry.push(monitor.telemetry());
        }
        if let Some(mixed) = self.mixed.lock().as_ref() {
            telemetry.extend(mixed.telemetry());
        }
        telemetry
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        let stats = self.recorder_probe.stats();
        let live_cycles = self.mixed.lock().as_ref().map_or(0, |m| m.mix_cycles());
        SessionDiagnostics {
            chunks_received: stats.chunks_received,
            empty_chunks_dropped: stats.empty_chunks_dropped,
            bytes_buffered: stats.bytes_buffered,
            mix_cycles: self.finished_mix_cycles.load(Ordering::Relaxed) + live_cycles,
            encoder_faults: stats.encoder_faults,
            stale_acquisitions_released: self.devices.stale_released(),
            stale_filters_discarded: self.filter.discarded(),
        }
    }

    /// Stop any recording and release every source. Idempotent.
    pub fn shutdown(&self) {
        if let Err(e) = self.stop_recording() {
            log::warn!("Recording discarded during shutdown: {}", e);
        }
        self.filter.invalidate();
        if let Some(monitor) = self.monitor.lock().take() {
            monitor.dispose();
        }
        self.devices.release_all();
        log::info!("Media session shut down");
    }

    fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            log::warn!("Failed to persist preference {}: {}", key, e);
            self.warn(&e);
        }
    }

    fn warn(&self, warning: &CaptureError) {
        if let Some(delegate) = &self.delegate {
            delegate.on_warning(warning);
        }
    }

    fn notify_source(&self, kind: SourceKind, active: bool) {
        log::info!("{} source {}", kind, if active { "on" } else { "off" });
        if let Some(delegate) = &self.delegate {
            delegate.on_source_changed(kind, active);
        }
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
