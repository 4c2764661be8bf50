use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::DeviceInfo;
use crate::models::config::{AudioConstraints, CameraConstraints, ScreenConstraints};
use crate::models::error::CaptureError;
use crate::models::media::{MediaStream, SourceKind};
use crate::traits::capture_provider::CaptureProvider;

/// A raw source held by the manager.
#[derive(Debug, Clone)]
pub struct ActiveSource {
    pub stream: MediaStream,
    /// Increases on every acquisition of this kind.
    pub generation: u64,
    /// Microphone device the handle was opened for.
    pub device_id: Option<String>,
}

/// Result of a successful `start_*` call.
#[derive(Debug, Clone)]
pub struct AcquiredSource {
    pub stream: MediaStream,
    pub generation: u64,
    /// The existing handle was kept instead of acquiring a new one.
    pub reused: bool,
}

/// What a `stop_*` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Released,
    /// The recording still needs the handle; it is released once the
    /// recorder is idle again.
    Deferred,
    AlreadyInactive,
}

#[derive(Debug)]
struct SourceSlot {
    kind: SourceKind,
    active: Option<ActiveSource>,
    generation: u64,
    /// Ticket of the acquisition currently awaiting the provider.
    pending: Option<u64>,
    deferred_release: bool,
}

impl SourceSlot {
    fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            active: None,
            generation: 0,
            pending: None,
            deferred_release: false,
        }
    }

    /// Stop every track of the held handle and forget it.
    fn release(&mut self) -> bool {
        self.deferred_release = false;
        match self.active.take() {
            Some(source) => {
                source.stream.stop_all();
                log::info!("Released {} source (generation {})", self.kind, source.generation);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug)]
struct DeviceState {
    screen: SourceSlot,
    camera: SourceSlot,
    microphone: SourceSlot,
    held_by_recording: bool,
    stale_released: u64,
}

impl DeviceState {
    fn slot(&self, kind: SourceKind) -> &SourceSlot {
        match kind {
            SourceKind::Screen => &self.screen,
            SourceKind::Camera => &self.camera,
            SourceKind::Microphone => &self.microphone,
        }
    }

    fn slot_mut(&mut self, kind: SourceKind) -> &mut SourceSlot {
        match kind {
            SourceKind::Screen => &mut self.screen,
            SourceKind::Camera => &mut self.camera,
            SourceKind::Microphone => &mut self.microphone,
        }
    }
}

/// Sole owner of the raw screen, camera and microphone handles.
///
/// At most one handle per kind is held. Every acquisition first releases the
/// previous handle, then takes a ticket; a result whose ticket is no longer
/// current (because a later start or a stop came in while the provider was
/// suspended) is released on arrival instead of being installed.
pub struct DeviceSourceManager {
    provider: Arc<dyn CaptureProvider>,
    state: Mutex<DeviceState>,
}

impl DeviceSourceManager {
    pub fn new(provider: Arc<dyn CaptureProvider>) -> Self {
        Self {
            provider,
            state: Mutex::new(DeviceState {
                screen: SourceSlot::new(SourceKind::Screen),
                camera: SourceSlot::new(SourceKind::Camera),
                microphone: SourceSlot::new(SourceKind::Microphone),
                held_by_recording: false,
                stale_released: 0,
            }),
        }
    }

    pub async fn start_screen(&self, constraints: &ScreenConstraints) -> Result<AcquiredSource, CaptureError> {
        let ticket = self.begin_acquisition(SourceKind::Screen);
        let result = self.provider.acquire_screen(constraints).await;
        self.finish_acquisition(SourceKind::Screen, ticket, None, result)
    }

    pub async fn start_camera(&self, constraints: &CameraConstraints) -> Result<AcquiredSource, CaptureError> {
        let ticket = self.begin_acquisition(SourceKind::Camera);
        let result = self.provider.acquire_camera(constraints).await;
        self.finish_acquisition(SourceKind::Camera, ticket, None, result)
    }

    /// Acquire `device_id`, or keep the current handle if it is the same
    /// device and still live.
    ///
    /// Switching to another device while a recording holds the microphone is
    /// rejected with `DeviceBusy`.
    pub async fn start_microphone(
        &self,
        device_id: &str,
        constraints: &AudioConstraints,
    ) -> Result<AcquiredSource, CaptureError> {
        {
            let mut state = self.state.lock();
            let held_by_recording = state.held_by_recording;
            let slot = state.slot_mut(SourceKind::Microphone);

            if let Some(active) = slot.active.as_ref() {
                let same_device = active.device_id.as_deref() == Some(device_id);
                if same_device && active.stream.is_live() {
                    let reused = AcquiredSource {
                        stream: active.stream.clone(),
                        generation: active.generation,
                        reused: true,
                    };
                    slot.pending = None;
                    slot.deferred_release = false;
                    log::info!("Reusing microphone handle for device '{}'", device_id);
                    return Ok(reused);
                }
                if held_by_recording {
                    return Err(CaptureError::DeviceBusy(format!(
                        "microphone '{}' is held by the active recording",
                        active.device_id.as_deref().unwrap_or("unknown")
                    )));
                }
            }
        }

        let ticket = self.begin_acquisition(SourceKind::Microphone);
        let result = self.provider.acquire_microphone(device_id, constraints).await;
        self.finish_acquisition(SourceKind::Microphone, ticket, Some(device_id.to_string()), result)
    }

    /// Release the handle of `kind`. Idempotent.
    ///
    /// Also cancels an in-flight acquisition of that kind. The microphone
    /// handle is kept (and marked for deferred release) while a recording
    /// holds it.
    pub fn stop(&self, kind: SourceKind) -> StopOutcome {
        let mut state = self.state.lock();
        let held_by_recording = state.held_by_recording;
        let slot = state.slot_mut(kind);

        if slot.pending.take().is_some() {
            log::info!("Cancelled in-flight {} acquisition", kind);
        }

        if slot.active.is_none() {
            return StopOutcome::AlreadyInactive;
        }
        if kind == SourceKind::Microphone && held_by_recording {
            if slot.deferred_release {
                return StopOutcome::AlreadyInactive;
            }
            slot.deferred_release = true;
            log::info!("Microphone release deferred until the recording ends");
            return StopOutcome::Deferred;
        }

        slot.release();
        StopOutcome::Released
    }

    /// Mark the microphone as needed by a recording.
    pub fn retain_for_recording(&self) {
        self.state.lock().held_by_recording = true;
    }

    /// Drop the recording's claim and release a deferred microphone handle.
    /// Returns true if a handle was released.
    pub fn release_after_recording(&self) -> bool {
        let mut state = self.state.lock();
        state.held_by_recording = false;
        if state.microphone.deferred_release {
            return state.microphone.release();
        }
        false
    }

    /// Release everything, ignoring the recording's claim. Used on teardown.
    pub fn release_all(&self) {
        let mut state = self.state.lock();
        state.held_by_recording = false;
        for kind in SourceKind::ALL {
            let slot = state.slot_mut(kind);
            slot.pending = None;
            slot.release();
        }
    }

    /// Whether `kind` is on from the user's point of view. A microphone
    /// awaiting deferred release counts as off.
    pub fn is_active(&self, kind: SourceKind) -> bool {
        let state = self.state.lock();
        let slot = state.slot(kind);
        slot.active.is_some() && !slot.deferred_release
    }

    /// Whether a raw handle of `kind` is held, including a deferred one.
    pub fn holds_handle(&self, kind: SourceKind) -> bool {
        self.state.lock().slot(kind).active.is_some()
    }

    pub fn is_pending(&self, kind: SourceKind) -> bool {
        self.state.lock().slot(kind).pending.is_some()
    }

    /// The active source of `kind`, if it is on.
    pub fn active(&self, kind: SourceKind) -> Option<ActiveSource> {
        let state = self.state.lock();
        let slot = state.slot(kind);
        if slot.deferred_release {
            return None;
        }
        slot.active.clone()
    }

    pub fn stream(&self, kind: SourceKind) -> Option<MediaStream> {
        self.active(kind).map(|source| source.stream)
    }

    /// Generation of the active source of `kind`.
    pub fn generation(&self, kind: SourceKind) -> Option<u64> {
        self.active(kind).map(|source| source.generation)
    }

    pub fn microphone_device(&self) -> Option<String> {
        self.active(SourceKind::Microphone).and_then(|source| source.device_id)
    }

    pub fn is_held_by_recording(&self) -> bool {
        self.state.lock().held_by_recording
    }

    /// Late acquisitions released because a later command superseded them.
    pub fn stale_released(&self) -> u64 {
        self.state.lock().stale_released
    }

    pub fn audio_inputs(&self) -> Result<Vec<DeviceInfo>, CaptureError> {
        self.provider.audio_inputs()
    }

    fn begin_acquisition(&self, kind: SourceKind) -> u64 {
        let mut state = self.state.lock();
        let slot = state.slot_mut(kind);
        slot.release();
        slot.generation += 1;
        slot.pending = Some(slot.generation);
        log::info!("Acquiring {} (generation {})", kind, slot.generation);
        slot.generation
    }

    fn finish_acquisition(
        &self,
        kind: SourceKind,
        ticket: u64,
        device_id: Option<String>,
        result: Result<MediaStream, CaptureError>,
    ) -> Result<AcquiredSource, CaptureError> {
        let mut state = self.state.lock();

        if state.slot(kind).pending != Some(ticket) {
            if let Ok(stream) = result {
                stream.stop_all();
                state.stale_released += 1;
                log::warn!("Released late {} acquisition (generation {})", kind, ticket);
            }
            return Err(CaptureError::AcquisitionSuperseded(kind));
        }

        let slot = state.slot_mut(kind);
        slot.pending = None;
        match result {
            Ok(stream) => {
                slot.active = Some(ActiveSource {
                    stream: stream.clone(),
                    generation: ticket,
                    device_id,
                });
                log::info!(
                    "Acquired {} (generation {}, {} track(s))",
                    kind,
                    ticket,
                    stream.tracks().len()
                );
                Ok(AcquiredSource {
                    stream,
                    generation: ticket,
                    reused: false,
                })
            }
            Err(e) => {
                log::warn!("Failed to acquire {}: {}", kind, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::models::media::MediaTrack;

    /// Provider that hands out fresh tracks after an optional delay and
    /// remembers every stream it created.
    #[derive(Default)]
    struct FakeProvider {
        delays: Mutex<VecDeque<Duration>>,
        failures: Mutex<VecDeque<CaptureError>>,
        created: Mutex<Vec<(SourceKind, MediaStream)>>,
    }

    impl FakeProvider {
        fn live_handles(&self, kind: SourceKind) -> usize {
            self.created
                .lock()
                .iter()
                .filter(|(k, s)| *k == kind && s.is_live())
                .count()
        }

        fn created(&self, kind: SourceKind) -> Vec<MediaStream> {
            self.created
                .lock()
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, s)| s.clone())
                .collect()
        }

        async fn make(&self, kind: SourceKind) -> Result<MediaStream, CaptureError> {
            let delay = self.delays.lock().pop_front();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(err) = self.failures.lock().pop_front() {
                return Err(err);
            }
            let track = match kind {
                SourceKind::Microphone => MediaTrack::audio("mic", 48000.0),
                _ => MediaTrack::video(kind.to_string()),
            };
            let stream = MediaStream::with_tracks([track])?;
            self.created.lock().push((kind, stream.clone()));
            Ok(stream)
        }
    }

    #[async_trait]
    impl CaptureProvider for FakeProvider {
        async fn acquire_screen(&self, _: &ScreenConstraints) -> Result<MediaStream, CaptureError> {
            self.make(SourceKind::Screen).await
        }

        async fn acquire_camera(&self, _: &CameraConstraints) -> Result<MediaStream, CaptureError> {
            self.make(SourceKind::Camera).await
        }

        async fn acquire_microphone(&self, _: &str, _: &AudioConstraints) -> Result<MediaStream, CaptureError> {
            self.make(SourceKind::Microphone).await
        }

        fn audio_inputs(&self) -> Result<Vec<DeviceInfo>, CaptureError> {
            Ok(Vec::new())
        }
    }

    fn manager() -> (Arc<FakeProvider>, DeviceSourceManager) {
        let provider = Arc::new(FakeProvider::default());
        let manager = DeviceSourceManager::new(provider.clone());
        (provider, manager)
    }

    #[tokio::test]
    async fn camera_start_stop_sequences_hold_at_most_one_handle() {
        let (provider, manager) = manager();
        let camera = CameraConstraints::default();

        for step in 0..6 {
            if step % 3 == 2 {
                manager.stop(SourceKind::Camera);
            } else {
                manager.start_camera(&camera).await.unwrap();
            }
            assert!(provider.live_handles(SourceKind::Camera) <= 1);
        }
    }

    #[tokio::test]
    async fn restart_stops_previous_tracks() {
        let (provider, manager) = manager();
        let screen = ScreenConstraints::default();

        let first = manager.start_screen(&screen).await.unwrap();
        let second = manager.start_screen(&screen).await.unwrap();

        assert!(!first.stream.is_live());
        assert!(second.stream.is_live());
        assert_eq!(provider.live_handles(SourceKind::Screen), 1);
        assert!(second.generation > first.generation);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (_, manager) = manager();
        manager.start_screen(&ScreenConstraints::default()).await.unwrap();

        assert_eq!(manager.stop(SourceKind::Screen), StopOutcome::Released);
        assert_eq!(manager.stop(SourceKind::Screen), StopOutcome::AlreadyInactive);
        assert!(!manager.is_active(SourceKind::Screen));
    }

    #[tokio::test(start_paused = true)]
    async fn late_success_after_stop_is_released() {
        let (provider, manager) = manager();
        let camera = CameraConstraints::default();
        provider.delays.lock().push_back(Duration::from_millis(100));

        let (result, ()) = tokio::join!(manager.start_camera(&camera), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(manager.is_pending(SourceKind::Camera));
            manager.stop(SourceKind::Camera);
        });

        assert_eq!(result.unwrap_err(), CaptureError::AcquisitionSuperseded(SourceKind::Camera));
        assert!(!manager.is_active(SourceKind::Camera));
        assert_eq!(provider.live_handles(SourceKind::Camera), 0);
        assert_eq!(manager.stale_released(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_start_stop_start_leaves_one_fresh_source() {
        let (provider, manager) = manager();
        let screen = ScreenConstraints::default();
        // First request resolves after the second one.
        provider.delays.lock().extend([Duration::from_millis(200), Duration::from_millis(50)]);

        let (first, second) = tokio::join!(manager.start_screen(&screen), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            manager.stop(SourceKind::Screen);
            manager.start_screen(&screen).await
        });

        assert!(first.is_err());
        let second = second.unwrap();
        assert!(second.stream.is_live());
        assert_eq!(provider.live_handles(SourceKind::Screen), 1);
        assert_eq!(manager.stream(SourceKind::Screen).unwrap().id(), second.stream.id());
        assert_eq!(provider.created(SourceKind::Screen).len(), 2);
    }

    #[tokio::test]
    async fn failures_propagate_without_retry() {
        let (provider, manager) = manager();
        provider
            .failures
            .lock()
            .push_back(CaptureError::PermissionDenied(SourceKind::Camera));

        let err = manager.start_camera(&CameraConstraints::default()).await.unwrap_err();

        assert_eq!(err, CaptureError::PermissionDenied(SourceKind::Camera));
        assert!(!manager.is_active(SourceKind::Camera));
        assert!(!manager.is_pending(SourceKind::Camera));
        assert!(provider.created(SourceKind::Camera).is_empty());
    }

    #[tokio::test]
    async fn same_microphone_device_is_reused() {
        let (provider, manager) = manager();
        let audio = AudioConstraints::default();

        let first = manager.start_microphone("default", &audio).await.unwrap();
        let again = manager.start_microphone("default", &audio).await.unwrap();

        assert!(again.reused);
        assert_eq!(first.stream.id(), again.stream.id());
        assert_eq!(provider.created(SourceKind::Microphone).len(), 1);
    }

    #[tokio::test]
    async fn different_microphone_device_reacquires_when_idle() {
        let (provider, manager) = manager();
        let audio = AudioConstraints::default();

        let first = manager.start_microphone("default", &audio).await.unwrap();
        let second = manager.start_microphone("usb", &audio).await.unwrap();

        assert!(!second.reused);
        assert!(!first.stream.is_live());
        assert_eq!(manager.microphone_device().as_deref(), Some("usb"));
        assert_eq!(provider.live_handles(SourceKind::Microphone), 1);
    }

    #[tokio::test]
    async fn microphone_switch_rejected_while_recording() {
        let (_, manager) = manager();
        let audio = AudioConstraints::default();
        let held = manager.start_microphone("default", &audio).await.unwrap();
        manager.retain_for_recording();

        let err = manager.start_microphone("usb", &audio).await.unwrap_err();

        assert!(matches!(err, CaptureError::DeviceBusy(_)));
        assert!(held.stream.is_live());
    }

    #[tokio::test]
    async fn microphone_release_is_deferred_while_recording() {
        let (_, manager) = manager();
        let mic = manager
            .start_microphone("default", &AudioConstraints::default())
            .await
            .unwrap();
        manager.retain_for_recording();

        assert_eq!(manager.stop(SourceKind::Microphone), StopOutcome::Deferred);
        assert!(mic.stream.is_live());
        assert!(!manager.is_active(SourceKind::Microphone));
        assert!(manager.holds_handle(SourceKind::Microphone));

        assert!(manager.release_after_recording());
        assert!(!mic.stream.is_live());
        assert!(!manager.holds_handle(SourceKind::Microphone));
    }

    #[tokio::test]
    async fn restarting_same_microphone_cancels_deferred_release() {
        let (_, manager) = manager();
        let audio = AudioConstraints::default();
        let mic = manager.start_microphone("default", &audio).await.unwrap();
        manager.retain_for_recording();
        manager.stop(SourceKind::Microphone);

        let again = manager.start_microphone("default", &audio).await.unwrap();
        assert!(again.reused);

        assert!(!manager.release_after_recording());
        assert!(mic.stream.is_live());
        assert!(manager.is_active(SourceKind::Microphone));
    }

    #[tokio::test]
    async fn release_all_ignores_recording_claim() {
        let (provider, manager) = manager();
        manager.start_camera(&CameraConstraints::default()).await.unwrap();
        manager
            .start_microphone("default", &AudioConstraints::default())
            .await
            .unwrap();
        manager.retain_for_recording();

        manager.release_all();

        assert_eq!(provider.live_handles(SourceKind::Camera), 0);
        assert_eq!(provider.live_handles(SourceKind::Microphone), 0);
        assert!(!manager.is_held_by_recording());
    }
}
