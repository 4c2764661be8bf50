use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::media::MediaStream;
use crate::models::state::{FilterMode, FilterStatus};
use crate::traits::filter_gateway::FilterGateway;

/// What a filter request ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    /// A filtered stream for the given camera generation is installed.
    Applied { generation: u64 },
    /// Mode is `None`; the raw camera is used.
    Disabled,
    /// The camera is off; the mode is remembered for the next refresh.
    Deferred,
    /// The gateway failed and the raw camera stays in use.
    Fallback(CaptureError),
    /// A later request or a camera change made this result obsolete.
    Superseded,
}

#[derive(Debug, Clone)]
struct FilteredOutput {
    stream: MediaStream,
    generation: u64,
}

#[derive(Debug, Default)]
struct FilterInner {
    mode: FilterMode,
    processing: bool,
    last_error: Option<String>,
    output: Option<FilteredOutput>,
    request: u64,
    discarded: u64,
}

/// Tracks the filter mode and the filtered camera output.
///
/// A filtered stream is only ever handed out for the camera generation it
/// was produced from.
pub struct FilterController {
    gateway: Option<Arc<dyn FilterGateway>>,
    inner: Mutex<FilterInner>,
}

impl FilterController {
    pub fn new(gateway: Option<Arc<dyn FilterGateway>>) -> Self {
        Self {
            gateway,
            inner: Mutex::new(FilterInner::default()),
        }
    }

    pub fn mode(&self) -> FilterMode {
        self.inner.lock().mode
    }

    /// Set `mode` and, if the camera is on, run it through the gateway.
    ///
    /// `camera` is the active camera stream and its generation.
    /// `current_generation` is consulted once the gateway resolves, so a
    /// camera replaced in the meantime invalidates the result.
    pub async fn apply(
        &self,
        mode: FilterMode,
        camera: Option<(MediaStream, u64)>,
        current_generation: impl Fn() -> Option<u64>,
    ) -> FilterOutcome {
        let (request, had_output) = {
            let mut inner = self.inner.lock();
            inner.mode = mode;
            inner.request += 1;
            inner.last_error = None;
            inner.processing = mode.is_active() && camera.is_some();
            let had_output = inner.output.take().is_some();
            if had_output {
                inner.discarded += 1;
            }
            (inner.request, had_output)
        };
        if had_output {
            self.cancel_gateway();
        }

        if !mode.is_active() || camera.is_none() {
            log::info!("Filter mode set to {:?} (camera active: {})", mode, camera.is_some());
            return if mode.is_active() {
                FilterOutcome::Deferred
            } else {
                FilterOutcome::Disabled
            };
        }
        let Some((stream, generation)) = camera else {
            return FilterOutcome::Deferred;
        };

        let Some(gateway) = self.gateway.clone() else {
            return self.fail(request, CaptureError::FilterUnavailable("no filter gateway configured".into()));
        };

        let result = gateway.apply(&stream, mode).await;

        let mut inner = self.inner.lock();
        let current = inner.request == request && current_generation() == Some(generation);
        match result {
            Ok(output) if current => {
                inner.processing = false;
                inner.output = Some(FilteredOutput {
                    stream: output,
                    generation,
                });
                log::info!("Filter {:?} applied to camera generation {}", mode, generation);
                FilterOutcome::Applied { generation }
            }
            Ok(output) => {
                inner.discarded += 1;
                let nothing_newer = inner.request == request || (!inner.processing && inner.output.is_none());
                if inner.request == request {
                    inner.processing = false;
                }
                drop(inner);
                log::warn!("Discarding filter output for stale camera generation {}", generation);
                if nothing_newer && output.is_live() {
                    gateway.cancel();
                }
                FilterOutcome::Superseded
            }
            Err(_) if !current => {
                if inner.request == request {
                    inner.processing = false;
                }
                FilterOutcome::Superseded
            }
            Err(e) => {
                drop(inner);
                self.fail(request, e)
            }
        }
    }

    /// Forget the filtered output and cancel the gateway. Used whenever the
    /// camera stops or is replaced. The mode is kept.
    pub fn invalidate(&self) {
        let (had_output, was_processing) = {
            let mut inner = self.inner.lock();
            inner.request += 1;
            let was_processing = std::mem::take(&mut inner.processing);
            let had_output = inner.output.take().is_some();
            if had_output {
                inner.discarded += 1;
            }
            (had_output, was_processing)
        };
        if had_output || was_processing {
            log::info!("Filter output invalidated");
            self.cancel_gateway();
        }
    }

    /// The filtered stream, if it belongs to `camera_generation` and is live.
    /// An output for any other generation is discarded.
    pub fn valid_output(&self, camera_generation: Option<u64>) -> Option<MediaStream> {
        let mut inner = self.inner.lock();
        let output = inner.output.as_ref()?;
        if Some(output.generation) == camera_generation && output.stream.live_video().is_some() {
            return Some(output.stream.clone());
        }

        inner.output = None;
        inner.discarded += 1;
        drop(inner);
        log::warn!("Dropping filter output that no longer matches the camera");
        self.cancel_gateway();
        None
    }

    pub fn status(&self) -> FilterStatus {
        let inner = self.inner.lock();
        FilterStatus {
            mode: inner.mode,
            processing: inner.processing,
            last_error: inner.last_error.clone(),
            output_generation: inner.output.as_ref().map(|o| o.generation),
        }
    }

    /// Filter outputs thrown away because they were stale.
    pub fn discarded(&self) -> u64 {
        self.inner.lock().discarded
    }

    fn fail(&self, request: u64, error: CaptureError) -> FilterOutcome {
        let error = match error {
            CaptureError::FilterUnavailable(_) => error,
            other => CaptureError::FilterUnavailable(other.to_string()),
        };
        let mut inner = self.inner.lock();
        if inner.request != request {
            return FilterOutcome::Superseded;
        }
        inner.processing = false;
        inner.last_error = Some(error.to_string());
        log::warn!("Filter unavailable, using raw camera: {}", error);
        FilterOutcome::Fallback(error)
    }

    fn cancel_gateway(&self) {
        if let Some(gateway) = &self.gateway {
            gateway.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::models::media::MediaTrack;

    #[derive(Default)]
    struct FakeGateway {
        delays: Mutex<VecDeque<Duration>>,
        fail: Mutex<bool>,
        outputs: Mutex<Vec<MediaStream>>,
        cancels: AtomicUsize,
    }

    #[async_trait]
    impl FilterGateway for FakeGateway {
        async fn apply(&self, _camera: &MediaStream, _mode: FilterMode) -> Result<MediaStream, CaptureError> {
            let delay = self.delays.lock().pop_front();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if *self.fail.lock() {
                return Err(CaptureError::FilterUnavailable("model failed to load".into()));
            }
            let stream = MediaStream::with_tracks([MediaTrack::video("filtered")])?;
            self.outputs.lock().push(stream.clone());
            Ok(stream)
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            for output in self.outputs.lock().iter() {
                output.stop_all();
            }
        }
    }

    fn camera() -> MediaStream {
        MediaStream::with_tracks([MediaTrack::video("camera")]).unwrap()
    }

    #[tokio::test]
    async fn applies_for_current_generation() {
        let gateway = Arc::new(FakeGateway::default());
        let filter = FilterController::new(Some(gateway.clone()));

        let outcome = filter.apply(FilterMode::A, Some((camera(), 3)), || Some(3)).await;

        assert_eq!(outcome, FilterOutcome::Applied { generation: 3 });
        assert!(filter.valid_output(Some(3)).is_some());
        assert_eq!(filter.status().output_generation, Some(3));
        assert!(!filter.status().processing);
    }

    #[tokio::test]
    async fn output_for_other_generation_is_never_returned() {
        let gateway = Arc::new(FakeGateway::default());
        let filter = FilterController::new(Some(gateway.clone()));
        filter.apply(FilterMode::B, Some((camera(), 1)), || Some(1)).await;

        assert!(filter.valid_output(Some(2)).is_none());
        assert!(filter.valid_output(Some(1)).is_none());
        assert_eq!(filter.discarded(), 1);
        assert_eq!(gateway.cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gateway_failure_falls_back_with_warning() {
        let gateway = Arc::new(FakeGateway::default());
        *gateway.fail.lock() = true;
        let filter = FilterController::new(Some(gateway));

        let outcome = filter.apply(FilterMode::A, Some((camera(), 1)), || Some(1)).await;

        assert!(matches!(outcome, FilterOutcome::Fallback(CaptureError::FilterUnavailable(_))));
        assert!(filter.valid_output(Some(1)).is_none());
        let status = filter.status();
        assert_eq!(status.mode, FilterMode::A);
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn missing_gateway_is_a_fallback() {
        let filter = FilterController::new(None);
        let outcome = filter.apply(FilterMode::A, Some((camera(), 1)), || Some(1)).await;
        assert!(matches!(outcome, FilterOutcome::Fallback(_)));
    }

    #[tokio::test]
    async fn camera_off_defers_and_none_disables() {
        let gateway = Arc::new(FakeGateway::default());
        let filter = FilterController::new(Some(gateway.clone()));

        assert_eq!(filter.apply(FilterMode::A, None, || None).await, FilterOutcome::Deferred);
        assert_eq!(filter.mode(), FilterMode::A);

        filter.apply(FilterMode::A, Some((camera(), 1)), || Some(1)).await;
        assert_eq!(
            filter.apply(FilterMode::None, Some((camera(), 1)), || Some(1)).await,
            FilterOutcome::Disabled
        );
        assert!(filter.valid_output(Some(1)).is_none());
        assert!(gateway.outputs.lock().iter().all(|s| !s.is_live()));
    }

    #[tokio::test(start_paused = true)]
    async fn camera_replaced_mid_apply_discards_result() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.delays.lock().push_back(Duration::from_millis(50));
        let filter = FilterController::new(Some(gateway.clone()));

        let (outcome, ()) = tokio::join!(filter.apply(FilterMode::A, Some((camera(), 1)), || Some(1)), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            filter.invalidate();
        });

        assert_eq!(outcome, FilterOutcome::Superseded);
        assert!(filter.valid_output(Some(1)).is_none());
        assert_eq!(filter.discarded(), 1);
        assert!(gateway.outputs.lock().iter().all(|s| !s.is_live()));
    }

    #[tokio::test]
    async fn switching_modes_ends_previous_output() {
        let gateway = Arc::new(FakeGateway::default());
        let filter = FilterController::new(Some(gateway.clone()));
        filter.apply(FilterMode::A, Some((camera(), 1)), || Some(1)).await;
        let first = filter.valid_output(Some(1)).unwrap();

        let outcome = filter.apply(FilterMode::B, Some((camera(), 1)), || Some(1)).await;

        assert_eq!(outcome, FilterOutcome::Applied { generation: 1 });
        assert!(!first.is_live());
        assert!(filter.valid_output(Some(1)).unwrap().is_live());
        assert_eq!(filter.discarded(), 1);
        assert_eq!(gateway.cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_keeps_mode() {
        let gateway = Arc::new(FakeGateway::default());
        let filter = FilterController::new(Some(gateway.clone()));
        filter.apply(FilterMode::B, Some((camera(), 1)), || Some(1)).await;

        filter.invalidate();

        assert_eq!(filter.mode(), FilterMode::B);
        assert_eq!(filter.status().output_generation, None);
        assert_eq!(gateway.cancels.load(Ordering::SeqCst), 1);
    }
}
