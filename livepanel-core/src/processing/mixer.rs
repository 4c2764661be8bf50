use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::media::{MediaTrack, SourceKind};
use crate::processing::gain::{GainControl, GainCurve, GainPath, GainStage, GainTelemetry};

/// How far one live source may run ahead of another before the lagging one
/// is treated as an underrun and padded with silence.
const MAX_SKEW_SECS: f64 = 0.25;

/// One audio source offered to the mixer.
pub struct MixInput {
    pub kind: SourceKind,
    pub track: Arc<MediaTrack>,
    pub path: GainPath,
    pub curve: GainCurve,
    pub percent: u8,
}

/// Builds mixed outputs at a fixed sample rate and processing tick.
#[derive(Debug, Clone)]
pub struct AudioMixer {
    pub target_sample_rate: f64,
    pub tick: Duration,
}

impl AudioMixer {
    pub fn new(target_sample_rate: f64, tick: Duration) -> Self {
        Self {
            target_sample_rate,
            tick,
        }
    }

    /// Combine the live inputs into one output track.
    ///
    /// Returns `Ok(None)` when no input is live, so callers can tell "nothing
    /// to mix" apart from a mix that happens to be silent. Each input keeps
    /// its own gain stage; see `MixedAudioOutput::set_gain`.
    pub fn mix(&self, inputs: Vec<MixInput>) -> Result<Option<MixedAudioOutput>, CaptureError> {
        let mut channels: Vec<MixChannel> = Vec::new();
        for input in inputs {
            if !input.track.is_live() {
                log::debug!("Skipping ended {} track '{}'", input.kind, input.track.label());
                continue;
            }
            if channels.iter().any(|c| c.track.id() == input.track.id()) {
                log::warn!("Track '{}' offered twice to the mixer; ignoring duplicate", input.track.label());
                continue;
            }
            let stage = GainStage::create(&input.track, input.path, input.curve, input.percent)?;
            channels.push(MixChannel {
                kind: input.kind,
                track: Arc::clone(&input.track),
                stage,
            });
        }

        if channels.is_empty() {
            log::info!("No live audio sources to mix");
            return Ok(None);
        }

        let kinds: Vec<SourceKind> = channels.iter().map(|c| c.kind).collect();
        log::info!("Mixing {} audio source(s): {:?}", channels.len(), kinds);

        let output = MediaTrack::audio("mixed-audio", self.target_sample_rate);
        let controls = channels.iter().map(|c| (c.kind, c.stage.control())).collect();
        let shared = Arc::new(MixerShared {
            channels: Mutex::new(channels),
            output: Arc::clone(&output),
            target_sample_rate: self.target_sample_rate,
            max_skew_frames: (self.target_sample_rate * MAX_SKEW_SECS) as usize,
            levels: Mutex::new(HashMap::new()),
            cycles: AtomicU64::new(0),
        });

        let mut mixed = MixedAudioOutput {
            track: output,
            controls,
            shared,
            stop_tx: None,
            handle: None,
        };
        mixed.start_processing_loop(self.tick)?;
        Ok(Some(mixed))
    }
}

struct MixChannel {
    kind: SourceKind,
    track: Arc<MediaTrack>,
    stage: GainStage,
}

impl MixChannel {
    /// Pending samples expressed at the mixer's output rate.
    fn ready_frames(&self, target_sample_rate: f64) -> usize {
        let source_rate = self.stage.sample_rate();
        let available = self.stage.available();
        if same_rate(source_rate, target_sample_rate) {
            available
        } else {
            (available as f64 * target_sample_rate / source_rate) as usize
        }
    }

    /// Read enough source samples for `frames` output frames, gain-stage and
    /// resample them, and zero-pad whatever the source could not supply.
    fn take_frames(&self, frames: usize, target_sample_rate: f64) -> Vec<f32> {
        let source_rate = self.stage.sample_rate();
        let source_frames = if same_rate(source_rate, target_sample_rate) {
            frames
        } else {
            (frames as f64 * source_rate / target_sample_rate).ceil() as usize
        };
        let scaled = self.stage.process_frames(source_frames);
        let mut resampled = resample(&scaled, source_rate, target_sample_rate);
        resampled.resize(frames, 0.0);
        resampled
    }
}

struct MixerShared {
    channels: Mutex<Vec<MixChannel>>,
    output: Arc<MediaTrack>,
    target_sample_rate: f64,
    /// Output frames a live source may fall behind before it is padded.
    max_skew_frames: usize,
    levels: Mutex<HashMap<SourceKind, (f32, f32)>>,
    cycles: AtomicU64,
}

impl MixerShared {
    /// Read every channel → gain → resample → sum → push to output.
    ///
    /// Each pass mixes only as many frames as every live source has ready;
    /// the rest stays buffered for the next pass. Ended sources are padded
    /// with silence, as is a live source lagging more than `max_skew_frames`.
    fn mix_once(&self) -> usize {
        let channels = self.channels.lock();
        let frames = frames_to_mix(
            channels
                .iter()
                .map(|c| (c.track.is_live(), c.ready_frames(self.target_sample_rate))),
            self.max_skew_frames,
        );
        if frames == 0 {
            return 0;
        }

        let mut buffers = Vec::with_capacity(channels.len());
        {
            let mut levels = self.levels.lock();
            for channel in channels.iter() {
                let samples = channel.take_frames(frames, self.target_sample_rate);
                levels.insert(channel.kind, (rms_level(&samples), peak_level(&samples)));
                buffers.push(samples);
            }
        }
        drop(channels);

        let mixed = sum_sources(&buffers);
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.output.push_samples(&mixed);
        mixed.len()
    }
}

/// Frames to mix given `(live, ready)` per channel.
///
/// Live channels bound the pass to the slowest of them, unless one lags the
/// fastest by more than `max_skew`. With no live channel left, whatever the
/// ended ones still hold is flushed.
fn frames_to_mix(channels: impl Iterator<Item = (bool, usize)>, max_skew: usize) -> usize {
    let mut slowest: Option<usize> = None;
    let mut fastest = 0;
    let mut leftover = 0;
    for (live, ready) in channels {
        if live {
            slowest = Some(slowest.map_or(ready, |s| s.min(ready)));
            fastest = fastest.max(ready);
        } else {
            leftover = leftover.max(ready);
        }
    }
    match slowest {
        Some(slowest) => slowest.max(fastest.saturating_sub(max_skew)),
        None => leftover,
    }
}

fn same_rate(a: f64, b: f64) -> bool {
    (a - b).abs() < 0.01
}

/// A live mix of one or more gain-staged sources.
///
/// Owns its processing loop and output track; `dispose` (or drop) ends both.
pub struct MixedAudioOutput {
    track: Arc<MediaTrack>,
    controls: Vec<(SourceKind, Arc<GainControl>)>,
    shared: Arc<MixerShared>,
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MixedAudioOutput {
    pub fn track(&self) -> &Arc<MediaTrack> {
        &self.track
    }

    pub fn sources(&self) -> Vec<SourceKind> {
        self.controls.iter().map(|(kind, _)| *kind).collect()
    }

    /// Adjust one input's gain in place. Returns false if `kind` is not mixed.
    pub fn set_gain(&self, kind: SourceKind, percent: u8) -> bool {
        match self.controls.iter().find(|(k, _)| *k == kind) {
            Some((_, control)) => {
                control.set_percent(percent);
                true
            }
            None => false,
        }
    }

    pub fn telemetry(&self) -> Vec<GainTelemetry> {
        self.controls.iter().map(|(_, control)| control.telemetry()).collect()
    }

    /// Most recent (RMS, peak) measured for `kind` after gain.
    pub fn levels(&self, kind: SourceKind) -> Option<(f32, f32)> {
        self.shared.levels.lock().get(&kind).copied()
    }

    pub fn mix_cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Relaxed)
    }

    /// Run one mixing pass on the calling thread. Returns the frames produced.
    pub fn mix_once(&self) -> usize {
        self.shared.mix_once()
    }

    /// Stop the processing loop, end the output track and release the gain stages.
    pub fn dispose(mut self) {
        self.stop_processing_loop();
        self.track.stop();
        let channels = std::mem::take(&mut *self.shared.channels.lock());
        for channel in channels {
            channel.stage.dispose();
        }
        log::info!("Mixed audio output disposed");
    }

    fn start_processing_loop(&mut self, tick: Duration) -> Result<(), CaptureError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&self.shared);

        let handle = thread::Builder::new()
            .name("audio-mixer".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(tick) {
                    Err(RecvTimeoutError::Timeout) => {
                        if !shared.output.is_live() {
                            break;
                        }
                        shared.mix_once();
                    }
                    // Stop requested or the owner went away.
                    _ => break,
                }
            })
            .map_err(|e| CaptureError::UnsupportedEnvironment(format!("failed to spawn mixer thread: {e}")))?;

        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        Ok(())
    }

    fn stop_processing_loop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MixedAudioOutput {
    fn drop(&mut self) {
        self.stop_processing_loop();
        self.track.stop();
    }
}

/// Sum equally-rated buffers sample by sample, zero-padding shorter ones and
/// clamping the result to `[-1.0, 1.0]`.
pub fn sum_sources(buffers: &[Vec<f32>]) -> Vec<f32> {
    let frame_count = buffers.iter().map(Vec::len).max().unwrap_or(0);
    let mut mixed = vec![0.0f32; frame_count];
    for buffer in buffers {
        for (out, sample) in mixed.iter_mut().zip(buffer) {
            *out += sample;
        }
    }
    for sample in &mut mixed {
        *sample = sample.clamp(-1.0, 1.0);
    }
    mixed
}

/// Linear interpolation resampling for mono audio.
///
/// Returns the input unchanged if the rates match.
pub fn resample(samples: &[f32], source_sample_rate: f64, target_sample_rate: f64) -> Vec<f32> {
    if same_rate(source_sample_rate, target_sample_rate) || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = target_sample_rate / source_sample_rate;
    let output_count = (samples.len() as f64 * ratio) as usize;

    (0..output_count)
        .map(|i| {
            let source_index = i as f64 / ratio;
            let index = source_index as usize;
            let fraction = (source_index - index as f64) as f32;
            match (samples.get(index), samples.get(index + 1)) {
                (Some(a), Some(b)) => a * (1.0 - fraction) + b * fraction,
                (Some(a), None) => *a,
                _ => 0.0,
            }
        })
        .collect()
}

/// Convert f32 samples `[-1.0, 1.0]` to 16-bit little-endian PCM, clamping out-of-range values.
pub fn to_int16_pcm(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

pub fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}
