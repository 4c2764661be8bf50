//! # livepanel-core
//!
//! Media session core for a live-streaming control panel.
//!
//! Owns the screen, camera and microphone handles, stages and mixes audio,
//! routes the camera through an optional cosmetic filter, composes the
//! recording stream and drives the chunked recorder. Capture devices, the
//! encoder, the filter and preference persistence are traits so hosts (or
//! `livepanel-sim`) can plug in their own.
//!
//! ## Architecture
//!
//! ```text
//! livepanel-core (this crate)
//! ├── traits/       ← CaptureProvider, MediaEncoder, FilterGateway, PreferenceStore, SessionDelegate
//! ├── models/       ← CaptureError, MediaTrack/MediaStream, SessionConfig, RecorderState, Preferences
//! ├── processing/   ← GainStage, AudioMixer, AudioMonitor, RingBuffer, codec negotiation
//! ├── session/      ← MediaSession, DeviceSourceManager, FilterController, composer, RecorderSession
//! └── storage/      ← artifact/screenshot export, metadata sidecar, preference stores
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{AudioLevels, DeviceInfo, SessionDiagnostics};
pub use models::config::{AudioConstraints, CameraConstraints, GainPolicy, ScreenConstraints, SessionConfig};
pub use models::error::{CaptureError, ErrorCategory};
pub use models::media::{MediaStream, MediaTrack, SourceKind, TrackKind, VideoFrame};
pub use models::preferences::Preferences;
pub use models::recording_result::{RecordingArtifact, RecordingMetadata, Screenshot, VideoOrigin};
pub use models::state::{FilterMode, FilterStatus, RecorderState, SessionStatus};
pub use processing::gain::{GainCurve, GainPath, GainTelemetry};
pub use session::context::{MediaSession, RecordingStarted};
pub use session::devices::StopOutcome;
pub use session::filter::FilterOutcome;
pub use storage::export::{export_artifact, export_screenshot};
pub use storage::preference_file::{JsonFilePreferenceStore, MemoryPreferenceStore};
pub use traits::capture_provider::CaptureProvider;
pub use traits::encoder::{ChunkCallback, EncoderErrorCallback, EncoderSettings, MediaEncoder};
pub use traits::filter_gateway::FilterGateway;
pub use traits::preference_store::PreferenceStore;
pub use traits::session_delegate::SessionDelegate;
