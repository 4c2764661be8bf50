//! # livepanel-sim
//!
//! Virtual backend for livepanel-core.
//!
//! Provides:
//! - `VirtualCaptureProvider`: screen, camera and microphones fed by generator threads
//! - `PermissionScript`: scripted grant/deny/dismiss answers with optional prompt delay
//! - `VirtualEncoder`: timesliced chunk encoder with fault injection
//! - `TintFilter`: colour-tint stand-in for the cosmetic camera filter
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use livepanel_core::{MediaSession, MemoryPreferenceStore, SessionConfig};
//! use livepanel_sim::{TintFilter, VirtualCaptureProvider, VirtualEncoder};
//!
//! let mut session = MediaSession::new(
//!     SessionConfig::default(),
//!     Arc::new(VirtualCaptureProvider::default()),
//!     Box::new(VirtualEncoder::new()),
//!     Arc::new(MemoryPreferenceStore::new()),
//! )?;
//! session.set_filter_gateway(Arc::new(TintFilter::default()));
//! ```

pub mod generators;
pub mod permissions;
pub mod tint_filter;
pub mod virtual_devices;
pub mod virtual_encoder;

pub use permissions::{PermissionScript, PromptAnswer, PromptStep};
pub use tint_filter::TintFilter;
pub use virtual_devices::{VirtualCaptureProvider, VirtualMicrophone, VirtualRig};
pub use virtual_encoder::{decode_chunks, EncoderProbe, VirtualEncoder};
