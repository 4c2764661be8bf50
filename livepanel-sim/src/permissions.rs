//! Scripted answers to capture requests.
//!
//! A real host prompts the user; the simulator pops the next scripted step
//! for the requested kind instead. Unscripted requests are granted at once.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;

use livepanel_core::models::error::CaptureError;
use livepanel_core::models::media::SourceKind;

/// How the user (or the environment) answers one capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Grant,
    Deny,
    Dismiss,
    NoDevice,
    Unsupported,
    Busy,
}

impl PromptAnswer {
    /// The error a denied request surfaces as; `None` for `Grant`.
    pub fn to_error(self, kind: SourceKind) -> Option<CaptureError> {
        match self {
            Self::Grant => None,
            Self::Deny => Some(CaptureError::PermissionDenied(kind)),
            Self::Dismiss => Some(CaptureError::UserCancelled(kind)),
            Self::NoDevice => Some(CaptureError::DeviceNotFound(kind)),
            Self::Unsupported => Some(CaptureError::UnsupportedEnvironment(format!(
                "{kind} capture is not available in this environment"
            ))),
            Self::Busy => Some(CaptureError::DeviceBusy(format!("{kind} is in use by another application"))),
        }
    }
}

/// One scripted step: how long the prompt stays open and its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptStep {
    pub delay: Duration,
    pub answer: PromptAnswer,
}

impl PromptStep {
    pub fn immediate(answer: PromptAnswer) -> Self {
        Self {
            delay: Duration::ZERO,
            answer,
        }
    }

    pub fn after(delay: Duration, answer: PromptAnswer) -> Self {
        Self { delay, answer }
    }
}

/// Per-kind queue of prompt steps.
#[derive(Debug, Default)]
pub struct PermissionScript {
    steps: Mutex<HashMap<SourceKind, VecDeque<PromptStep>>>,
}

impl PermissionScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, kind: SourceKind, step: PromptStep) {
        self.steps.lock().entry(kind).or_default().push_back(step);
    }

    /// Next step for `kind`, or an immediate grant when nothing is scripted.
    pub fn next(&self, kind: SourceKind) -> PromptStep {
        self.steps
            .lock()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or(PromptStep::immediate(PromptAnswer::Grant))
    }

    pub fn pending(&self, kind: SourceKind) -> usize {
        self.steps.lock().get(&kind).map_or(0, VecDeque::len)
    }
}
