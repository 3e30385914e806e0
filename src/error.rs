use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::frame::{FrameHandle, SurfaceId};
use crate::navigation::{NavigationId, NavigationState};

/// Network or engine level failure reported by the rendering engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub failing_url: Option<Url>,
}

impl HostError {
    pub const CANCELLED: i64 = -999;
    pub const TIMED_OUT: i64 = -1001;
    pub const CANNOT_CONNECT_TO_HOST: i64 = -1004;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            failing_url: None,
        }
    }

    /// The load was stopped by the host (user pressed stop, a new load replaced it).
    pub fn cancelled() -> Self {
        Self::new(Self::CANCELLED, "cancelled")
    }

    pub fn with_failing_url(mut self, url: Url) -> Self {
        self.failing_url = Some(url);
        self
    }

    pub fn is_cancellation(&self) -> bool {
        self.code == Self::CANCELLED
    }
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "code {}", self.code)?;
        if !self.message.is_empty() {
            write!(f, " ({})", self.message)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Crash,
    ExceededMemoryLimit,
    ExceededCpuLimit,
    RequestedByClient,
}

/// Why a navigation ended in `cancelled` or `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum NavigationErrorKind {
    #[error("navigation cancelled by policy")]
    PolicyCancelled,
    #[error("responder {responder} faulted while deciding: {message}")]
    ResponderFaulted { responder: usize, message: String },
    #[error("frame load interrupted by policy change")]
    LoadInterruptedByPolicy,
    #[error("host transport failure: {0}")]
    HostTransportFailure(HostError),
    #[error("content process terminated: {0:?}")]
    ProcessTerminated(TerminationReason),
    #[error("superseded by a newer navigation")]
    Superseded,
}

impl NavigationErrorKind {
    /// Failures the core decided on itself, as opposed to ones the host reported.
    pub fn is_policy_driven(&self) -> bool {
        matches!(
            self,
            NavigationErrorKind::PolicyCancelled
                | NavigationErrorKind::ResponderFaulted { .. }
                | NavigationErrorKind::LoadInterruptedByPolicy
                | NavigationErrorKind::Superseded
        )
    }
}

/// Returned by a responder that could not reach a verdict. The arbitrator
/// treats it as a `cancel`.
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("{0}")]
    Failed(String),
    #[error("responder panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("illegal transition of {navigation} from {from:?} to {to:?}")]
pub struct TransitionError {
    pub navigation: NavigationId,
    pub from: NavigationState,
    pub to: NavigationState,
}

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("unknown navigation {0}")]
    UnknownNavigation(NavigationId),
    #[error("unknown frame {0}")]
    UnknownFrame(FrameHandle),
    #[error("unknown surface {0}")]
    UnknownSurface(SurfaceId),
    #[error("{0} is no longer the current navigation of its frame")]
    NotCurrent(NavigationId),
    #[error("{0} does not wait for a new window")]
    NotTargetingNewWindow(NavigationId),
    #[error("{0} is still waiting for a policy decision")]
    DecisionPending(NavigationId),
    #[error("no navigation to redirect to {0} from")]
    NoRedirectSource(Url),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}
