// Library exports for the navigation delegate core

pub mod cancellation;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod navigation;
pub mod replay;
pub mod responder;
pub mod sequencer;

// Re-export commonly used types for embedders and tests
pub use config::DelegateConfig;
pub use error::{HostError, NavigationErrorKind, SequencerError, TerminationReason};
pub use events::LifecycleEvent;
pub use frame::{FrameHandle, FrameInfo, SurfaceId};
pub use navigation::{Navigation, NavigationAction, NavigationId, NavigationState};
pub use responder::{Decision, DecisionContext, NavigationResponder, ResponderRef};
pub use sequencer::{ActionPolicy, FrameCreation, LoadInstruction, NavigationDelegate};
