//! Immutable navigation values and the per-load state machine.

mod action;
mod response;
mod state;

pub use action::{ActionId, ActionRequest, NavigationAction, NavigationType, RedirectKind, Request};
pub use response::NavigationResponse;
pub use state::{Navigation, NavigationId, NavigationState};
