use std::rc::Rc;

use serde::Serialize;

use crate::error::{NavigationErrorKind, TerminationReason};
use crate::frame::SurfaceId;
use crate::navigation::{Navigation, NavigationAction};

/// Ordered lifecycle notification fanned out to every observing responder.
/// Navigations are snapshots taken when the event was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    WillStart {
        navigation: Navigation,
    },
    DidStart {
        navigation: Navigation,
    },
    DidReceiveRedirect {
        action: Rc<NavigationAction>,
        navigation: Navigation,
    },
    DidCommit {
        navigation: Navigation,
    },
    DidFinish {
        navigation: Navigation,
    },
    DidFail {
        navigation: Navigation,
        error: NavigationErrorKind,
    },
    DidTerminate {
        surface: SurfaceId,
        reason: TerminationReason,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::WillStart { .. } => "will_start",
            LifecycleEvent::DidStart { .. } => "did_start",
            LifecycleEvent::DidReceiveRedirect { .. } => "did_receive_redirect",
            LifecycleEvent::DidCommit { .. } => "did_commit",
            LifecycleEvent::DidFinish { .. } => "did_finish",
            LifecycleEvent::DidFail { .. } => "did_fail",
            LifecycleEvent::DidTerminate { .. } => "did_terminate",
        }
    }

    /// The navigation the event is about. For a redirect that is the
    /// navigation being redirected away from.
    pub fn navigation(&self) -> Option<&Navigation> {
        match self {
            LifecycleEvent::WillStart { navigation }
            | LifecycleEvent::DidStart { navigation }
            | LifecycleEvent::DidReceiveRedirect { navigation, .. }
            | LifecycleEvent::DidCommit { navigation }
            | LifecycleEvent::DidFinish { navigation }
            | LifecycleEvent::DidFail { navigation, .. } => Some(navigation),
            LifecycleEvent::DidTerminate { .. } => None,
        }
    }
}
