//! Feature modules plug into the navigation lifecycle through
//! [`NavigationResponder`]. Registration order decides both arbitration
//! precedence and notification order.

mod chain;

use std::rc::{Rc, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use chain::{ResponderChain, Verdict};

use crate::cancellation::DecisionToken;
use crate::error::ResponderError;
use crate::events::LifecycleEvent;
use crate::frame::FrameHandle;
use crate::navigation::{Navigation, NavigationAction, NavigationId, NavigationResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Defer to the next responder.
    Next,
    Allow,
    Cancel,
}

/// Which of the three hooks a responder takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub decide_action: bool,
    pub decide_response: bool,
    pub observe: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        decide_action: true,
        decide_response: true,
        observe: true,
    };

    pub const OBSERVER: Capabilities = Capabilities {
        decide_action: false,
        decide_response: false,
        observe: true,
    };

    pub const DECIDER: Capabilities = Capabilities {
        decide_action: true,
        decide_response: true,
        observe: false,
    };
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::ALL
    }
}

/// Everything a responder gets to see while deciding, besides the subject.
pub struct DecisionContext {
    navigation: Navigation,
    token: DecisionToken,
}

impl DecisionContext {
    pub(crate) fn new(navigation: Navigation, token: DecisionToken) -> Self {
        Self { navigation, token }
    }

    /// Snapshot of the navigation as it was when the decision began.
    pub fn navigation(&self) -> &Navigation {
        &self.navigation
    }

    pub fn navigation_id(&self) -> NavigationId {
        self.navigation.id()
    }

    pub fn frame(&self) -> Option<FrameHandle> {
        self.token.scope().frame
    }

    /// True once a newer navigation on the same frame has superseded this one.
    /// A verdict returned after that point is discarded.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> &DecisionToken {
        &self.token
    }
}

#[async_trait(?Send)]
pub trait NavigationResponder {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn decide_action(
        &self,
        _action: &NavigationAction,
        _cx: &DecisionContext,
    ) -> Result<Decision, ResponderError> {
        Ok(Decision::Next)
    }

    async fn decide_response(
        &self,
        _response: &NavigationResponse,
        _cx: &DecisionContext,
    ) -> Result<Decision, ResponderError> {
        Ok(Decision::Next)
    }

    fn observe(&self, _event: &LifecycleEvent) {}
}

/// Registered responder. A weak entry whose owner went away is skipped.
#[derive(Clone)]
pub enum ResponderRef {
    Strong(Rc<dyn NavigationResponder>),
    Weak(Weak<dyn NavigationResponder>),
}

impl ResponderRef {
    pub fn strong<R: NavigationResponder + 'static>(responder: Rc<R>) -> Self {
        ResponderRef::Strong(responder)
    }

    pub fn weak<R: NavigationResponder + 'static>(responder: &Rc<R>) -> Self {
        let erased: Rc<dyn NavigationResponder> = responder.clone();
        ResponderRef::Weak(Rc::downgrade(&erased))
    }

    pub fn upgrade(&self) -> Option<Rc<dyn NavigationResponder>> {
        match self {
            ResponderRef::Strong(responder) => Some(Rc::clone(responder)),
            ResponderRef::Weak(responder) => responder.upgrade(),
        }
    }
}

impl std::fmt::Debug for ResponderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponderRef::Strong(_) => f.write_str("ResponderRef::Strong"),
            ResponderRef::Weak(weak) => write!(
                f,
                "ResponderRef::Weak(alive: {})",
                weak.strong_count() > 0
            ),
        }
    }
}
