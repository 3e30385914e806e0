use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use super::action::{ActionId, NavigationAction, RedirectKind};
use super::response::NavigationResponse;
use crate::error::{NavigationErrorKind, TransitionError};
use crate::frame::FrameHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NavigationId(pub(crate) u64);

impl fmt::Display for NavigationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "navigation-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum NavigationState {
    Initiated,
    Approved,
    Started,
    Redirected(RedirectKind),
    ResponseReceived,
    Committed,
    Finished,
    Cancelled(NavigationErrorKind),
    Failed(NavigationErrorKind),
}

impl NavigationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NavigationState::Finished | NavigationState::Cancelled(_) | NavigationState::Failed(_)
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, NavigationState::Failed(_))
    }

    pub fn error(&self) -> Option<&NavigationErrorKind> {
        match self {
            NavigationState::Cancelled(kind) | NavigationState::Failed(kind) => Some(kind),
            _ => None,
        }
    }

    /// Forward-only transition table.
    pub fn can_transition_to(&self, next: &NavigationState) -> bool {
        use NavigationState::*;

        matches!(
            (self, next),
            (Initiated, Approved)
                | (Initiated, Cancelled(_))
                | (Initiated, Failed(_))
                | (Approved, Started)
                | (Approved, Failed(_))
                | (Started, Redirected(_))
                | (Started, ResponseReceived)
                | (Started, Committed)
                | (Started, Failed(_))
                | (ResponseReceived, Committed)
                | (ResponseReceived, Failed(_))
                | (Committed, Redirected(RedirectKind::Client))
                | (Committed, Finished)
                | (Committed, Failed(_))
                | (Redirected(_), Finished)
                | (Redirected(_), Failed(_))
        )
    }
}

/// One load attempt. A redirect ends this record and starts a new one that
/// carries the grown redirect chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Navigation {
    id: NavigationId,
    state: NavigationState,
    action: Rc<NavigationAction>,
    response: Option<NavigationResponse>,
    redirects: Vec<ActionId>,
    is_current: bool,
    frame: Option<FrameHandle>,
}

impl Navigation {
    pub(crate) fn new(id: NavigationId, action: Rc<NavigationAction>) -> Self {
        let redirects = action.redirects().to_vec();
        let frame = action.target_frame().map(|info| info.handle);
        Self {
            id,
            state: NavigationState::Initiated,
            action,
            response: None,
            redirects,
            is_current: true,
            frame,
        }
    }

    pub fn id(&self) -> NavigationId {
        self.id
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn action(&self) -> &Rc<NavigationAction> {
        &self.action
    }

    pub fn response(&self) -> Option<&NavigationResponse> {
        self.response.as_ref()
    }

    pub fn redirects(&self) -> &[ActionId] {
        &self.redirects
    }

    pub fn is_current(&self) -> bool {
        self.is_current
    }

    /// `None` while a new-window load waits for its surface.
    pub fn frame(&self) -> Option<FrameHandle> {
        self.frame
    }

    pub(crate) fn transition(&mut self, next: NavigationState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(&next) {
            return Err(TransitionError {
                navigation: self.id,
                from: self.state.clone(),
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn receive_response(
        &mut self,
        response: NavigationResponse,
    ) -> Result<(), TransitionError> {
        self.transition(NavigationState::ResponseReceived)?;
        self.response = Some(response);
        Ok(())
    }

    pub(crate) fn resign_current(&mut self) {
        self.is_current = false;
    }

    pub(crate) fn bind_frame(&mut self, frame: FrameHandle) {
        self.frame = Some(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameRegistry;
    use crate::navigation::action::{ActionRequest, Request};
    use url::Url;

    fn navigation() -> Navigation {
        let mut frames = FrameRegistry::new();
        let main = frames.create_surface(None);
        let raw = ActionRequest::new(
            main.handle,
            Request::get(Url::parse("http://localhost/").unwrap()),
        );
        let action = NavigationAction::new(ActionId(1), raw, main.clone(), Some(main), None, vec![]);
        Navigation::new(NavigationId(1), Rc::new(action))
    }

    #[test]
    fn walks_the_happy_path() {
        let mut nav = navigation();
        nav.transition(NavigationState::Approved).unwrap();
        nav.transition(NavigationState::Started).unwrap();
        let url = nav.action().url().clone();
        nav.receive_response(NavigationResponse::http(url, 200, "text/html"))
            .unwrap();
        nav.transition(NavigationState::Committed).unwrap();
        nav.transition(NavigationState::Finished).unwrap();

        assert!(nav.state().is_terminal());
        assert!(nav.response().is_some());
    }

    #[test]
    fn never_moves_backward() {
        let mut nav = navigation();
        nav.transition(NavigationState::Approved).unwrap();
        nav.transition(NavigationState::Started).unwrap();

        let err = nav.transition(NavigationState::Approved).unwrap_err();
        assert_eq!(err.from, NavigationState::Started);
        assert_eq!(nav.state(), &NavigationState::Started);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut nav = navigation();
        nav.transition(NavigationState::Cancelled(NavigationErrorKind::PolicyCancelled))
            .unwrap();

        assert!(nav.transition(NavigationState::Approved).is_err());
        assert!(nav
            .transition(NavigationState::Failed(NavigationErrorKind::LoadInterruptedByPolicy))
            .is_err());
    }

    #[test]
    fn only_client_redirects_leave_a_committed_document() {
        let committed = NavigationState::Committed;
        assert!(committed.can_transition_to(&NavigationState::Redirected(RedirectKind::Client)));
        assert!(!committed.can_transition_to(&NavigationState::Redirected(RedirectKind::Server)));
    }

    #[test]
    fn starts_initiated_and_current() {
        let nav = navigation();
        assert!(nav.is_current());
        assert!(nav.frame().is_some());
        assert_eq!(nav.state(), &NavigationState::Initiated);
    }
}
