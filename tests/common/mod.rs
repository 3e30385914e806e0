// Shared fixtures for the delegate integration tests.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use url::Url;

use waypoint::error::ResponderError;
use waypoint::navigation::{ActionRequest, NavigationResponse, Request};
use waypoint::responder::Capabilities;
use waypoint::{
    Decision, DecisionContext, DelegateConfig, FrameCreation, FrameHandle, LifecycleEvent,
    NavigationAction, NavigationDelegate, NavigationId, NavigationResponder, ResponderRef,
};

pub const HOST: &str = "http://localhost:8084";

pub fn url(path: &str) -> Url {
    Url::parse(HOST).unwrap().join(path).unwrap()
}

pub fn request(frame: FrameHandle, path: &str) -> ActionRequest {
    ActionRequest::new(frame, Request::get(url(path)))
}

pub fn ok_response(path: &str) -> NavigationResponse {
    NavigationResponse::http(url(path), 200, "text/html")
}

pub fn delegate(responders: &[&Rc<MockResponder>]) -> NavigationDelegate {
    delegate_with_config(DelegateConfig::default(), responders)
}

pub fn delegate_with_config(
    config: DelegateConfig,
    responders: &[&Rc<MockResponder>],
) -> NavigationDelegate {
    NavigationDelegate::new(
        config,
        responders
            .iter()
            .map(|responder| ResponderRef::strong(Rc::clone(responder)))
            .collect(),
    )
}

pub fn main_frame(delegate: &NavigationDelegate) -> FrameHandle {
    delegate
        .on_did_create_frame(FrameCreation::Surface { opener: None })
        .unwrap()
        .handle
}

/// Run `path` on `frame` from action policy through finish.
pub async fn load(delegate: &NavigationDelegate, frame: FrameHandle, path: &str) -> NavigationId {
    let id = commit(delegate, frame, path).await;
    delegate.on_did_finish(id).unwrap();
    id
}

/// Run `path` on `frame` up to and including commit.
pub async fn commit(delegate: &NavigationDelegate, frame: FrameHandle, path: &str) -> NavigationId {
    let id = start(delegate, frame, path).await;
    delegate
        .on_decide_response_policy(id, ok_response(path))
        .await
        .unwrap();
    delegate.on_did_commit(id).unwrap();
    id
}

/// Run `path` on `frame` through the action policy and start.
pub async fn start(delegate: &NavigationDelegate, frame: FrameHandle, path: &str) -> NavigationId {
    let policy = delegate
        .on_decide_action_policy(request(frame, path))
        .await
        .unwrap();
    delegate.on_did_start(policy.navigation).unwrap();
    policy.navigation
}

/// Test side of a suspended decision.
pub struct GateHandle {
    /// Resolves once the responder is suspended inside its decision.
    pub entered: oneshot::Receiver<()>,
    /// Send to let the responder return.
    pub release: oneshot::Sender<()>,
}

struct Gate {
    needle: String,
    entered: Option<oneshot::Sender<()>>,
    release: oneshot::Receiver<()>,
}

impl Gate {
    fn arm(needle: &str) -> (Gate, GateHandle) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        (
            Gate {
                needle: needle.to_string(),
                entered: Some(entered_tx),
                release: release_rx,
            },
            GateHandle {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }

    async fn pass(mut self) {
        if let Some(entered) = self.entered.take() {
            let _ = entered.send(());
        }
        let _ = self.release.await;
    }
}

type Rule<T> = Box<dyn Fn(&T) -> Result<Decision, ResponderError>>;

/// Responder that records everything it is asked and told.
pub struct MockResponder {
    capabilities: Capabilities,
    on_action: Rule<NavigationAction>,
    on_response: Rule<NavigationResponse>,
    action_gate: RefCell<Option<Gate>>,
    response_gate: RefCell<Option<Gate>>,
    history: RefCell<Vec<String>>,
    events: RefCell<Vec<LifecycleEvent>>,
    saw_cancellation: Cell<bool>,
}

impl Default for MockResponder {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::ALL,
            on_action: Box::new(|_| Ok(Decision::Next)),
            on_response: Box::new(|_| Ok(Decision::Next)),
            action_gate: RefCell::new(None),
            response_gate: RefCell::new(None),
            history: RefCell::new(Vec::new()),
            events: RefCell::new(Vec::new()),
            saw_cancellation: Cell::new(false),
        }
    }
}

impl MockResponder {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn deciding_action(
        rule: impl Fn(&NavigationAction) -> Result<Decision, ResponderError> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            on_action: Box::new(rule),
            ..Self::default()
        })
    }

    pub fn deciding_response(
        rule: impl Fn(&NavigationResponse) -> Result<Decision, ResponderError> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            on_response: Box::new(rule),
            ..Self::default()
        })
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Rc<Self> {
        Rc::new(Self {
            capabilities,
            ..Self::default()
        })
    }

    /// Suspend the next action decision for a URL containing `needle`.
    pub fn gate_action(&self, needle: &str) -> GateHandle {
        let (gate, handle) = Gate::arm(needle);
        *self.action_gate.borrow_mut() = Some(gate);
        handle
    }

    /// Suspend the next response decision for a URL containing `needle`.
    pub fn gate_response(&self, needle: &str) -> GateHandle {
        let (gate, handle) = Gate::arm(needle);
        *self.response_gate.borrow_mut() = Some(gate);
        handle
    }

    /// Decisions asked and events observed, in order, as short strings.
    pub fn trace(&self) -> Vec<String> {
        self.history.borrow().clone()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.borrow().clone()
    }

    /// Whether a gated decision found its token cancelled on release.
    pub fn saw_cancellation(&self) -> bool {
        self.saw_cancellation.get()
    }

    fn take_gate(slot: &RefCell<Option<Gate>>, url: &Url) -> Option<Gate> {
        let mut slot = slot.borrow_mut();
        if slot
            .as_ref()
            .is_some_and(|gate| url.as_str().contains(&gate.needle))
        {
            slot.take()
        } else {
            None
        }
    }
}

#[async_trait(?Send)]
impl NavigationResponder for MockResponder {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn decide_action(
        &self,
        action: &NavigationAction,
        cx: &DecisionContext,
    ) -> Result<Decision, ResponderError> {
        self.history
            .borrow_mut()
            .push(format!("action {}", path_of(action.url())));
        if let Some(gate) = Self::take_gate(&self.action_gate, action.url()) {
            gate.pass().await;
            self.saw_cancellation.set(cx.is_cancelled());
        }
        (self.on_action)(action)
    }

    async fn decide_response(
        &self,
        response: &NavigationResponse,
        cx: &DecisionContext,
    ) -> Result<Decision, ResponderError> {
        self.history.borrow_mut().push(format!(
            "response {} {}",
            path_of(&response.url),
            response.status.unwrap_or_default()
        ));
        if let Some(gate) = Self::take_gate(&self.response_gate, &response.url) {
            gate.pass().await;
            self.saw_cancellation.set(cx.is_cancelled());
        }
        (self.on_response)(response)
    }

    fn observe(&self, event: &LifecycleEvent) {
        let entry = match event {
            LifecycleEvent::DidReceiveRedirect { action, .. } => {
                format!("did_receive_redirect {}", action.url().path())
            }
            LifecycleEvent::DidTerminate { .. } => String::from("did_terminate"),
            other => match other.navigation() {
                Some(navigation) => {
                    format!("{} {}", other.name(), path_of(navigation.action().url()))
                }
                None => other.name().to_string(),
            },
        };
        self.history.borrow_mut().push(entry);
        self.events.borrow_mut().push(event.clone());
    }
}

fn path_of(url: &Url) -> String {
    if url.cannot_be_a_base() {
        url.as_str().to_string()
    } else {
        url.path().to_string()
    }
}
