//! Drive a [`NavigationDelegate`] from a YAML trace of engine callbacks.
//!
//! A trace declares scripted responders and the ordered host steps. Frames
//! and navigations are referred to by names chosen in the trace.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::DelegateConfig;
use crate::error::{HostError, ResponderError, SequencerError, TerminationReason};
use crate::events::LifecycleEvent;
use crate::frame::FrameHandle;
use crate::navigation::{
    ActionRequest, NavigationAction, NavigationId, NavigationResponse, NavigationType,
    RedirectKind, Request,
};
use crate::responder::{Capabilities, Decision, DecisionContext, NavigationResponder, ResponderRef};
use crate::sequencer::{FrameCreation, LoadInstruction, NavigationDelegate};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read trace: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse trace: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("step {step}: unknown frame `{name}`")]
    UnknownFrame { step: usize, name: String },
    #[error("step {step}: unknown navigation `{label}`")]
    UnknownLabel { step: usize, label: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub responders: Vec<ResponderScript>,
    pub steps: Vec<Step>,
}

impl ReplayScript {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ReplayError> {
        Ok(serde_yaml::from_str(contents)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponderScript {
    pub name: String,
    #[serde(default)]
    pub observe: bool,
    #[serde(default)]
    pub action: Vec<Rule>,
    #[serde(default)]
    pub response: Vec<Rule>,
    /// Fail every decision with this message.
    #[serde(default)]
    pub fault: Option<String>,
}

/// First matching rule wins; a rule without conditions matches everything.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub url_contains: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    pub decision: Decision,
}

impl Rule {
    fn matches(&self, url: &Url, status: Option<u16>) -> bool {
        let url_matches = self
            .url_contains
            .as_deref()
            .map_or(true, |needle| url.as_str().contains(needle));
        let status_matches = self.status.map_or(true, |wanted| status == Some(wanted));
        url_matches && status_matches
    }
}

fn default_mime_type() -> String {
    String::from("text/html")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    CreateSurface {
        name: String,
        #[serde(default)]
        opener: Option<String>,
    },
    CreateChild {
        name: String,
        parent: String,
    },
    /// Create the surface a new-window navigation waits for.
    CreateWindow {
        name: String,
        label: String,
    },
    DecideAction {
        label: String,
        frame: String,
        url: Url,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        new_window: bool,
        #[serde(default)]
        navigation_type: NavigationType,
        #[serde(default)]
        redirect: Option<RedirectKind>,
        #[serde(default)]
        user_initiated: bool,
    },
    WillStart {
        label: String,
        frame: String,
        url: Url,
        #[serde(default)]
        navigation_type: NavigationType,
    },
    DidReceiveRedirect {
        label: String,
        frame: String,
        url: Url,
        #[serde(default = "server_redirect")]
        kind: RedirectKind,
    },
    DidStart {
        label: String,
    },
    DecideResponse {
        label: String,
        #[serde(default)]
        url: Option<Url>,
        #[serde(default)]
        status: Option<u16>,
        #[serde(default = "default_mime_type")]
        mime_type: String,
    },
    DidCommit {
        label: String,
    },
    DidFinish {
        label: String,
    },
    DidFail {
        label: String,
        code: i64,
        #[serde(default)]
        message: String,
    },
    Terminate {
        frame: String,
        reason: TerminationReason,
    },
    CloseSurface {
        frame: String,
    },
}

fn server_redirect() -> RedirectKind {
    RedirectKind::Server
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum ReplayRecord {
    Event {
        event: LifecycleEvent,
    },
    Instruction {
        step: usize,
        label: String,
        instruction: LoadInstruction,
    },
    /// The delegate refused a host callback.
    Rejected {
        step: usize,
        error: String,
    },
}

type Journal = Rc<RefCell<Vec<ReplayRecord>>>;

struct ScriptedResponder {
    script: ResponderScript,
}

#[async_trait(?Send)]
impl NavigationResponder for ScriptedResponder {
    fn capabilities(&self) -> Capabilities {
        let faulty = self.script.fault.is_some();
        Capabilities {
            decide_action: faulty || !self.script.action.is_empty(),
            decide_response: faulty || !self.script.response.is_empty(),
            observe: self.script.observe,
        }
    }

    async fn decide_action(
        &self,
        action: &NavigationAction,
        _cx: &DecisionContext,
    ) -> Result<Decision, ResponderError> {
        self.decide(&self.script.action, action.url(), None)
    }

    async fn decide_response(
        &self,
        response: &NavigationResponse,
        _cx: &DecisionContext,
    ) -> Result<Decision, ResponderError> {
        self.decide(&self.script.response, &response.url, response.status)
    }

    fn observe(&self, event: &LifecycleEvent) {
        debug!(responder = %self.script.name, event = event.name(), "observed");
    }
}

impl ScriptedResponder {
    fn decide(&self, rules: &[Rule], url: &Url, status: Option<u16>) -> Result<Decision, ResponderError> {
        if let Some(message) = &self.script.fault {
            return Err(ResponderError::Failed(message.clone()));
        }
        Ok(rules
            .iter()
            .find(|rule| rule.matches(url, status))
            .map_or(Decision::Next, |rule| rule.decision))
    }
}

struct Recorder {
    journal: Journal,
}

#[async_trait(?Send)]
impl NavigationResponder for Recorder {
    fn capabilities(&self) -> Capabilities {
        Capabilities::OBSERVER
    }

    fn observe(&self, event: &LifecycleEvent) {
        self.journal.borrow_mut().push(ReplayRecord::Event {
            event: event.clone(),
        });
    }
}

struct Replay<'a> {
    delegate: &'a NavigationDelegate,
    journal: Journal,
    frames: HashMap<String, FrameHandle>,
    labels: HashMap<String, NavigationId>,
}

impl Replay<'_> {
    fn frame(&self, step: usize, name: &str) -> Result<FrameHandle, ReplayError> {
        self.frames
            .get(name)
            .copied()
            .ok_or_else(|| ReplayError::UnknownFrame {
                step,
                name: name.to_string(),
            })
    }

    fn label(&self, step: usize, label: &str) -> Result<NavigationId, ReplayError> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| ReplayError::UnknownLabel {
                step,
                label: label.to_string(),
            })
    }

    fn record(&self, record: ReplayRecord) {
        self.journal.borrow_mut().push(record);
    }

    fn settle<T>(&self, step: usize, result: Result<T, SequencerError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.record(ReplayRecord::Rejected {
                    step,
                    error: err.to_string(),
                });
                None
            }
        }
    }

    fn instruction(&self, step: usize, label: &str, instruction: LoadInstruction) {
        self.record(ReplayRecord::Instruction {
            step,
            label: label.to_string(),
            instruction,
        });
    }

    async fn step(&mut self, index: usize, step: &Step) -> Result<(), ReplayError> {
        let delegate = self.delegate;
        match step {
            Step::CreateSurface { name, opener } => {
                let opener = match opener {
                    Some(opener) => Some(self.frame(index, opener)?),
                    None => None,
                };
                let created = delegate.on_did_create_frame(FrameCreation::Surface { opener });
                if let Some(info) = self.settle(index, created) {
                    self.frames.insert(name.clone(), info.handle);
                }
            }
            Step::CreateChild { name, parent } => {
                let parent = self.frame(index, parent)?;
                let created = delegate.on_did_create_frame(FrameCreation::Child { parent });
                if let Some(info) = self.settle(index, created) {
                    self.frames.insert(name.clone(), info.handle);
                }
            }
            Step::CreateWindow { name, label } => {
                let navigation = self.label(index, label)?;
                let created = delegate.on_did_create_frame(FrameCreation::NewWindow { navigation });
                if let Some(info) = self.settle(index, created) {
                    self.frames.insert(name.clone(), info.handle);
                }
            }
            Step::DecideAction {
                label,
                frame,
                url,
                target,
                new_window,
                navigation_type,
                redirect,
                user_initiated,
            } => {
                let source = self.frame(index, frame)?;
                let mut raw = ActionRequest::new(source, Request::get(url.clone()))
                    .with_type(redirect.map_or(*navigation_type, NavigationType::Redirect));
                if let Some(target) = target {
                    raw = raw.targeting(self.frame(index, target)?);
                }
                if *new_window {
                    raw = raw.targeting_new_window();
                }
                if *user_initiated {
                    raw = raw.user_initiated();
                }
                let policy = delegate.on_decide_action_policy(raw).await;
                if let Some(policy) = self.settle(index, policy) {
                    self.labels.insert(label.clone(), policy.navigation);
                    self.instruction(index, label, policy.instruction);
                }
            }
            Step::WillStart {
                label,
                frame,
                url,
                navigation_type,
            } => {
                let frame = self.frame(index, frame)?;
                let raw = ActionRequest::new(frame, Request::get(url.clone())).with_type(*navigation_type);
                let started = delegate.on_will_start_action(raw);
                if let Some(navigation) = self.settle(index, started) {
                    self.labels.insert(label.clone(), navigation);
                }
            }
            Step::DidReceiveRedirect {
                label,
                frame,
                url,
                kind,
            } => {
                let frame = self.frame(index, frame)?;
                let raw = ActionRequest::new(frame, Request::get(url.clone()))
                    .with_type(NavigationType::Redirect(*kind));
                let redirected = delegate.on_did_receive_redirect(raw);
                if let Some(navigation) = self.settle(index, redirected) {
                    self.labels.insert(label.clone(), navigation);
                }
            }
            Step::DidStart { label } => {
                let navigation = self.label(index, label)?;
                self.settle(index, delegate.on_did_start(navigation));
            }
            Step::DecideResponse {
                label,
                url,
                status,
                mime_type,
            } => {
                let navigation = self.label(index, label)?;
                let url = match url {
                    Some(url) => url.clone(),
                    None => match delegate.navigation(navigation) {
                        Some(navigation) => navigation.action().url().clone(),
                        None => {
                            return Err(ReplayError::UnknownLabel {
                                step: index,
                                label: label.clone(),
                            })
                        }
                    },
                };
                let mut response = NavigationResponse::new(url);
                response.status = *status;
                response.mime_type = Some(mime_type.clone());
                let instruction = delegate.on_decide_response_policy(navigation, response).await;
                if let Some(instruction) = self.settle(index, instruction) {
                    self.instruction(index, label, instruction);
                }
            }
            Step::DidCommit { label } => {
                let navigation = self.label(index, label)?;
                self.settle(index, delegate.on_did_commit(navigation));
            }
            Step::DidFinish { label } => {
                let navigation = self.label(index, label)?;
                self.settle(index, delegate.on_did_finish(navigation));
            }
            Step::DidFail {
                label,
                code,
                message,
            } => {
                let navigation = self.label(index, label)?;
                let error = HostError::new(*code, message.clone());
                self.settle(index, delegate.on_did_fail(navigation, error));
            }
            Step::Terminate { frame, reason } => {
                let surface = self.frame(index, frame)?.surface();
                self.settle(index, delegate.on_did_terminate_process(surface, *reason));
            }
            Step::CloseSurface { frame } => {
                let surface = self.frame(index, frame)?.surface();
                self.settle(index, delegate.on_did_close_surface(surface));
            }
        }
        Ok(())
    }
}

/// Run every step of `script` against a fresh delegate and return what the
/// observers saw, interleaved with the instructions handed back to the host.
pub async fn run(script: &ReplayScript, config: DelegateConfig) -> Result<Vec<ReplayRecord>, ReplayError> {
    let journal: Journal = Rc::new(RefCell::new(Vec::new()));
    let mut responders: Vec<ResponderRef> = script
        .responders
        .iter()
        .cloned()
        .map(|script| ResponderRef::strong(Rc::new(ScriptedResponder { script })))
        .collect();
    responders.push(ResponderRef::strong(Rc::new(Recorder {
        journal: Rc::clone(&journal),
    })));

    let delegate = NavigationDelegate::new(config, responders);
    let mut replay = Replay {
        delegate: &delegate,
        journal: Rc::clone(&journal),
        frames: HashMap::new(),
        labels: HashMap::new(),
    };
    for (index, step) in script.steps.iter().enumerate() {
        replay.step(index, step).await?;
    }

    let records = journal.take();
    info!(
        steps = script.steps.len(),
        records = records.len(),
        "replay finished"
    );
    Ok(records)
}
