use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use futures_util::FutureExt;
use tracing::{debug, warn};

use super::{Decision, DecisionContext, ResponderRef};
use crate::error::ResponderError;
use crate::events::LifecycleEvent;
use crate::navigation::{NavigationAction, NavigationResponse};

/// Outcome of one arbitration round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// `responder` is `None` when every capable responder deferred.
    Allow { responder: Option<usize> },
    Cancel { responder: usize },
    /// The responder failed or panicked; handled as a cancel.
    Faulted { responder: usize, message: String },
    /// The decision was superseded while in flight. Nothing may be applied.
    Superseded,
}

#[derive(Clone, Copy)]
enum Subject<'a> {
    Action(&'a NavigationAction),
    Response(&'a NavigationResponse),
}

impl Subject<'_> {
    fn label(&self) -> &'static str {
        match self {
            Subject::Action(_) => "action",
            Subject::Response(_) => "response",
        }
    }
}

/// Fixed, ordered responder list. Immutable once the delegate owns it.
#[derive(Debug, Default)]
pub struct ResponderChain {
    responders: Vec<ResponderRef>,
    trace_decisions: bool,
}

impl ResponderChain {
    pub fn new(responders: Vec<ResponderRef>) -> Self {
        Self {
            responders,
            trace_decisions: false,
        }
    }

    pub fn with_decision_tracing(mut self, enabled: bool) -> Self {
        self.trace_decisions = enabled;
        self
    }

    pub fn len(&self) -> usize {
        self.responders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responders.is_empty()
    }

    pub async fn arbitrate_action(&self, action: &NavigationAction, cx: &DecisionContext) -> Verdict {
        self.arbitrate(Subject::Action(action), cx).await
    }

    pub async fn arbitrate_response(
        &self,
        response: &NavigationResponse,
        cx: &DecisionContext,
    ) -> Verdict {
        self.arbitrate(Subject::Response(response), cx).await
    }

    async fn arbitrate(&self, subject: Subject<'_>, cx: &DecisionContext) -> Verdict {
        for (index, entry) in self.responders.iter().enumerate() {
            if cx.is_cancelled() {
                return Verdict::Superseded;
            }
            let Some(responder) = entry.upgrade() else {
                continue;
            };
            let capabilities = responder.capabilities();
            let pending = match subject {
                Subject::Action(action) if capabilities.decide_action => {
                    responder.decide_action(action, cx)
                }
                Subject::Response(response) if capabilities.decide_response => {
                    responder.decide_response(response, cx)
                }
                _ => continue,
            };

            let outcome = match AssertUnwindSafe(pending).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Err(ResponderError::Panicked(panic_message(payload.as_ref()))),
            };

            // A verdict produced after supersession is dropped on the floor.
            if cx.is_cancelled() {
                debug!(
                    target = "arbitration",
                    navigation = %cx.navigation_id(),
                    responder = index,
                    subject = subject.label(),
                    "decision superseded while responder was suspended"
                );
                return Verdict::Superseded;
            }

            match outcome {
                Ok(decision) => {
                    if self.trace_decisions {
                        debug!(
                            target = "arbitration",
                            navigation = %cx.navigation_id(),
                            responder = index,
                            subject = subject.label(),
                            decision = ?decision,
                            "responder verdict"
                        );
                    }
                    match decision {
                        Decision::Next => continue,
                        Decision::Allow => {
                            return Verdict::Allow {
                                responder: Some(index),
                            }
                        }
                        Decision::Cancel => return Verdict::Cancel { responder: index },
                    }
                }
                Err(err) => {
                    warn!(
                        target = "arbitration",
                        navigation = %cx.navigation_id(),
                        responder = index,
                        subject = subject.label(),
                        error = %err,
                        "responder faulted, cancelling"
                    );
                    return Verdict::Faulted {
                        responder: index,
                        message: err.to_string(),
                    };
                }
            }
        }

        Verdict::Allow { responder: None }
    }

    /// Deliver one whole event to every observing responder, in order. A
    /// panicking observer misses only this event.
    pub fn notify(&self, event: &LifecycleEvent) {
        for (index, entry) in self.responders.iter().enumerate() {
            let Some(responder) = entry.upgrade() else {
                continue;
            };
            if !responder.capabilities().observe {
                continue;
            }
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| responder.observe(event)))
            {
                warn!(
                    target = "arbitration",
                    responder = index,
                    event = event.name(),
                    panic = %panic_message(payload.as_ref()),
                    "observer panicked"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic payload")
    }
}
