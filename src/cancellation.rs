use std::collections::HashMap;

use tokio::sync::watch;

use crate::frame::FrameHandle;
use crate::navigation::NavigationId;

/// What a pending decision belongs to. `frame` is `None` for a load whose
/// new window does not exist yet; such decisions are never superseded by
/// activity on other frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecisionScope {
    pub frame: Option<FrameHandle>,
    pub navigation: NavigationId,
}

/// Cooperative cancellation signal handed to responders while they decide.
#[derive(Debug, Clone)]
pub struct DecisionToken {
    scope: DecisionScope,
    cancel_rx: watch::Receiver<bool>,
}

impl DecisionToken {
    pub fn scope(&self) -> DecisionScope {
        self.scope
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Resolves once the decision has been superseded. Never resolves for a
    /// decision that completes normally.
    pub async fn cancelled(&self) {
        let mut cancel_rx = self.cancel_rx.clone();
        if cancel_rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug)]
struct PendingDecision {
    navigation: NavigationId,
    cancel_tx: watch::Sender<bool>,
}

/// Tracks the one pending decision allowed per frame.
#[derive(Debug, Default)]
pub struct CancellationCoordinator {
    by_frame: HashMap<FrameHandle, PendingDecision>,
    unbound: HashMap<NavigationId, watch::Sender<bool>>,
}

impl CancellationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decision for `scope`. Whatever was pending on the same frame
    /// is cancelled and its navigation returned.
    pub fn begin(&mut self, scope: DecisionScope) -> (DecisionToken, Option<NavigationId>) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let superseded = match scope.frame {
            Some(frame) => self
                .by_frame
                .insert(
                    frame,
                    PendingDecision {
                        navigation: scope.navigation,
                        cancel_tx,
                    },
                )
                .map(|previous| {
                    previous.cancel_tx.send_replace(true);
                    previous.navigation
                }),
            None => {
                if let Some(previous) = self.unbound.insert(scope.navigation, cancel_tx) {
                    previous.send_replace(true);
                }
                None
            }
        };
        (DecisionToken { scope, cancel_rx }, superseded)
    }

    /// Release the scope after its verdict was produced. A scope that was
    /// already superseded is left alone.
    pub fn finish(&mut self, scope: DecisionScope) {
        match scope.frame {
            Some(frame) => {
                if self
                    .by_frame
                    .get(&frame)
                    .is_some_and(|pending| pending.navigation == scope.navigation)
                {
                    self.by_frame.remove(&frame);
                }
            }
            None => {
                if self.unbound.remove(&scope.navigation).is_none() {
                    // Rebound onto its new window in the meantime.
                    self.by_frame
                        .retain(|_, pending| pending.navigation != scope.navigation);
                }
            }
        }
    }

    pub fn cancel_frame(&mut self, frame: FrameHandle) -> Option<NavigationId> {
        self.by_frame.remove(&frame).map(|pending| {
            pending.cancel_tx.send_replace(true);
            pending.navigation
        })
    }

    pub fn cancel_navigation(&mut self, navigation: NavigationId) -> bool {
        if let Some(cancel_tx) = self.unbound.remove(&navigation) {
            cancel_tx.send_replace(true);
            return true;
        }
        let frame = self
            .by_frame
            .iter()
            .find(|(_, pending)| pending.navigation == navigation)
            .map(|(frame, _)| *frame);
        match frame {
            Some(frame) => self.cancel_frame(frame).is_some(),
            None => false,
        }
    }

    /// Move a pending new-window decision onto the frame that was created for it.
    pub fn rebind(&mut self, navigation: NavigationId, frame: FrameHandle) {
        if let Some(cancel_tx) = self.unbound.remove(&navigation) {
            if let Some(previous) = self
                .by_frame
                .insert(frame, PendingDecision { navigation, cancel_tx })
            {
                previous.cancel_tx.send_replace(true);
            }
        }
    }

    pub fn is_pending(&self, navigation: NavigationId) -> bool {
        self.unbound.contains_key(&navigation)
            || self
                .by_frame
                .values()
                .any(|pending| pending.navigation == navigation)
    }
}
