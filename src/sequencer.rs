//! Single entry point for rendering-engine callbacks.
//!
//! The binding calls one `on_*` method per raw engine event, serially, on one
//! sequencing context. The delegate canonicalises those calls into ordered
//! [`Navigation`] transitions, runs decisions through the responder chain, and
//! answers every decision with the one instruction the engine understands.
//!
//! Decision calls suspend while responders work. The delegate may be
//! re-entered meanwhile, which is how stale decisions arise: shared state is
//! only ever borrowed between suspension points, and every verdict is checked
//! against its cancellation token before it is applied.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancellation::{CancellationCoordinator, DecisionScope};
use crate::config::DelegateConfig;
use crate::error::{HostError, NavigationErrorKind, SequencerError, TerminationReason};
use crate::events::LifecycleEvent;
use crate::frame::{FrameHandle, FrameInfo, FrameRegistry, SurfaceId};
use crate::navigation::{
    ActionId, ActionRequest, Navigation, NavigationAction, NavigationId, NavigationResponse,
    NavigationState, NavigationType, RedirectKind,
};
use crate::responder::{DecisionContext, ResponderChain, ResponderRef, Verdict};

/// What the rendering engine is told to do with a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadInstruction {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionPolicy {
    /// Identity the binding uses for every later callback about this load.
    pub navigation: NavigationId,
    pub instruction: LoadInstruction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCreation {
    /// A new surface; its main frame is returned.
    Surface { opener: Option<FrameHandle> },
    /// The surface a new-window navigation was waiting for.
    NewWindow { navigation: NavigationId },
    Child { parent: FrameHandle },
}

#[derive(Debug)]
struct RedirectLink {
    previous: NavigationId,
    announced: bool,
    decided: bool,
}

struct SequencerState {
    retained_navigations: usize,
    frames: FrameRegistry,
    coordinator: CancellationCoordinator,
    actions: BTreeMap<ActionId, Rc<NavigationAction>>,
    navigations: BTreeMap<NavigationId, Navigation>,
    current: HashMap<FrameHandle, NavigationId>,
    redirects: HashMap<NavigationId, RedirectLink>,
    approved_by_policy: HashSet<NavigationId>,
    /// Navigations that left the running set, oldest first. Pruning source.
    closed: VecDeque<NavigationId>,
    next_action: u64,
    next_navigation: u64,
}

impl SequencerState {
    fn new(config: &DelegateConfig) -> Self {
        Self {
            retained_navigations: config.retained_navigations,
            frames: FrameRegistry::new(),
            coordinator: CancellationCoordinator::new(),
            actions: BTreeMap::new(),
            navigations: BTreeMap::new(),
            current: HashMap::new(),
            redirects: HashMap::new(),
            approved_by_policy: HashSet::new(),
            closed: VecDeque::new(),
            next_action: 0,
            next_navigation: 0,
        }
    }

    fn navigation(&self, id: NavigationId) -> Result<&Navigation, SequencerError> {
        self.navigations
            .get(&id)
            .ok_or(SequencerError::UnknownNavigation(id))
    }

    fn navigation_mut(&mut self, id: NavigationId) -> Result<&mut Navigation, SequencerError> {
        self.navigations
            .get_mut(&id)
            .ok_or(SequencerError::UnknownNavigation(id))
    }

    fn current_navigation_mut(
        &mut self,
        id: NavigationId,
    ) -> Result<&mut Navigation, SequencerError> {
        let navigation = self.navigation_mut(id)?;
        if !navigation.is_current() {
            return Err(SequencerError::NotCurrent(id));
        }
        Ok(navigation)
    }

    /// The action a new load follows: the latest one on the frame it replaces,
    /// or on the opener for a new window.
    fn previous_action(&self, raw: &ActionRequest) -> Option<ActionId> {
        let frame = raw.target_frame.unwrap_or(raw.source_frame);
        self.current
            .get(&frame)
            .and_then(|id| self.navigations.get(id))
            .map(|navigation| navigation.action().id())
    }

    fn build_action(
        &mut self,
        raw: ActionRequest,
        from: Option<ActionId>,
        redirects: Vec<ActionId>,
    ) -> Result<Rc<NavigationAction>, SequencerError> {
        let source = self.frames.lookup(raw.source_frame)?.clone();
        let target = match raw.target_frame {
            Some(handle) => Some(self.frames.lookup(handle)?.clone()),
            None => None,
        };
        self.next_action += 1;
        let action = Rc::new(NavigationAction::new(
            ActionId(self.next_action),
            raw,
            source,
            target,
            from,
            redirects,
        ));
        self.actions.insert(action.id(), Rc::clone(&action));
        Ok(action)
    }

    /// Create a navigation and make it the current one of its frame. The
    /// previous current navigation loses its flag here, in the same step, and
    /// any decision still pending on the frame is cancelled.
    fn start_navigation(&mut self, action: Rc<NavigationAction>) -> NavigationId {
        self.next_navigation += 1;
        let id = NavigationId(self.next_navigation);
        let navigation = Navigation::new(id, action);
        if let Some(frame) = navigation.frame() {
            self.supersede(frame, id);
        }
        self.navigations.insert(id, navigation);
        id
    }

    fn supersede(&mut self, frame: FrameHandle, by: NavigationId) {
        if let Some(stale) = self.coordinator.cancel_frame(frame) {
            debug!(
                target = "navigation",
                navigation = %stale,
                superseded_by = %by,
                frame = %frame,
                "pending decision superseded"
            );
        }
        if let Some(previous) = self.current.insert(frame, by) {
            if let Some(navigation) = self.navigations.get_mut(&previous) {
                navigation.resign_current();
            }
        }
    }

    /// The frame's current navigation, when `raw` may redirect away from it.
    fn redirect_source(
        &self,
        raw: &ActionRequest,
    ) -> Option<(NavigationId, ActionId, RedirectKind)> {
        let kind = raw.navigation_type.redirect_kind()?;
        let previous = self.navigations.get(self.current.get(&raw.target_frame?)?)?;
        previous
            .state()
            .can_transition_to(&NavigationState::Redirected(kind))
            .then(|| (previous.id(), previous.action().id(), kind))
    }

    /// Open the navigation for a policy or redirect callback. A redirect ends
    /// the frame's current navigation and carries its chain forward.
    fn open_navigation(
        &mut self,
        raw: ActionRequest,
    ) -> Result<(NavigationId, Option<NavigationId>), SequencerError> {
        let redirected = self.redirect_source(&raw);

        let (from, chain) = match redirected {
            Some((previous, previous_action, _)) => {
                let mut chain = self.navigation(previous)?.redirects().to_vec();
                chain.push(previous_action);
                (Some(previous_action), chain)
            }
            None => (self.previous_action(&raw), Vec::new()),
        };
        let action = self.build_action(raw, from, chain)?;

        let previous = match redirected {
            Some((previous, _, kind)) => {
                self.navigation_mut(previous)?
                    .transition(NavigationState::Redirected(kind))?;
                Some(previous)
            }
            None => None,
        };

        let id = self.start_navigation(action);
        if let Some(previous) = previous {
            self.redirects.insert(
                id,
                RedirectLink {
                    previous,
                    announced: false,
                    decided: false,
                },
            );
            self.close(previous);
        }
        Ok((id, previous))
    }

    /// The redirect navigation already opened for `raw` by the other of the
    /// two redirect callbacks, if any.
    fn paired_redirect(
        &self,
        raw: &ActionRequest,
        claimed: fn(&RedirectLink) -> bool,
    ) -> Option<NavigationId> {
        let id = *self.current.get(&raw.target_frame?)?;
        if claimed(self.redirects.get(&id)?) {
            return None;
        }
        let navigation = self.navigations.get(&id)?;
        (navigation.action().url() == &raw.request.url).then_some(id)
    }

    fn close(&mut self, id: NavigationId) {
        if !self.closed.contains(&id) {
            self.closed.push_back(id);
        }
        self.prune();
    }

    /// Forget the oldest closed navigations beyond the retention limit, and
    /// the actions nothing retained refers to any more.
    fn prune(&mut self) {
        let mut excess = self.closed.len().saturating_sub(self.retained_navigations);
        if excess == 0 {
            return;
        }

        // Still needed for the redirect announcement.
        let pinned: HashSet<NavigationId> = self
            .redirects
            .values()
            .filter(|link| !link.announced)
            .map(|link| link.previous)
            .collect();
        let mut retained = VecDeque::with_capacity(self.closed.len());
        for id in self.closed.drain(..) {
            let is_current = self
                .navigations
                .get(&id)
                .is_some_and(Navigation::is_current);
            if excess > 0 && !is_current && !pinned.contains(&id) {
                self.navigations.remove(&id);
                self.redirects.remove(&id);
                self.approved_by_policy.remove(&id);
                excess -= 1;
            } else {
                retained.push_back(id);
            }
        }
        self.closed = retained;

        let referenced: HashSet<ActionId> = self
            .navigations
            .values()
            .flat_map(|navigation| {
                std::iter::once(navigation.action().id())
                    .chain(navigation.redirects().iter().copied())
            })
            .collect();
        self.actions.retain(|id, _| referenced.contains(id));
    }

    /// Move `id` to a terminal state and return the snapshot to report.
    fn terminate(
        &mut self,
        id: NavigationId,
        state: NavigationState,
    ) -> Result<Navigation, SequencerError> {
        let navigation = self.navigation_mut(id)?;
        navigation.transition(state)?;
        let snapshot = navigation.clone();
        log_outcome(&snapshot);
        self.close(id);
        Ok(snapshot)
    }
}

fn log_outcome(navigation: &Navigation) {
    match navigation.state().error() {
        Some(error) => info!(
            target = "navigation",
            navigation = %navigation.id(),
            url = %navigation.action().url(),
            is_current = navigation.is_current(),
            error = %error,
            "navigation ended"
        ),
        None => info!(
            target = "navigation",
            navigation = %navigation.id(),
            url = %navigation.action().url(),
            is_current = navigation.is_current(),
            "navigation finished"
        ),
    }
}

/// Clears the fan-out flag however the fan-out ends.
struct DispatchGuard<'a>(&'a Cell<bool>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Mediates one page's navigation lifecycle between the rendering engine and
/// the registered responders. Lifetime is tied to the owning page.
pub struct NavigationDelegate {
    responders: ResponderChain,
    state: RefCell<SequencerState>,
    outbox: RefCell<VecDeque<LifecycleEvent>>,
    dispatching: Cell<bool>,
}

impl NavigationDelegate {
    pub fn new(config: DelegateConfig, responders: Vec<ResponderRef>) -> Self {
        let state = SequencerState::new(&config);
        Self {
            responders: ResponderChain::new(responders)
                .with_decision_tracing(config.trace_decisions),
            state: RefCell::new(state),
            outbox: RefCell::new(VecDeque::new()),
            dispatching: Cell::new(false),
        }
    }

    pub fn responders(&self) -> &ResponderChain {
        &self.responders
    }

    fn with_state<R>(
        &self,
        callback: &'static str,
        f: impl FnOnce(&mut SequencerState) -> Result<R, SequencerError>,
    ) -> Result<R, SequencerError> {
        let result = f(&mut self.state.borrow_mut());
        if let Err(err) = &result {
            warn!(
                target = "navigation",
                callback,
                error = %err,
                "host callback rejected"
            );
        }
        result
    }

    /// Queue an event and, unless a fan-out is already running further up the
    /// stack, deliver queued events one whole event at a time.
    fn emit(&self, event: LifecycleEvent) {
        self.outbox.borrow_mut().push_back(event);
        if self.dispatching.replace(true) {
            return;
        }
        let _dispatching = DispatchGuard(&self.dispatching);
        loop {
            let next = self.outbox.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            debug!(
                target = "navigation",
                event = event.name(),
                navigation = ?event.navigation().map(Navigation::id),
                "lifecycle event"
            );
            self.responders.notify(&event);
        }
    }

    pub fn on_did_create_frame(&self, creation: FrameCreation) -> Result<FrameInfo, SequencerError> {
        self.with_state("did_create_frame", |state| match creation {
            FrameCreation::Surface { opener } => {
                if let Some(opener) = opener {
                    state.frames.lookup(opener)?;
                }
                Ok(state.frames.create_surface(opener))
            }
            FrameCreation::Child { parent } => state.frames.create_child(parent),
            FrameCreation::NewWindow { navigation: id } => {
                let navigation = state.navigation(id)?;
                if navigation.frame().is_some() || !navigation.action().is_targeting_new_window() {
                    return Err(SequencerError::NotTargetingNewWindow(id));
                }
                let opener = navigation.action().source_frame().handle;
                let info = state.frames.create_surface(Some(opener));
                state.navigation_mut(id)?.bind_frame(info.handle);
                state.current.insert(info.handle, id);
                state.coordinator.rebind(id, info.handle);
                debug!(
                    target = "navigation",
                    navigation = %id,
                    frame = %info.handle,
                    "new window bound"
                );
                Ok(info)
            }
        })
    }

    /// The engine began a load that did not go through the action policy
    /// (about: pages, simulated requests, session restore).
    pub fn on_will_start_action(&self, raw: ActionRequest) -> Result<NavigationId, SequencerError> {
        let started = self.with_state("will_start_action", |state| {
            if let Some(id) = raw.target_frame.and_then(|frame| state.current.get(&frame).copied()) {
                let navigation = state.navigation(id)?;
                if state.approved_by_policy.contains(&id)
                    && navigation.state() == &NavigationState::Approved
                    && navigation.action().url() == &raw.request.url
                {
                    return Ok((id, None));
                }
            }

            let from = state.previous_action(&raw);
            let action = state.build_action(raw, from, Vec::new())?;
            let id = state.start_navigation(action);
            let navigation = state.navigation_mut(id)?;
            navigation.transition(NavigationState::Approved)?;
            Ok((id, Some(navigation.clone())))
        })?;

        let (id, snapshot) = started;
        if let Some(navigation) = snapshot {
            self.emit(LifecycleEvent::WillStart { navigation });
        }
        Ok(id)
    }

    /// The engine reported a redirect. Whichever of this and the matching
    /// action-policy call comes first opens the redirect navigation.
    pub fn on_did_receive_redirect(
        &self,
        mut raw: ActionRequest,
    ) -> Result<NavigationId, SequencerError> {
        if !raw.navigation_type.is_redirect() {
            raw.navigation_type = NavigationType::Redirect(RedirectKind::Server);
        }

        let (id, event) = self.with_state("did_receive_redirect", |state| {
            let url = raw.request.url.clone();
            let id = match state.paired_redirect(&raw, |link| link.announced) {
                Some(id) => id,
                None if state.redirect_source(&raw).is_some() => state.open_navigation(raw)?.0,
                None => return Err(SequencerError::NoRedirectSource(url)),
            };
            let Some(link) = state.redirects.get_mut(&id) else {
                return Err(SequencerError::NoRedirectSource(url));
            };
            if link.announced {
                return Ok((id, None));
            }
            link.announced = true;
            let previous = link.previous;

            let navigation = state.navigation(id)?;
            if navigation.state().is_terminal() {
                return Ok((id, None));
            }
            let action = Rc::clone(navigation.action());
            let navigation = state.navigation(previous)?.clone();
            Ok((id, Some(LifecycleEvent::DidReceiveRedirect { action, navigation })))
        })?;

        if let Some(event) = event {
            self.emit(event);
        }
        Ok(id)
    }

    /// Arbitrate the action policy for a load. Resolves once the responders
    /// have reached a verdict, or once a superseded decision's suspended
    /// responder returns.
    pub async fn on_decide_action_policy(
        &self,
        raw: ActionRequest,
    ) -> Result<ActionPolicy, SequencerError> {
        let (action, cx) = self.with_state("decide_action_policy", |state| {
            let paired = state
                .paired_redirect(&raw, |link| link.decided)
                .filter(|id| {
                    state
                        .navigations
                        .get(id)
                        .is_some_and(|navigation| navigation.state() == &NavigationState::Initiated)
                });
            let id = match paired {
                Some(id) => id,
                None => state.open_navigation(raw)?.0,
            };
            if let Some(link) = state.redirects.get_mut(&id) {
                link.decided = true;
            }

            let navigation = state.navigation(id)?.clone();
            let (token, _) = state.coordinator.begin(DecisionScope {
                frame: navigation.frame(),
                navigation: id,
            });
            Ok((
                Rc::clone(navigation.action()),
                DecisionContext::new(navigation, token),
            ))
        })?;

        debug!(
            target = "navigation",
            navigation = %cx.navigation_id(),
            url = %action.url(),
            navigation_type = ?action.navigation_type(),
            "deciding action policy"
        );
        let verdict = self.responders.arbitrate_action(&action, &cx).await;
        self.apply_action_verdict(&cx, verdict)
    }

    fn apply_action_verdict(
        &self,
        cx: &DecisionContext,
        verdict: Verdict,
    ) -> Result<ActionPolicy, SequencerError> {
        let id = cx.navigation_id();
        let verdict = if cx.is_cancelled() {
            Verdict::Superseded
        } else {
            verdict
        };

        let (instruction, events) = self.with_state("decide_action_policy", |state| {
            state.coordinator.finish(cx.token().scope());
            match verdict {
                Verdict::Allow { .. } => {
                    // A server redirect continues a load the engine already started.
                    let resumes = state.redirects.contains_key(&id)
                        && cx.navigation().action().navigation_type()
                            == NavigationType::Redirect(RedirectKind::Server);
                    let navigation = state.navigation_mut(id)?;
                    navigation.transition(NavigationState::Approved)?;
                    let mut events = vec![LifecycleEvent::WillStart {
                        navigation: navigation.clone(),
                    }];
                    if resumes {
                        navigation.transition(NavigationState::Started)?;
                        events.push(LifecycleEvent::DidStart {
                            navigation: navigation.clone(),
                        });
                    } else {
                        state.approved_by_policy.insert(id);
                    }
                    Ok((LoadInstruction::Continue, events))
                }
                Verdict::Cancel { .. } => {
                    state.terminate(
                        id,
                        NavigationState::Cancelled(NavigationErrorKind::PolicyCancelled),
                    )?;
                    Ok((LoadInstruction::Stop, Vec::new()))
                }
                Verdict::Faulted { responder, message } => {
                    let error = NavigationErrorKind::ResponderFaulted { responder, message };
                    let navigation =
                        state.terminate(id, NavigationState::Cancelled(error.clone()))?;
                    Ok((
                        LoadInstruction::Stop,
                        vec![LifecycleEvent::DidFail { navigation, error }],
                    ))
                }
                Verdict::Superseded => {
                    // A host failure or termination may already have ended it.
                    let pending = state
                        .navigations
                        .get(&id)
                        .is_some_and(|navigation| navigation.state() == &NavigationState::Initiated);
                    if pending {
                        state.terminate(
                            id,
                            NavigationState::Cancelled(NavigationErrorKind::Superseded),
                        )?;
                    }
                    Ok((LoadInstruction::Stop, Vec::new()))
                }
            }
        })?;

        for event in events {
            self.emit(event);
        }
        Ok(ActionPolicy {
            navigation: id,
            instruction,
        })
    }

    /// A repeated start, as the engine may send for a resumed server
    /// redirect, is accepted without a second event.
    pub fn on_did_start(&self, id: NavigationId) -> Result<(), SequencerError> {
        let started = self.with_state("did_start", |state| {
            let navigation = state.current_navigation_mut(id)?;
            if navigation.state() == &NavigationState::Started {
                return Ok(None);
            }
            navigation.transition(NavigationState::Started)?;
            let navigation = navigation.clone();
            state.approved_by_policy.remove(&id);
            Ok(Some(navigation))
        })?;
        if let Some(navigation) = started {
            self.emit(LifecycleEvent::DidStart { navigation });
        }
        Ok(())
    }

    /// Arbitrate the response policy. A cancel here fails the navigation with
    /// `LoadInterruptedByPolicy`.
    pub async fn on_decide_response_policy(
        &self,
        id: NavigationId,
        response: NavigationResponse,
    ) -> Result<LoadInstruction, SequencerError> {
        let cx = self.with_state("decide_response_policy", |state| {
            let navigation = state.current_navigation_mut(id)?;
            navigation.receive_response(response.clone())?;
            let navigation = navigation.clone();
            let (token, _) = state.coordinator.begin(DecisionScope {
                frame: navigation.frame(),
                navigation: id,
            });
            Ok(DecisionContext::new(navigation, token))
        })?;

        debug!(
            target = "navigation",
            navigation = %id,
            url = %response.url,
            status = ?response.status,
            "deciding response policy"
        );
        let verdict = self.responders.arbitrate_response(&response, &cx).await;
        self.apply_response_verdict(&cx, verdict)
    }

    fn apply_response_verdict(
        &self,
        cx: &DecisionContext,
        verdict: Verdict,
    ) -> Result<LoadInstruction, SequencerError> {
        let id = cx.navigation_id();
        let verdict = if cx.is_cancelled() {
            Verdict::Superseded
        } else {
            verdict
        };

        let (instruction, event) = self.with_state("decide_response_policy", |state| {
            state.coordinator.finish(cx.token().scope());
            let error = match verdict {
                Verdict::Allow { .. } => return Ok((LoadInstruction::Continue, None)),
                Verdict::Superseded => return Ok((LoadInstruction::Stop, None)),
                Verdict::Cancel { .. } => NavigationErrorKind::LoadInterruptedByPolicy,
                Verdict::Faulted { responder, message } => {
                    NavigationErrorKind::ResponderFaulted { responder, message }
                }
            };
            let navigation = state.terminate(id, NavigationState::Failed(error.clone()))?;
            Ok((
                LoadInstruction::Stop,
                Some(LifecycleEvent::DidFail { navigation, error }),
            ))
        })?;

        if let Some(event) = event {
            self.emit(event);
        }
        Ok(instruction)
    }

    pub fn on_did_commit(&self, id: NavigationId) -> Result<(), SequencerError> {
        let navigation = self.with_state("did_commit", |state| {
            if state.coordinator.is_pending(id) {
                return Err(SequencerError::DecisionPending(id));
            }
            let navigation = state.current_navigation_mut(id)?;
            navigation.transition(NavigationState::Committed)?;
            let navigation = navigation.clone();
            if let Some(frame) = navigation.frame() {
                let url = navigation
                    .response()
                    .map(|response| &response.url)
                    .unwrap_or_else(|| navigation.action().url());
                state.frames.commit_url(frame, url);
            }
            Ok(navigation)
        })?;
        self.emit(LifecycleEvent::DidCommit { navigation });
        Ok(())
    }

    /// Accepted for superseded navigations too; the engine may report the
    /// finish of N after the action of N+1 on the same frame.
    pub fn on_did_finish(&self, id: NavigationId) -> Result<(), SequencerError> {
        let navigation = self.with_state("did_finish", |state| {
            state.terminate(id, NavigationState::Finished)
        })?;
        self.emit(LifecycleEvent::DidFinish { navigation });
        Ok(())
    }

    /// Host-reported failure. Only ever moves `id` itself; the frame's current
    /// navigation is untouched when `id` has been superseded.
    pub fn on_did_fail(&self, id: NavigationId, error: HostError) -> Result<(), SequencerError> {
        let event = self.with_state("did_fail", |state| {
            let navigation = state.navigation(id)?;
            if navigation.state().is_terminal() {
                debug!(
                    target = "navigation",
                    navigation = %id,
                    error = %error,
                    "failure for an already ended navigation"
                );
                return Ok(None);
            }

            let deciding = state.coordinator.is_pending(id);
            let kind = if deciding
                && error.is_cancellation()
                && navigation.state() == &NavigationState::ResponseReceived
            {
                NavigationErrorKind::LoadInterruptedByPolicy
            } else {
                NavigationErrorKind::HostTransportFailure(error)
            };
            if deciding {
                state.coordinator.cancel_navigation(id);
            }
            let navigation = state.terminate(id, NavigationState::Failed(kind.clone()))?;
            Ok(Some(LifecycleEvent::DidFail {
                navigation,
                error: kind,
            }))
        })?;

        if let Some(event) = event {
            self.emit(event);
        }
        Ok(())
    }

    /// The surface's content process died. Observers see `DidTerminate`, then
    /// one `DidFail` per navigation that was current on the surface.
    pub fn on_did_terminate_process(
        &self,
        surface: SurfaceId,
        reason: TerminationReason,
    ) -> Result<(), SequencerError> {
        let failures = self.with_state("did_terminate_process", |state| {
            if !state.frames.contains_surface(surface) {
                return Err(SequencerError::UnknownSurface(surface));
            }
            let mut failures = Vec::new();
            for frame in state.frames.frames_of(surface) {
                state.coordinator.cancel_frame(frame);
                let Some(id) = state.current.get(&frame).copied() else {
                    continue;
                };
                if state.navigation(id)?.state().is_terminal() {
                    continue;
                }
                let error = NavigationErrorKind::ProcessTerminated(reason);
                let navigation = state.terminate(id, NavigationState::Failed(error.clone()))?;
                failures.push(LifecycleEvent::DidFail { navigation, error });
            }
            Ok(failures)
        })?;

        warn!(
            target = "navigation",
            surface = %surface,
            reason = ?reason,
            "content process terminated"
        );
        self.emit(LifecycleEvent::DidTerminate { surface, reason });
        for failure in failures {
            self.emit(failure);
        }
        Ok(())
    }

    /// Drop a surface and its frames. Pending decisions on it are cancelled,
    /// and loads still running on it fail as if the host had stopped them.
    pub fn on_did_close_surface(&self, surface: SurfaceId) -> Result<(), SequencerError> {
        let failures = self.with_state("did_close_surface", |state| {
            if !state.frames.contains_surface(surface) {
                return Err(SequencerError::UnknownSurface(surface));
            }
            let mut failures = Vec::new();
            for frame in state.frames.remove_surface(surface) {
                state.coordinator.cancel_frame(frame);
                let Some(id) = state.current.get(&frame).copied() else {
                    continue;
                };
                if !state.navigation(id)?.state().is_terminal() {
                    let error = NavigationErrorKind::HostTransportFailure(HostError::cancelled());
                    let navigation = state.terminate(id, NavigationState::Failed(error.clone()))?;
                    failures.push(LifecycleEvent::DidFail { navigation, error });
                }
                state.current.remove(&frame);
                if let Some(navigation) = state.navigations.get_mut(&id) {
                    navigation.resign_current();
                }
                state.close(id);
            }
            Ok(failures)
        })?;

        for failure in failures {
            self.emit(failure);
        }
        Ok(())
    }

    pub fn navigation(&self, id: NavigationId) -> Option<Navigation> {
        self.state.borrow().navigations.get(&id).cloned()
    }

    pub fn current_navigation(&self, frame: FrameHandle) -> Option<Navigation> {
        let state = self.state.borrow();
        state
            .current
            .get(&frame)
            .and_then(|id| state.navigations.get(id))
            .cloned()
    }

    pub fn action(&self, id: ActionId) -> Option<Rc<NavigationAction>> {
        self.state.borrow().actions.get(&id).cloned()
    }

    /// Prior actions of the load that led to `id`, oldest first.
    pub fn redirect_chain(&self, id: NavigationId) -> Vec<Rc<NavigationAction>> {
        let state = self.state.borrow();
        state
            .navigations
            .get(&id)
            .map(|navigation| {
                navigation
                    .redirects()
                    .iter()
                    .filter_map(|action| state.actions.get(action).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn frame(&self, handle: FrameHandle) -> Option<FrameInfo> {
        self.state.borrow().frames.get(handle).cloned()
    }

    pub fn is_deciding(&self, id: NavigationId) -> bool {
        self.state.borrow().coordinator.is_pending(id)
    }
}
