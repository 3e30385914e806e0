// New windows, child frames, process termination and surface teardown.
mod common;

use common::*;
use waypoint::{
    FrameCreation, HostError, LifecycleEvent, LoadInstruction, NavigationErrorKind,
    NavigationState, SequencerError, TerminationReason,
};

#[tokio::test]
async fn new_window_navigation_binds_to_created_surface() {
    let responder = MockResponder::new();
    let delegate = delegate(&[&responder]);
    let opener = main_frame(&delegate);
    let opener_load = load(&delegate, opener, "/").await;

    let policy = delegate
        .on_decide_action_policy(request(opener, "/popup").targeting_new_window().user_initiated())
        .await
        .unwrap();
    assert_eq!(policy.instruction, LoadInstruction::Continue);
    let pending = delegate.navigation(policy.navigation).unwrap();
    assert!(pending.frame().is_none());
    assert!(pending.action().is_targeting_new_window());
    assert!(pending.action().is_user_initiated());

    let window = delegate
        .on_did_create_frame(FrameCreation::NewWindow {
            navigation: policy.navigation,
        })
        .unwrap();
    assert!(window.is_main_frame);
    assert_ne!(window.surface(), opener.surface());
    assert_eq!(window.security_origin, "http://localhost:8084");

    delegate.on_did_start(policy.navigation).unwrap();
    delegate
        .on_decide_response_policy(policy.navigation, ok_response("/popup"))
        .await
        .unwrap();
    delegate.on_did_commit(policy.navigation).unwrap();

    let popup = delegate.current_navigation(window.handle).unwrap();
    assert_eq!(popup.id(), policy.navigation);
    assert_eq!(popup.frame(), Some(window.handle));
    assert_eq!(
        popup.action().from(),
        Some(delegate.navigation(opener_load).unwrap().action().id())
    );
    // The opener keeps its own current navigation.
    assert_eq!(
        delegate.current_navigation(opener).map(|n| n.id()),
        Some(opener_load)
    );
    assert_eq!(delegate.frame(window.handle).unwrap().url, Some(url("/popup")));
}

#[tokio::test]
async fn only_new_window_navigations_can_claim_a_surface() {
    let delegate = delegate(&[]);
    let frame = main_frame(&delegate);
    let same_frame = start(&delegate, frame, "/").await;

    assert!(matches!(
        delegate.on_did_create_frame(FrameCreation::NewWindow {
            navigation: same_frame
        }),
        Err(SequencerError::NotTargetingNewWindow(_))
    ));

    let popup = delegate
        .on_decide_action_policy(request(frame, "/popup").targeting_new_window())
        .await
        .unwrap()
        .navigation;
    delegate
        .on_did_create_frame(FrameCreation::NewWindow { navigation: popup })
        .unwrap();
    assert!(matches!(
        delegate.on_did_create_frame(FrameCreation::NewWindow { navigation: popup }),
        Err(SequencerError::NotTargetingNewWindow(_))
    ));
}

#[tokio::test]
async fn child_frame_decision_survives_main_frame_navigation() {
    let responder = MockResponder::new();
    let delegate = delegate(&[&responder]);
    let main = main_frame(&delegate);
    load(&delegate, main, "/").await;
    let child = delegate
        .on_did_create_frame(FrameCreation::Child { parent: main })
        .unwrap();
    assert!(!child.is_main_frame);
    let GateHandle { entered, release } = responder.gate_action("/widget");

    let (widget, next) = tokio::join!(
        delegate.on_decide_action_policy(request(child.handle, "/widget")),
        async {
            entered.await.unwrap();
            let next = delegate
                .on_decide_action_policy(request(main, "/next"))
                .await;
            release.send(()).unwrap();
            next
        }
    );

    assert_eq!(widget.unwrap().instruction, LoadInstruction::Continue);
    assert_eq!(next.unwrap().instruction, LoadInstruction::Continue);
    assert!(!responder.saw_cancellation());
}

#[tokio::test]
async fn termination_fails_current_navigations_after_notice() {
    let responder = MockResponder::new();
    let delegate = delegate(&[&responder]);
    let main = main_frame(&delegate);
    let child = delegate
        .on_did_create_frame(FrameCreation::Child { parent: main })
        .unwrap()
        .handle;
    let main_load = start(&delegate, main, "/").await;
    let child_load = start(&delegate, child, "/frame").await;
    let GateHandle { entered, release } = responder.gate_response("/");

    let (instruction, _) = tokio::join!(
        delegate.on_decide_response_policy(main_load, ok_response("/")),
        async {
            entered.await.unwrap();
            delegate
                .on_did_terminate_process(main.surface(), TerminationReason::Crash)
                .unwrap();
            release.send(()).unwrap();
        }
    );

    assert_eq!(instruction.unwrap(), LoadInstruction::Stop);
    assert!(responder.saw_cancellation());
    assert_eq!(
        responder.trace()[6..],
        ["response / 200", "did_terminate", "did_fail /", "did_fail /frame"]
    );
    let expected = NavigationState::Failed(NavigationErrorKind::ProcessTerminated(
        TerminationReason::Crash,
    ));
    assert_eq!(delegate.navigation(main_load).unwrap().state(), &expected);
    assert_eq!(delegate.navigation(child_load).unwrap().state(), &expected);
    assert!(matches!(
        responder.events()[4],
        LifecycleEvent::DidTerminate {
            reason: TerminationReason::Crash,
            ..
        }
    ));
}

#[tokio::test]
async fn closed_surface_no_longer_accepts_callbacks() {
    let delegate = delegate(&[]);
    let frame = main_frame(&delegate);
    let id = delegate
        .on_decide_action_policy(request(frame, "/"))
        .await
        .unwrap()
        .navigation;

    delegate.on_did_close_surface(frame.surface()).unwrap();

    assert!(delegate.frame(frame).is_none());
    assert!(delegate.current_navigation(frame).is_none());
    assert!(matches!(
        delegate.on_did_start(id),
        Err(SequencerError::NotCurrent(_))
    ));
    assert!(matches!(
        delegate.on_did_close_surface(frame.surface()),
        Err(SequencerError::UnknownSurface(_))
    ));
    assert!(matches!(
        delegate.on_decide_action_policy(request(frame, "/")).await,
        Err(SequencerError::UnknownFrame(_))
    ));
}

#[tokio::test]
async fn closing_a_surface_fails_its_running_loads() {
    let responder = MockResponder::new();
    let delegate = delegate(&[&responder]);
    let main = main_frame(&delegate);
    let child = delegate
        .on_did_create_frame(FrameCreation::Child { parent: main })
        .unwrap()
        .handle;
    let main_load = start(&delegate, main, "/").await;
    let child_load = load(&delegate, child, "/frame").await;

    delegate.on_did_close_surface(main.surface()).unwrap();

    let expected = NavigationState::Failed(NavigationErrorKind::HostTransportFailure(
        HostError::cancelled(),
    ));
    let closed = delegate.navigation(main_load).unwrap();
    assert_eq!(closed.state(), &expected);
    assert!(!closed.is_current());
    assert_eq!(
        delegate.navigation(child_load).unwrap().state(),
        &NavigationState::Finished
    );
    let failures = || {
        responder
            .trace()
            .into_iter()
            .filter(|entry| entry.starts_with("did_fail"))
            .collect::<Vec<_>>()
    };
    assert_eq!(failures(), vec!["did_fail /"]);

    // The engine's own report of the stop arrives afterwards and changes nothing.
    delegate.on_did_fail(main_load, HostError::cancelled()).unwrap();
    assert_eq!(delegate.navigation(main_load).unwrap().state(), &expected);
    assert_eq!(failures(), vec!["did_fail /"]);
}
