// Integration tests: two clients sharing one in-memory store and loopback
// room service, driven through the public CallClient API.

mod common;

use common::{Harness, wait_for_phase};
use duet::notify::NotificationAction;
use duet::types::call::{CallStatus, CallType, RoomId};
use duet::types::events::TransitionReason;
use duet::{CallError, CallOptions, CallPhase};

#[tokio::test]
async fn test_video_call_between_two_users() {
    let harness = Harness::new();
    let u1 = harness.user("u1").await;
    let u2 = harness.user("u2").await;
    let mut incoming = u2.client.events().incoming_call.subscribe();

    // === 1. DIAL ===
    let room_id = u1
        .client
        .start_call(u2.participant(), CallOptions::video().in_room(RoomId::new("r1")))
        .await
        .unwrap();
    assert_eq!(room_id.as_str(), "r1");

    let callee_record = harness.record("u2").await.expect("callee record");
    assert_eq!(callee_record.status, CallStatus::Ringing);
    assert_eq!(callee_record.caller_id, "u1");
    assert_eq!(callee_record.room_id.as_str(), "r1");
    assert_eq!(callee_record.call_type, CallType::Video);
    let caller_record = harness.record("u1").await.expect("caller record");
    assert_eq!(caller_record.room_id, callee_record.room_id);
    assert_eq!(caller_record.call_type, callee_record.call_type);

    let call = incoming.recv().await.unwrap();
    assert_eq!(call.caller.id, "u1");
    assert_eq!(call.room_id.as_str(), "r1");
    wait_for_phase(&u2, CallPhase::IncomingRinging).await;
    assert_eq!(u1.phase().await, CallPhase::OutgoingRinging);
    assert_eq!(u1.alerts.playing(), vec!["ringback".to_string()]);
    assert_eq!(u2.alerts.playing(), vec!["ringtone".to_string()]);

    // === 2. ACCEPT ===
    u2.client.accept().await.unwrap();
    wait_for_phase(&u1, CallPhase::Active).await;
    assert_eq!(u2.phase().await, CallPhase::Active);
    for user in ["u1", "u2"] {
        let record = harness.record(user).await.unwrap();
        assert_eq!(record.status, CallStatus::Active);
        assert_eq!(record.room_id.as_str(), "r1");
        assert!(record.accepted_at.is_some());
    }
    assert_eq!(
        harness.rooms.members(&RoomId::new("r1")).await,
        vec!["u2".to_string(), "u1".to_string()]
    );
    assert!(u1.alerts.playing().is_empty());
    assert!(u2.alerts.playing().is_empty());
    assert_eq!(u1.media.camera_in_use(), 1);
    assert_eq!(u2.media.camera_in_use(), 1);

    // === 3. HANG UP ===
    u2.client.hang_up().await.unwrap();
    assert!(harness.record("u1").await.is_none());
    assert!(harness.record("u2").await.is_none());
    wait_for_phase(&u1, CallPhase::Idle).await;
    assert_eq!(u2.phase().await, CallPhase::Idle);
    assert_eq!(u1.media.live(), 0);
    assert_eq!(u2.media.live(), 0);
    assert!(harness.rooms.members(&RoomId::new("r1")).await.is_empty());
}

#[tokio::test]
async fn test_start_call_pushes_offer_to_callee() {
    let harness = Harness::new();
    let u1 = harness.user("u1").await;
    let u2 = harness.user("u2").await;

    let room_id = u1
        .client
        .start_call(u2.participant(), CallOptions::audio())
        .await
        .unwrap();
    assert!(room_id.as_str().starts_with("u1_"));

    let sent = u1.notifier.sent();
    assert_eq!(sent.len(), 1);
    let (recipient, push) = &sent[0];
    assert_eq!(recipient, "u2");
    assert_eq!(push.title, "Incoming audio call");
    assert_eq!(push.body, "User u1 is calling you");
    assert_eq!(push.data["roomID"], room_id.as_str());
    assert_eq!(push.data["callType"], "audio");
}

#[tokio::test]
async fn test_accept_with_denied_media_keeps_ringing() {
    let harness = Harness::new();
    let u1 = harness.user("u1").await;
    let u2 = harness.user("u2").await;
    u2.media.deny_permission(true);

    u1.client
        .start_call(u2.participant(), CallOptions::video())
        .await
        .unwrap();
    wait_for_phase(&u2, CallPhase::IncomingRinging).await;

    let err = u2.client.accept().await.unwrap_err();
    assert!(err.is_permission_denied(), "unexpected error: {err}");
    assert_eq!(u2.phase().await, CallPhase::IncomingRinging);
    assert_eq!(u1.phase().await, CallPhase::OutgoingRinging);
    assert!(harness.record("u1").await.unwrap().is_ringing());
    assert!(harness.record("u2").await.unwrap().is_ringing());
    assert_eq!(u2.media.acquired(), 0);

    // Granting access afterwards lets the same call go through.
    u2.media.deny_permission(false);
    u2.client.accept().await.unwrap();
    wait_for_phase(&u1, CallPhase::Active).await;
}

#[tokio::test]
async fn test_reject_twice_is_a_noop() {
    let harness = Harness::new();
    let u1 = harness.user("u1").await;
    let u2 = harness.user("u2").await;
    let mut caller_states = u1.client.events().state_changed.subscribe();

    u1.client
        .start_call(u2.participant(), CallOptions::audio())
        .await
        .unwrap();
    wait_for_phase(&u2, CallPhase::IncomingRinging).await;

    u2.client.reject().await.unwrap();
    assert!(harness.record("u1").await.is_none());
    assert!(harness.record("u2").await.is_none());
    assert_eq!(u2.phase().await, CallPhase::Idle);

    u2.client.reject().await.unwrap();
    assert_eq!(u2.phase().await, CallPhase::Idle);

    wait_for_phase(&u1, CallPhase::Idle).await;
    assert!(u1.alerts.playing().is_empty());
    let dialed = caller_states.recv().await.unwrap();
    assert_eq!(dialed.to, CallPhase::OutgoingRinging);
    let ended = caller_states.recv().await.unwrap();
    assert_eq!(ended.to, CallPhase::Idle);
    assert_eq!(ended.reason, TransitionReason::RemoteEnded);
}

#[tokio::test]
async fn test_cancel_withdraws_incoming_call() {
    let harness = Harness::new();
    let u1 = harness.user("u1").await;
    let u2 = harness.user("u2").await;

    u1.client
        .start_call(u2.participant(), CallOptions::audio())
        .await
        .unwrap();
    wait_for_phase(&u2, CallPhase::IncomingRinging).await;

    u1.client.cancel().await.unwrap();
    assert_eq!(u1.phase().await, CallPhase::Idle);
    wait_for_phase(&u2, CallPhase::Idle).await;
    assert!(u2.alerts.playing().is_empty());
    assert!(harness.record("u2").await.is_none());
}

#[tokio::test]
async fn test_caller_hang_up_releases_media_on_both_sides() {
    let harness = Harness::new();
    let u1 = harness.user("u1").await;
    let u2 = harness.user("u2").await;

    u1.client
        .start_call(u2.participant(), CallOptions::video())
        .await
        .unwrap();
    wait_for_phase(&u2, CallPhase::IncomingRinging).await;
    u2.client.accept().await.unwrap();
    wait_for_phase(&u1, CallPhase::Active).await;

    let snapshot = u1.client.snapshot().await.unwrap();
    assert!(snapshot.media_live);
    assert!(snapshot.in_room);
    assert_eq!(snapshot.peer.map(|peer| peer.id), Some("u2".to_string()));

    u1.client.hang_up().await.unwrap();
    wait_for_phase(&u2, CallPhase::Idle).await;
    assert_eq!(u1.media.live(), 0);
    assert_eq!(u1.media.camera_in_use(), 0);
    assert_eq!(u2.media.live(), 0);
    let snapshot = u1.client.snapshot().await.unwrap();
    assert!(!snapshot.media_live);
    assert!(!snapshot.in_room);
}

#[tokio::test]
async fn test_terminated_call_passes_through_ended() {
    let harness = Harness::new();
    let u1 = harness.user("u1").await;
    let u2 = harness.user("u2").await;
    let mut states = u2.client.events().state_changed.subscribe();

    u1.client
        .start_call(u2.participant(), CallOptions::audio())
        .await
        .unwrap();
    wait_for_phase(&u2, CallPhase::IncomingRinging).await;
    u2.client.accept().await.unwrap();
    u2.client.hang_up().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(change) = states.try_recv() {
        seen.push((change.from, change.to));
    }
    assert_eq!(
        seen,
        vec![
            (CallPhase::Idle, CallPhase::IncomingRinging),
            (CallPhase::IncomingRinging, CallPhase::Active),
            (CallPhase::Active, CallPhase::Ended),
            (CallPhase::Ended, CallPhase::Idle),
        ]
    );
}

#[tokio::test]
async fn test_busy_and_self_calls_are_refused() {
    let harness = Harness::new();
    let u1 = harness.user("u1").await;
    let u2 = harness.user("u2").await;
    let u3 = harness.user("u3").await;

    assert!(matches!(
        u1.client
            .start_call(u1.participant(), CallOptions::audio())
            .await,
        Err(CallError::SelfCall)
    ));

    u1.client
        .start_call(u2.participant(), CallOptions::audio())
        .await
        .unwrap();
    assert!(matches!(
        u1.client
            .start_call(u3.participant(), CallOptions::audio())
            .await,
        Err(CallError::Busy(CallPhase::OutgoingRinging))
    ));
    assert!(harness.record("u3").await.is_none());

    // A third party calling someone already in a call is not shown.
    wait_for_phase(&u2, CallPhase::IncomingRinging).await;
    u2.client.accept().await.unwrap();
    wait_for_phase(&u1, CallPhase::Active).await;
    u3.client
        .start_call(u2.participant(), CallOptions::audio())
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(u2.phase().await, CallPhase::Active);
}

#[tokio::test]
async fn test_notification_actions() {
    let harness = Harness::new();
    let u1 = harness.user("u1").await;
    let u2 = harness.user("u2").await;

    let room_id = u1
        .client
        .start_call(u2.participant(), CallOptions::audio())
        .await
        .unwrap();
    wait_for_phase(&u2, CallPhase::IncomingRinging).await;

    // Actions for some other room change nothing.
    let stale = RoomId::new("stale");
    u2.client
        .handle_notification(NotificationAction::Decline {
            room_id: stale.clone(),
        })
        .await
        .unwrap();
    assert!(matches!(
        u2.client
            .handle_notification(NotificationAction::Accept { room_id: stale })
            .await,
        Err(CallError::NoSuchCall(_))
    ));
    assert_eq!(u2.phase().await, CallPhase::IncomingRinging);

    u2.client
        .handle_notification(NotificationAction::Accept {
            room_id: room_id.clone(),
        })
        .await
        .unwrap();
    wait_for_phase(&u1, CallPhase::Active).await;

    // A second tap on the same notification is harmless.
    u2.client
        .handle_notification(NotificationAction::Accept { room_id })
        .await
        .unwrap();
    assert_eq!(u2.phase().await, CallPhase::Active);
}

#[tokio::test]
async fn test_decline_from_notification() {
    let harness = Harness::new();
    let u1 = harness.user("u1").await;
    let u2 = harness.user("u2").await;

    let room_id = u1
        .client
        .start_call(u2.participant(), CallOptions::video())
        .await
        .unwrap();
    wait_for_phase(&u2, CallPhase::IncomingRinging).await;

    u2.client
        .handle_notification(NotificationAction::Decline { room_id })
        .await
        .unwrap();
    wait_for_phase(&u1, CallPhase::Idle).await;
    assert!(harness.record("u1").await.is_none());
}
