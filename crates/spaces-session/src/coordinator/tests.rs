use std::sync::atomic::Ordering;
use std::time::Duration;

use spaces_common::ToastLevel;

use super::*;
use crate::engine::testkit::{profile, settle, World};
use crate::error::SessionError;
use crate::loopback::LoopbackSfu;
use crate::presence::PresenceBus;
use crate::protocol::{events, PresenceData};
use crate::room::{Participant, ParticipantRole, Room};

const SPACE: &str = "space-1";
const HOST_CHANNEL: &str = "spaces:host:host";

fn listed_room() -> Room {
    Room::new(SPACE, Participant::pending(&profile("host"), ParticipantRole::Host))
        .set_topic(Some("ideas".into()))
}

fn user_ids(room: &Room) -> Vec<&str> {
    room.participants.iter().map(|p| p.user_id.as_str()).collect()
}

// -----------------------------------------------------------------------
// Rollback
// -----------------------------------------------------------------------

#[tokio::test]
async fn rollback_twice_leaves_the_same_view() {
    let world = World::new();
    let visitor = world.engine("visitor");
    visitor.upsert_room(listed_room());
    let before = visitor.view();
    let ctx = visitor.context();

    let mut attempt = JoinAttempt::new(SPACE, "host", HOST_CHANNEL);
    attempt.advance(JoinPhase::CapacityCheck);
    attempt.advance(JoinPhase::OptimisticJoin);
    let me = Participant::pending(&profile("visitor"), ParticipantRole::Speaker);
    ctx.store.update(|s| {
        attempt.record_snapshot(s.snapshot_space(SPACE));
        s.update_room(SPACE, |r| r.add_participant(me));
        s.set_current_viewing_space(Some(SPACE.into()));
    });
    assert_ne!(visitor.view(), before);

    attempt.rollback(ctx).await;
    let first = visitor.view();
    assert_eq!(attempt.phase(), JoinPhase::Idle);

    attempt.rollback(ctx).await;
    assert_eq!(visitor.view(), first);
    assert_eq!(first, before);
}

/// Drive a join by hand up to `phase`, roll it back twice and return how
/// many `participant_left` announcements reached the host channel.
async fn roll_back_twice_from(world: &World, phase: JoinPhase) -> usize {
    let observer = world.bus.client("observer");
    observer.attach(HOST_CHANNEL).await.unwrap();
    let mut heard = observer.subscribe(HOST_CHANNEL).await.unwrap();

    let visitor = world.engine("visitor");
    visitor.go_online().await.unwrap();
    visitor.upsert_room(listed_room());
    let before = visitor.view();
    let ctx = visitor.context();

    let mut attempt = JoinAttempt::new(SPACE, "host", HOST_CHANNEL);
    attempt.advance(JoinPhase::CapacityCheck);
    attempt.advance(JoinPhase::OptimisticJoin);
    let me = Participant::pending(&profile("visitor"), ParticipantRole::Speaker);
    ctx.store.update(|s| {
        attempt.record_snapshot(s.snapshot_space(SPACE));
        s.update_room(SPACE, |r| r.add_participant(me));
        s.set_current_viewing_space(Some(SPACE.into()));
    });
    attempt.advance(JoinPhase::PresenceNegotiation);
    ctx.gateway.attach(HOST_CHANNEL).await.unwrap();
    attempt.advance(JoinPhase::AwaitingRoomId);
    if phase == JoinPhase::MediaConnect {
        attempt.advance(JoinPhase::MediaConnect);
        ctx.connect_media(SPACE, "manual-room", ParticipantRole::Speaker)
            .await
            .unwrap();
        assert!(ctx.adapter.lock().is_connected());
    }

    attempt.rollback(ctx).await;
    let first = visitor.view();
    attempt.rollback(ctx).await;
    settle().await;

    assert_eq!(visitor.view(), first);
    assert_eq!(first, before);
    assert!(ctx.gateway.foreign_channels().is_empty());
    assert!(!ctx.adapter.lock().is_connected());

    let mut left = 0;
    while let Ok(msg) = heard.try_recv() {
        if msg.event == events::PARTICIPANT_LEFT {
            left += 1;
        }
    }
    left
}

#[tokio::test(start_paused = true)]
async fn rollback_twice_while_awaiting_room_id_announces_once() {
    let world = World::new();
    assert_eq!(roll_back_twice_from(&world, JoinPhase::AwaitingRoomId).await, 1);
    assert_eq!(world.sfu.leave_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn rollback_twice_during_media_connect_tears_down_once() {
    let world = World::new();
    assert_eq!(roll_back_twice_from(&world, JoinPhase::MediaConnect).await, 1);
    assert_eq!(world.sfu.leave_count(), 1);
    assert!(world.sfu.peers_in("manual-room").is_empty());
}

#[test]
fn snapshot_is_taken_once() {
    let mut attempt = JoinAttempt::new(SPACE, "host", HOST_CHANNEL);
    let mut store = crate::store::LocalStore::new(420);
    store.upsert_room(listed_room());
    attempt.record_snapshot(store.snapshot_space(SPACE));
    store.remove_room(SPACE);
    attempt.record_snapshot(store.snapshot_space(SPACE));
    assert!(attempt.snapshot().and_then(|s| s.room.as_ref()).is_some());
}

#[test]
fn only_active_phases_roll_back() {
    assert!(!JoinPhase::Idle.can_roll_back());
    assert!(!JoinPhase::Joined.can_roll_back());
    assert!(JoinPhase::CapacityCheck.can_roll_back());
    assert!(JoinPhase::AwaitingRoomId.can_roll_back());
    assert!(JoinPhase::MediaConnect.can_roll_back());
}

// -----------------------------------------------------------------------
// Join failures
// -----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn full_space_is_refused_without_touching_state() {
    let world = World::new();
    let visitor = world.engine("visitor");
    visitor.upsert_room(listed_room());
    world.bus.seed_member(
        HOST_CHANNEL,
        "someone",
        serde_json::to_value(PresenceData::participant(profile("someone"), None, SPACE)).unwrap(),
    );
    let before = visitor.view();

    let err = visitor.join_room(SPACE).await.unwrap_err();
    assert!(matches!(err, SessionError::CapacityExceeded { .. }));

    assert_eq!(visitor.view(), before);
    assert!(!visitor.context().gateway.is_attached(HOST_CHANNEL));
    assert_eq!(
        visitor.toasts(),
        vec![(ToastLevel::Error, "This space is full.".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn silent_host_times_out_and_rolls_back() {
    let world = World::new();
    let visitor = world.engine("visitor");
    visitor.go_online().await.unwrap();
    visitor.upsert_room(listed_room());
    let before = visitor.view();

    let err = visitor.join_room(SPACE).await.unwrap_err();
    assert!(matches!(err, SessionError::RoomIdTimeout(_)));

    let after = visitor.view();
    assert_eq!(after, before);
    assert!(!after.is_joining);
    assert!(!after.is_in_space);
    assert_eq!(
        visitor.toasts(),
        vec![(ToastLevel::Error, err.user_message())]
    );

    let gateway = &visitor.context().gateway;
    assert!(gateway.foreign_channels().is_empty());
    assert!(gateway.is_entered(&gateway.home_channel()));
    assert!(world.bus.members_of(HOST_CHANNEL).is_empty());
}

#[tokio::test(start_paused = true)]
async fn media_failure_rolls_back_on_both_sides() {
    let world = World::new();
    let host = world.engine("host");
    let room = host.start_room(SPACE, Some("ideas".into())).await.unwrap();

    let broken = LoopbackSfu::new();
    broken.fail_next_join(1);
    let visitor = world.engine_on("visitor", broken.transport());
    visitor.upsert_room(room);
    let before = visitor.view();

    let err = visitor.join_room(SPACE).await.unwrap_err();
    assert!(matches!(err, SessionError::MediaConnectFailure(_)));
    settle().await;

    assert_eq!(visitor.view(), before);
    assert!(!visitor.context().adapter.lock().is_connected());
    let hosted = host.view().selected_space.unwrap();
    assert_eq!(user_ids(&hosted), vec!["host"]);
}

#[tokio::test(start_paused = true)]
async fn presence_failure_rolls_back() {
    let world = World::new();
    let visitor = world.engine("visitor");
    visitor.upsert_room(listed_room());
    let before = visitor.view();
    world.bus.fail_next(crate::loopback::BusOp::Enter, 1);

    let err = visitor.join_room(SPACE).await.unwrap_err();
    assert!(matches!(err, SessionError::PresenceFailure(_)));
    assert_eq!(visitor.view(), before);
}

#[tokio::test]
async fn second_join_while_joining_is_rejected() {
    let world = World::new();
    let visitor = world.engine("visitor");
    visitor.upsert_room(listed_room());

    let guard = visitor.store().try_begin_join(SPACE).unwrap();
    let err = visitor.join_room(SPACE).await.unwrap_err();
    assert!(matches!(err, SessionError::JoinInProgress(_)));
    assert!(visitor.view().is_joining);
    drop(guard);
    assert!(!visitor.view().is_joining);
}

#[tokio::test]
async fn own_and_unknown_spaces_are_refused() {
    let world = World::new();
    let host = world.engine("host");
    host.upsert_room(listed_room());

    assert!(matches!(host.join_room(SPACE).await, Err(SessionError::OwnSpace)));
    assert!(matches!(
        host.join_room("nowhere").await,
        Err(SessionError::SpaceNotFound(_))
    ));
}

// -----------------------------------------------------------------------
// Hosting
// -----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn second_visitor_finds_the_space_full() {
    let world = World::new();
    let host = world.engine("host");
    let room = host.start_room(SPACE, None).await.unwrap();

    let first = world.engine("first");
    first.upsert_room(room.clone());
    first.join_room(SPACE).await.unwrap();

    let second = world.engine("second");
    second.upsert_room(room);
    let err = second.join_room(SPACE).await.unwrap_err();
    assert!(matches!(err, SessionError::CapacityExceeded { .. }));
    settle().await;

    let hosted = host.view().selected_space.unwrap();
    assert_eq!(user_ids(&hosted), vec!["host", "first"]);
}

#[tokio::test(start_paused = true)]
async fn host_declines_when_room_creation_fails() {
    let world = World::new();
    let host = world.engine("host");
    let room = host.start_room(SPACE, None).await.unwrap();
    world.services.fail_next_room_creations(1);

    let visitor = world.engine("visitor");
    visitor.upsert_room(room);
    let err = visitor.join_room(SPACE).await.unwrap_err();
    assert!(matches!(err, SessionError::HostDeclined(_)));
    settle().await;

    assert!(host
        .toasts()
        .iter()
        .any(|(level, msg)| *level == ToastLevel::Error && msg.contains("visitor")));
    assert!(!host.context().admitting.load(Ordering::SeqCst));
    assert!(!visitor.view().is_in_space);
}

#[tokio::test(start_paused = true)]
async fn ending_the_space_cancels_a_pending_admission() {
    let world = World::new();
    let host = world.engine("host");
    let room = host.start_room(SPACE, None).await.unwrap();
    world.services.delay_room_creations(Duration::from_secs(5));

    let visitor = world.engine("visitor");
    visitor.go_online().await.unwrap();
    visitor.upsert_room(room);
    let joining = {
        let visitor = visitor.clone();
        tokio::spawn(async move { visitor.join_room(SPACE).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(host.context().admitting.load(Ordering::SeqCst));

    host.end_room(SPACE).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(!host.context().admitting.load(Ordering::SeqCst));
    assert!(!host.has_background_tasks());
    assert!(!host.context().adapter.lock().is_connected());
    assert!(world.sfu.peers_in(&format!("{SPACE}-room-1")).is_empty());

    assert!(joining.await.unwrap().is_err());
    assert!(!visitor.view().is_in_space);
}

#[tokio::test(start_paused = true)]
async fn visitor_leaving_frees_the_seat() {
    let world = World::new();
    let host = world.engine("host");
    let room = host.start_room(SPACE, None).await.unwrap();
    let visitor = world.engine("visitor");
    visitor.upsert_room(room);
    visitor.join_room(SPACE).await.unwrap();
    settle().await;

    visitor.leave_room(SPACE).await.unwrap();
    settle().await;

    let hosted = host.view().selected_space.unwrap();
    assert_eq!(user_ids(&hosted), vec!["host"]);
    assert!(world.bus.members_of(HOST_CHANNEL).iter().all(|m| m.client_id != "visitor"));
    assert!(matches!(
        visitor.leave_room(SPACE).await,
        Err(SessionError::NotInSpace(_))
    ));
}

#[tokio::test]
async fn start_space_refuses_someone_elses_room() {
    let world = World::new();
    let other = world.engine("other");
    other.upsert_room(listed_room());
    assert!(matches!(
        other.start_room(SPACE, None).await,
        Err(SessionError::NotHost)
    ));
    assert!(matches!(other.end_room(SPACE).await, Err(SessionError::NotHost)));
}
