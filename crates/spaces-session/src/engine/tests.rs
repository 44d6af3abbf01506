use std::time::Duration;

use spaces_common::{SpacesError, ToastLevel};
use spaces_config::SpacesConfig;

use super::testkit::{settle, World};
use super::*;
use crate::clock::Clock;
use crate::coordinator::HOST_ENDED;
use crate::identity::Identity;
use crate::media::PeerLevel;
use crate::recording::GateBlock;
use crate::services::ActiveSession;
use crate::speaker::SpeakerRole;

const SPACE: &str = "space-1";
const MEDIA_ROOM: &str = "space-1-room-1";

/// Host starts a space with a topic and one visitor joins it.
async fn joined_pair(world: &World) -> (SpaceEngine, SpaceEngine) {
    let host = world.engine("host");
    host.go_online().await.unwrap();
    let room = host.start_room(SPACE, Some("ideas".into())).await.unwrap();

    let visitor = world.engine("visitor");
    visitor.go_online().await.unwrap();
    visitor.upsert_room(room);
    visitor.join_room(SPACE).await.unwrap();
    settle().await;
    (host, visitor)
}

fn seats(room: &Room) -> Vec<(&str, Option<&str>)> {
    room.participants
        .iter()
        .map(|p| (p.user_id.as_str(), p.peer_id.as_deref()))
        .collect()
}

#[test]
fn builder_requires_every_collaborator() {
    let built = EngineBuilder::new(SpacesConfig::default(), Identity::new("u", "U", "u")).build();
    assert!(matches!(built, Err(SpacesError::Other(_))));
}

// -----------------------------------------------------------------------
// Join / leave
// -----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn visitor_join_converges_on_both_sides() {
    let world = World::new();
    let (host, visitor) = joined_pair(&world).await;

    let seen = visitor.view();
    assert!(seen.is_in_space);
    assert!(!seen.is_joining);
    let room = seen.current_viewing_space.unwrap();
    assert_eq!(room.transport_room_id.as_deref(), Some(MEDIA_ROOM));
    assert_eq!(
        seats(&room),
        vec![("host", Some("peer-1")), ("visitor", Some("peer-2"))]
    );

    let hosted = host.view().selected_space.unwrap();
    assert_eq!(
        seats(&hosted),
        vec![("host", Some("peer-1")), ("visitor", Some("peer-2"))]
    );
    assert_eq!(world.sfu.peers_in(MEDIA_ROOM).len(), 2);
    assert!(visitor.has_background_tasks());
}

#[tokio::test(start_paused = true)]
async fn joining_an_already_joined_space_is_a_no_op() {
    let world = World::new();
    let (_host, visitor) = joined_pair(&world).await;
    let before = visitor.view();
    visitor.join_room(SPACE).await.unwrap();
    assert_eq!(visitor.view(), before);
}

#[tokio::test(start_paused = true)]
async fn leaving_clears_media_tasks_and_recording() {
    let world = World::new();
    let (host, visitor) = joined_pair(&world).await;
    host.start_recording(SPACE).await.unwrap();
    settle().await;
    assert!(visitor.view().is_recording);

    visitor.leave_room(SPACE).await.unwrap();
    settle().await;

    let seen = visitor.view();
    assert!(!seen.is_in_space);
    assert!(seen.current_viewing_space.is_none());
    assert!(!seen.is_recording);
    assert_eq!(seen.recording_time_remaining, 420);
    assert!(!visitor.recording().has_active_timer());
    assert!(!visitor.has_background_tasks());
    assert!(!visitor.context().adapter.lock().is_connected());

    let hosted = host.view();
    assert!(!hosted.is_recording);
    assert_eq!(hosted.recording_time_remaining, 420);
    assert!(!host.recording().has_active_timer());
    assert_eq!(world.sfu.peers_in(MEDIA_ROOM).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn host_ending_sends_the_visitor_home_once() {
    let world = World::new();
    let (host, visitor) = joined_pair(&world).await;

    host.end_room(SPACE).await.unwrap();
    settle().await;

    let seen = visitor.view();
    assert!(!seen.is_in_space);
    assert!(seen.current_viewing_space.is_none());
    let notices = visitor
        .toasts()
        .into_iter()
        .filter(|(level, msg)| *level == ToastLevel::Info && msg == HOST_ENDED)
        .count();
    assert_eq!(notices, 1);
    assert!(!visitor.has_background_tasks());

    let hosted = host.view();
    assert!(hosted.rooms.is_empty());
    assert!(!hosted.is_in_space);
    assert!(!host.has_background_tasks());
    assert!(world.sfu.peers_in(MEDIA_ROOM).is_empty());
}

#[tokio::test(start_paused = true)]
async fn logout_tears_everything_down() {
    let world = World::new();
    let (host, visitor) = joined_pair(&world).await;

    host.logout().await;
    settle().await;

    let hosted = host.view();
    assert!(hosted.rooms.is_empty());
    assert!(!hosted.is_in_space);
    assert!(!host.has_background_tasks());
    assert!(host.context().gateway.foreign_channels().is_empty());
    assert!(!host.context().gateway.is_attached("spaces:host:host"));
    assert!(!visitor.view().is_in_space);
}

// -----------------------------------------------------------------------
// Recording
// -----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn recording_gate_needs_a_second_peer() {
    let world = World::new();
    let host = world.engine("host");
    host.start_room(SPACE, Some("ideas".into())).await.unwrap();

    let gate = host.recording_gate(SPACE).unwrap();
    assert!(!gate.can_start);
    assert_eq!(gate.reason, Some(GateBlock::NotEnoughPeers { have: 0, need: 2 }));

    let err = host.start_recording(SPACE).await.unwrap_err();
    assert!(matches!(err, SessionError::RecordingNotReady(_)));
    assert!(host
        .toasts()
        .iter()
        .any(|(level, _)| *level == ToastLevel::Warning));
}

#[tokio::test(start_paused = true)]
async fn recording_countdown_reaches_the_visitor() {
    let world = World::new();
    let (host, visitor) = joined_pair(&world).await;

    let gate = host.recording_gate(SPACE).unwrap();
    assert!(gate.can_start, "{gate:?}");
    let session = host.start_recording(SPACE).await.unwrap();
    assert_eq!(session, format!("{MEDIA_ROOM}-session"));
    assert_eq!(world.services.registrations().len(), 2);

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    let host_left = host.view().recording_time_remaining;
    let visitor_left = visitor.view().recording_time_remaining;
    assert!(host.view().is_recording);
    assert!(visitor.view().is_recording);
    assert!(host_left < 420 && host_left >= 415, "{host_left}");
    assert!(visitor_left < 420 && visitor_left >= 415, "{visitor_left}");

    assert!(matches!(
        visitor.start_recording(SPACE).await,
        Err(SessionError::NotHost)
    ));

    host.stop_recording(SPACE).await.unwrap();
    settle().await;
    assert!(!host.view().is_recording);
    assert!(!visitor.view().is_recording);
    assert_eq!(visitor.view().recording_time_remaining, 420);
    assert_eq!(world.services.stopped_captures().len(), 1);
    assert_eq!(world.services.records().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn ending_the_space_abandons_a_pending_recording_start() {
    let world = World::new();
    let (host, visitor) = joined_pair(&world).await;
    world.services.script_sessions(
        MEDIA_ROOM,
        vec![ActiveSession {
            session_id: "stale".into(),
            created_at: world.clock.now() - chrono::Duration::seconds(900),
        }],
    );

    let starting = {
        let host = host.clone();
        tokio::spawn(async move { host.start_recording(SPACE).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    host.end_room(SPACE).await.unwrap();

    let result = starting.await.unwrap();
    assert!(matches!(result, Err(SessionError::RecordingCancelled)));
    settle().await;

    let view = host.view();
    assert!(!view.is_recording);
    assert_eq!(view.recording_time_remaining, 420);
    assert!(!host.recording().has_active_timer());
    assert!(host.recording().capture().is_none());
    assert!(world.services.registrations().is_empty());
    assert!(!visitor.view().is_recording);
    assert!(!host
        .toasts()
        .iter()
        .any(|(level, _)| *level == ToastLevel::Warning));
}

#[tokio::test(start_paused = true)]
async fn dropped_peer_stops_the_capture() {
    let world = World::new();
    let (host, visitor) = joined_pair(&world).await;
    host.start_recording(SPACE).await.unwrap();
    settle().await;

    world.sfu.drop_peer(MEDIA_ROOM, "peer-2");
    settle().await;

    assert!(!host.view().is_recording);
    assert!(!visitor.view().is_recording);
    assert_eq!(world.services.stopped_captures().len(), 1);
}

// -----------------------------------------------------------------------
// Controls
// -----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn mute_toggles_follow_ownership() {
    let world = World::new();
    let (host, visitor) = joined_pair(&world).await;

    assert!(visitor.toggle_mute("visitor").await.unwrap());
    settle().await;
    let muted = |room: Option<Room>| room.and_then(|r| r.participant("visitor").map(|p| p.muted));
    assert_eq!(muted(visitor.view().current_viewing_space), Some(true));
    assert_eq!(muted(host.view().selected_space), Some(true));

    assert!(matches!(
        visitor.toggle_mute("host").await,
        Err(SessionError::NotHost)
    ));

    assert!(!host.toggle_mute("visitor").await.unwrap());
    settle().await;
    assert_eq!(muted(visitor.view().current_viewing_space), Some(false));
    assert!(!visitor.context().adapter.lock().local_muted());
}

#[tokio::test(start_paused = true)]
async fn topic_is_host_only() {
    let world = World::new();
    let (host, visitor) = joined_pair(&world).await;

    let room = host.set_topic(SPACE, Some("  new topic ".into())).unwrap();
    assert_eq!(room.topic.as_deref(), Some("new topic"));
    assert!(matches!(
        visitor.set_topic(SPACE, None),
        Err(SessionError::NotHost)
    ));
}

#[tokio::test(start_paused = true)]
async fn loud_host_becomes_active_speaker() {
    let world = World::new();
    let (_host, visitor) = joined_pair(&world).await;

    world.sfu.emit_levels(
        MEDIA_ROOM,
        vec![
            PeerLevel {
                peer_id: "peer-1".into(),
                level: 0.4,
            },
            PeerLevel {
                peer_id: "peer-2".into(),
                level: 0.0,
            },
        ],
    );
    settle().await;
    assert_eq!(visitor.view().active_speaker, Some(SpeakerRole::Host));
}
