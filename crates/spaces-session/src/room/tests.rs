use super::*;
use crate::protocol::Profile;

fn profile(id: &str) -> Profile {
    Profile {
        user_id: id.into(),
        display_name: id.to_uppercase(),
        username: id.into(),
        avatar_url: None,
    }
}

fn room() -> Room {
    Room::new(
        "space-1",
        Participant::pending(&profile("host"), ParticipantRole::Host).with_peer("p1"),
    )
}

#[test]
fn new_room_contains_host() {
    let room = room();
    assert_eq!(room.host_id, "host");
    assert_eq!(room.host().map(|h| h.role), Some(ParticipantRole::Host));
    assert!(room.check_invariants().is_ok());
}

#[test]
fn add_participant_merges_by_user_id() {
    let room = room()
        .add_participant(Participant::pending(&profile("v"), ParticipantRole::Speaker))
        .add_participant(
            Participant::pending(&profile("v"), ParticipantRole::Speaker).with_peer("p2"),
        );
    assert_eq!(room.participants.len(), 2);
    assert_eq!(
        room.participant("v").and_then(|p| p.peer_id.as_deref()),
        Some("p2")
    );
    assert!(room.check_invariants().is_ok());
}

#[test]
fn merge_keeps_fields_missing_from_update() {
    let first = Participant {
        avatar_url: Some("https://cdn/v.png".into()),
        ..Participant::pending(&profile("v"), ParticipantRole::Speaker)
    };
    let mut update = Participant::pending(&profile("v"), ParticipantRole::Speaker).with_peer("p2");
    update.display_name.clear();
    let room = room().add_participant(first).add_participant(update);
    let v = room.participant("v").unwrap();
    assert_eq!(v.display_name, "V");
    assert_eq!(v.avatar_url.as_deref(), Some("https://cdn/v.png"));
}

#[test]
fn host_keeps_host_role() {
    let room = room().add_participant(
        Participant::pending(&profile("host"), ParticipantRole::Listener).with_peer("p9"),
    );
    let host = room.host().unwrap();
    assert_eq!(host.role, ParticipantRole::Host);
    assert_eq!(host.peer_id.as_deref(), Some("p9"));
}

#[test]
fn remove_by_peer_and_user() {
    let room = room()
        .add_participant(Participant::pending(&profile("a"), ParticipantRole::Speaker).with_peer("p2"))
        .add_participant(Participant::pending(&profile("b"), ParticipantRole::Speaker));

    let room = room.remove_participant(ParticipantKey::Peer("p2"));
    assert!(room.participant("a").is_none());

    let room = room.remove_participant(ParticipantKey::User("b"));
    assert_eq!(room.participants.len(), 1);
}

#[test]
fn host_is_never_removed_while_active() {
    let room = room();
    let after_peer = room.remove_participant(ParticipantKey::Peer("p1"));
    let after_user = room.remove_participant(ParticipantKey::User("host"));
    assert!(after_peer.host().is_some());
    assert!(after_user.host().is_some());

    let ended = room.ended();
    assert!(!ended.active);
    assert!(ended.participants.is_empty());
    assert!(ended.check_invariants().is_ok());
}

#[test]
fn set_mute_and_topic() {
    let room = room().set_mute("host", true).set_topic(Some("  Rust  ".into()));
    assert!(room.host().unwrap().muted);
    assert_eq!(room.topic.as_deref(), Some("Rust"));
    assert_eq!(room.host().unwrap().topic.as_deref(), Some("Rust"));

    let cleared = room.set_topic(Some("   ".into()));
    assert_eq!(cleared.topic, None);
}

#[test]
fn operations_do_not_touch_the_original() {
    let original = room();
    let _ = original.set_mute("host", true);
    assert!(!original.host().unwrap().muted);
}

#[test]
fn reconcile_queue_dedupes_and_reranks() {
    let room = room().reconcile_queue(vec![
        QueueEntry::new("c", "C", 7),
        QueueEntry::new("b", "B", 3),
        QueueEntry::new("c", "C", 9),
    ]);
    let order: Vec<(&str, u32)> = room
        .queue
        .iter()
        .map(|e| (e.user_id.as_str(), e.position))
        .collect();
    assert_eq!(order, vec![("b", 1), ("c", 2)]);
}

#[test]
fn reconcile_queue_keeps_invites_sticky() {
    let mut invited = QueueEntry::new("b", "B", 1);
    invited.invited = true;
    let room = room().reconcile_queue(vec![invited]);
    let room = room.reconcile_queue(vec![QueueEntry::new("b", "B", 4)]);
    assert!(room.queue[0].invited);
    assert_eq!(room.queue[0].position, 1);
}

#[test]
fn reconcile_queue_drops_users_on_stage() {
    let room = room()
        .add_participant(Participant::pending(&profile("a"), ParticipantRole::Speaker))
        .reconcile_queue(vec![QueueEntry::new("a", "A", 1), QueueEntry::new("b", "B", 2)]);
    assert_eq!(room.queue.len(), 1);
    assert_eq!(room.queue[0].user_id, "b");
}

#[test]
fn promotion_removes_queue_entry() {
    let room = room()
        .reconcile_queue(vec![QueueEntry::new("b", "B", 1)])
        .add_participant(Participant::pending(&profile("b"), ParticipantRole::Speaker));
    assert!(room.queue.is_empty());
}

#[test]
fn duplicate_is_detected_and_repaired() {
    let mut broken = room();
    broken
        .participants
        .push(Participant::pending(&profile("v"), ParticipantRole::Speaker));
    broken
        .participants
        .push(Participant::pending(&profile("v"), ParticipantRole::Speaker).with_peer("p2"));

    assert!(matches!(
        broken.check_invariants(),
        Err(InvariantViolation::DuplicateParticipant { ref user_id, .. }) if user_id == "v"
    ));

    let fixed = broken.repaired(None);
    assert!(fixed.check_invariants().is_ok());
    assert_eq!(
        fixed.participant("v").and_then(|p| p.peer_id.as_deref()),
        Some("p2")
    );
}

#[test]
fn missing_host_is_restored_from_previous() {
    let previous = room();
    let mut broken = previous.clone();
    broken.participants.clear();
    assert!(matches!(
        broken.check_invariants(),
        Err(InvariantViolation::MissingHost { .. })
    ));

    let fixed = broken.repaired(Some(&previous));
    assert_eq!(fixed.host(), previous.host());

    let placeholder = broken.repaired(None);
    assert_eq!(placeholder.host().map(|h| h.role), Some(ParticipantRole::Host));
}

#[test]
fn role_parse_is_lenient() {
    assert_eq!(ParticipantRole::parse_lenient("Speaker"), ParticipantRole::Speaker);
    assert_eq!(ParticipantRole::parse_lenient(" moderator "), ParticipantRole::Moderator);
    assert_eq!(ParticipantRole::parse_lenient("???"), ParticipantRole::Listener);
    assert!(!ParticipantRole::Listener.is_on_stage());
}
