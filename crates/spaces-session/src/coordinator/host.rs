use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use spaces_common::Toast;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::leave::{spawn_leave, HOST_ENDED};
use crate::engine::{LocalRole, SessionContext, TaskSlot};
use crate::error::SessionError;
use crate::presence::BusMessage;
use crate::protocol::{
    events, JoinDeclinedPayload, JoinRequestPayload, ParticipantLeftPayload, RecordingPayload,
    RoomCreatedPayload, RoomEndedPayload,
};
use crate::recording::RecordingRole;
use crate::room::{Participant, ParticipantKey, ParticipantRole, Room};

// ---------------------------------------------------------------------------
// Hosting
// ---------------------------------------------------------------------------

/// Become the host of `space_id`, creating the room when it is new.
pub(crate) async fn start_space(
    ctx: &Arc<SessionContext>,
    space_id: &str,
    topic: Option<String>,
) -> Result<Room, SessionError> {
    let me = Participant::pending(&ctx.identity.profile(), ParticipantRole::Host)
        .with_location(ctx.identity.location.clone());
    let existing = ctx.store.read(|s| s.room(space_id).cloned());
    let room = match existing {
        Some(room) if !room.is_host(ctx.user_id()) => return Err(SessionError::NotHost),
        Some(room) => room.add_participant(me),
        None => Room::new(space_id, me),
    };
    let room = match topic {
        Some(topic) => room.set_topic(Some(topic)),
        None => room,
    };

    let room = ctx.store.update(|s| {
        s.upsert_room(room);
        s.set_selected_space(Some(space_id.to_string()));
        s.set_in_space(true);
        s.room(space_id).cloned()
    });
    ctx.set_role(LocalRole::Host {
        space_id: space_id.to_string(),
    });

    ctx.go_home().await?;
    let messages = ctx.gateway.subscribe(&ctx.gateway.home_channel()).await?;
    let listener = tokio::spawn(host_listener(
        Arc::downgrade(ctx),
        space_id.to_string(),
        messages,
    ));
    ctx.replace_task(TaskSlot::HostListener, listener);
    info!(space_id = %space_id, "Hosting space");
    room.ok_or_else(|| SessionError::SpaceNotFound(space_id.to_string()))
}

/// End the hosted `space_id` for everyone.
pub(crate) async fn end_space(ctx: &Arc<SessionContext>, space_id: &str) -> Result<(), SessionError> {
    if !ctx.is_host_of(space_id) {
        let hosted = ctx
            .store
            .read(|s| s.room(space_id).map(|r| r.is_host(ctx.user_id())));
        match hosted {
            None => return Err(SessionError::SpaceNotFound(space_id.to_string())),
            Some(false) => return Err(SessionError::NotHost),
            Some(true) => {}
        }
    }
    info!(space_id = %space_id, "Ending space");
    ctx.abort_task(TaskSlot::HostListener);
    ctx.cancel_admission();

    if ctx.recording.is_recording() {
        ctx.recording.stop(RecordingRole::Host).await;
    }
    ctx.recording.reset();

    let home = ctx.gateway.home_channel();
    ctx.announce(
        &home,
        events::ROOM_ENDED,
        &RoomEndedPayload {
            space_id: space_id.to_string(),
            host_id: ctx.user_id().to_string(),
        },
    )
    .await;

    let connected = ctx.adapter.lock().is_connected();
    if connected {
        if let Err(e) = ctx.transport.end_room("host ended the space").await {
            warn!(space_id = %space_id, error = %e, "Ending media room failed");
        }
    }
    ctx.teardown_media().await;

    ctx.store.update(|s| {
        s.remove_room(space_id);
        s.set_in_space(false);
    });
    ctx.set_role(LocalRole::Idle);
    ctx.go_home_logged().await;
    Ok(())
}

async fn host_listener(
    ctx: Weak<SessionContext>,
    space_id: String,
    mut messages: broadcast::Receiver<BusMessage>,
) {
    loop {
        let msg = match messages.recv().await {
            Ok(msg) => msg,
            Err(RecvError::Lagged(skipped)) => {
                warn!(space_id = %space_id, skipped, "Host listener lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(ctx) = ctx.upgrade() else {
            break;
        };
        match msg.event.as_str() {
            events::JOIN_REQUEST => {
                let Some(request) = msg.decode::<JoinRequestPayload>() else {
                    debug!("Unreadable join request");
                    continue;
                };
                if request.space_id == space_id && request.to_user_id == ctx.user_id() {
                    join_requested(&ctx, &space_id, request).await;
                }
            }
            events::PARTICIPANT_LEFT => {
                if let Some(left) = msg.decode::<ParticipantLeftPayload>() {
                    if left.space_id == space_id && left.user_id != ctx.user_id() {
                        participant_left(&ctx, &space_id, &left.user_id).await;
                    }
                }
            }
            _ => {}
        }
    }
    debug!(space_id = %space_id, "Host listener stopped");
}

/// Decline at once, or hand the request to a tracked admission task.
async fn join_requested(ctx: &Arc<SessionContext>, space_id: &str, request: JoinRequestPayload) {
    let visitor = request.from.user_id.clone();
    let taken = ctx.store.read(|s| {
        s.room(space_id)
            .map(|r| r.non_host_participants().filter(|p| p.user_id != visitor).count())
    });
    let Some(taken) = taken else {
        decline(ctx, &request, "space not found").await;
        return;
    };
    if taken >= ctx.config.join.capacity as usize {
        info!(space_id = %space_id, visitor = %visitor, "Declining, space full");
        decline(ctx, &request, "full").await;
        return;
    }
    if ctx.admitting.swap(true, Ordering::SeqCst) {
        info!(space_id = %space_id, visitor = %visitor, "Declining, admission in progress");
        decline(ctx, &request, "busy").await;
        return;
    }

    let admission = tokio::spawn(admit(Arc::clone(ctx), space_id.to_string(), request));
    ctx.replace_task(TaskSlot::Admission, admission);
}

async fn admit(ctx: Arc<SessionContext>, space_id: String, request: JoinRequestPayload) {
    let result = admit_visitor(&ctx, &space_id, &request).await;
    ctx.admitting.store(false, Ordering::SeqCst);
    if let Err(e) = result {
        warn!(
            space_id = %space_id,
            visitor = %request.from.user_id,
            error = %e,
            "Admission failed"
        );
        decline(&ctx, &request, &e.to_string()).await;
        ctx.store.toast(Toast::error(format!(
            "Couldn't let {} in.",
            request.from.display_name
        )));
    }
}

async fn admit_visitor(
    ctx: &Arc<SessionContext>,
    space_id: &str,
    request: &JoinRequestPayload,
) -> Result<(), SessionError> {
    let current = ctx
        .store
        .read(|s| s.room(space_id).and_then(|r| r.transport_room_id.clone()));
    let connected = ctx.adapter.lock().is_connected();

    let transport_room_id = match current {
        Some(id) if connected => id,
        _ => {
            let rooms = ctx.services.rooms.clone();
            let id = ctx
                .services
                .with_management_token(&ctx.store, ctx.clock.as_ref(), |token| {
                    let rooms = rooms.clone();
                    let space_id = space_id.to_string();
                    async move { rooms.create_transport_room(&space_id, &token).await }
                })
                .await?;
            ctx.recording.mark_expected_start(ctx.clock.now());
            ctx.store.update(|s| {
                s.update_room(space_id, |r| r.set_transport_room(Some(id.clone())));
            });
            ctx.connect_media(space_id, &id, ParticipantRole::Host).await?;
            id
        }
    };

    let guest = Participant::pending(&request.from, ParticipantRole::Speaker)
        .with_location(request.location.clone());
    ctx.store.update(|s| {
        s.update_room(space_id, |r| {
            r.set_transport_room(Some(transport_room_id.clone()))
                .add_participant(guest)
        });
    });

    ctx.gateway
        .publish(
            &ctx.gateway.home_channel(),
            events::ROOM_CREATED,
            &RoomCreatedPayload {
                request_id: request.request_id.clone(),
                space_id: space_id.to_string(),
                to_user_id: request.from.user_id.clone(),
                transport_room_id: transport_room_id.clone(),
            },
        )
        .await?;
    info!(
        space_id = %space_id,
        visitor = %request.from.user_id,
        room_id = %transport_room_id,
        "Visitor admitted"
    );
    Ok(())
}

async fn decline(ctx: &SessionContext, request: &JoinRequestPayload, reason: &str) {
    let home = ctx.gateway.home_channel();
    ctx.announce(
        &home,
        events::JOIN_DECLINED,
        &JoinDeclinedPayload {
            request_id: request.request_id.clone(),
            to_user_id: request.from.user_id.clone(),
            reason: reason.to_string(),
        },
    )
    .await;
}

async fn participant_left(ctx: &Arc<SessionContext>, space_id: &str, user_id: &str) {
    info!(space_id = %space_id, user_id = %user_id, "Participant left");
    ctx.store.update(|s| {
        s.update_room(space_id, |r| r.remove_participant(ParticipantKey::User(user_id)));
    });
    if ctx.recording.is_recording() {
        ctx.recording.stop(RecordingRole::Host).await;
        let home = ctx.gateway.home_channel();
        ctx.announce(
            &home,
            events::RECORDING_STOPPED,
            &RecordingPayload {
                space_id: space_id.to_string(),
                session_id: None,
                remaining_secs: 0,
            },
        )
        .await;
    }
}

// ---------------------------------------------------------------------------
// Visitor side
// ---------------------------------------------------------------------------

/// Follow the host's lifecycle messages while joined.
pub(crate) fn spawn_visitor_listener(
    ctx: &Arc<SessionContext>,
    space_id: &str,
    messages: broadcast::Receiver<BusMessage>,
) {
    let listener = tokio::spawn(visitor_listener(
        Arc::downgrade(ctx),
        space_id.to_string(),
        messages,
    ));
    ctx.replace_task(TaskSlot::VisitorListener, listener);
}

async fn visitor_listener(
    ctx: Weak<SessionContext>,
    space_id: String,
    mut messages: broadcast::Receiver<BusMessage>,
) {
    loop {
        let msg = match messages.recv().await {
            Ok(msg) => msg,
            Err(RecvError::Lagged(skipped)) => {
                warn!(space_id = %space_id, skipped, "Visitor listener lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(ctx) = ctx.upgrade() else {
            break;
        };
        match msg.event.as_str() {
            events::ROOM_ENDED => {
                if msg
                    .decode::<RoomEndedPayload>()
                    .is_some_and(|p| p.space_id == space_id)
                {
                    info!(space_id = %space_id, "Host ended the space");
                    spawn_leave(&ctx, &space_id, Some(HOST_ENDED));
                    break;
                }
            }
            events::RECORDING_STARTED => {
                if let Some(p) = msg.decode::<RecordingPayload>() {
                    if p.space_id == space_id {
                        let remaining = if p.remaining_secs == 0 {
                            ctx.config.recording.ceiling_secs
                        } else {
                            p.remaining_secs
                        };
                        ctx.recording.start_participant_timer(remaining);
                    }
                }
            }
            events::RECORDING_STOPPED => {
                if msg
                    .decode::<RecordingPayload>()
                    .is_some_and(|p| p.space_id == space_id)
                {
                    ctx.recording.stop(RecordingRole::Participant).await;
                }
            }
            _ => {}
        }
    }
    debug!(space_id = %space_id, "Visitor listener stopped");
}
