use std::sync::Arc;
use std::time::Duration;

use spaces_common::{RequestId, Toast};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::attempt::{JoinAttempt, JoinPhase};
use super::host::spawn_visitor_listener;
use crate::engine::{LocalRole, SessionContext};
use crate::error::SessionError;
use crate::presence::{BusError, BusMessage};
use crate::protocol::{
    events, JoinDeclinedPayload, JoinRequestPayload, PresenceData, PresenceRole,
    RoomCreatedPayload, RoomEndedPayload,
};
use crate::room::{Participant, ParticipantRole};

/// Join `space_id` as a visitor.
///
/// Failures after the capacity check roll the attempt back before the
/// error is returned; every failure leaves a toast behind.
pub(crate) async fn join_space(ctx: &Arc<SessionContext>, space_id: &str) -> Result<(), SessionError> {
    let result = try_join(ctx, space_id).await;
    if let Err(e) = &result {
        warn!(space_id = %space_id, error = %e, "Join failed");
        ctx.store.toast(Toast::error(e.user_message()));
    }
    result
}

async fn try_join(ctx: &Arc<SessionContext>, space_id: &str) -> Result<(), SessionError> {
    let room = ctx
        .store
        .read(|s| s.room(space_id).cloned())
        .ok_or_else(|| SessionError::SpaceNotFound(space_id.to_string()))?;
    if room.host_id == ctx.user_id() {
        return Err(SessionError::OwnSpace);
    }
    if matches!(ctx.role(), LocalRole::Participant { space_id: ref s, .. } if s == space_id) {
        debug!(space_id = %space_id, "Already in space");
        return Ok(());
    }

    let _guard = ctx
        .store
        .try_begin_join(space_id)
        .ok_or_else(|| SessionError::JoinInProgress(space_id.to_string()))?;

    let channel = ctx.gateway.channel_for(&room.host_id);
    let mut attempt = JoinAttempt::new(space_id, &room.host_id, &channel);
    info!(
        space_id = %space_id,
        host_id = %room.host_id,
        correlation = %attempt.correlation(),
        "Joining space"
    );

    match run(ctx, &mut attempt).await {
        Ok(()) => {
            attempt.advance(JoinPhase::Joined);
            info!(space_id = %space_id, correlation = %attempt.correlation(), "Joined space");
            Ok(())
        }
        Err(e) => {
            if e.needs_rollback() || attempt.snapshot().is_some() {
                attempt.rollback(ctx).await;
            }
            Err(e)
        }
    }
}

async fn run(ctx: &Arc<SessionContext>, attempt: &mut JoinAttempt) -> Result<(), SessionError> {
    let space_id = attempt.space_id().to_string();
    let host_id = attempt.host_id().to_string();
    let channel = attempt.channel().to_string();
    let profile = ctx.identity.profile();
    let location = ctx.identity.location.clone();

    attempt.advance(JoinPhase::CapacityCheck);
    let members = ctx.gateway.peek_members(&channel).await?;
    let taken = ctx.gateway.count_role(&members, PresenceRole::Participant);
    let capacity = ctx.config.join.capacity as usize;
    if taken >= capacity {
        info!(space_id = %space_id, taken, capacity, "Space is full");
        return Err(SessionError::CapacityExceeded { space_id });
    }

    attempt.advance(JoinPhase::OptimisticJoin);
    let me = Participant::pending(&profile, ParticipantRole::Speaker).with_location(location.clone());
    let inserted = ctx.store.update(|s| {
        attempt.record_snapshot(s.snapshot_space(&space_id));
        let room = s.update_room(&space_id, |r| r.add_participant(me))?;
        s.set_current_viewing_space(Some(space_id.clone()));
        Some(room)
    });
    if inserted.is_none() {
        return Err(SessionError::SpaceNotFound(space_id));
    }

    attempt.advance(JoinPhase::PresenceNegotiation);
    if let Err(e) = ctx.gateway.leave_home().await {
        warn!(error = %e, "Leaving home channel failed");
    }
    ctx.gateway
        .enter(&channel, &PresenceData::participant(profile.clone(), location.clone(), &space_id))
        .await?;
    let mut messages = ctx.gateway.subscribe(&channel).await?;
    let request_id = RequestId::new();
    ctx.gateway
        .publish(
            &channel,
            events::JOIN_REQUEST,
            &JoinRequestPayload {
                request_id: request_id.clone(),
                space_id: space_id.clone(),
                to_user_id: host_id.clone(),
                from: profile,
                location,
            },
        )
        .await?;

    attempt.advance(JoinPhase::AwaitingRoomId);
    let wait = Duration::from_secs(u64::from(ctx.config.join.room_id_timeout_secs));
    let transport_room_id = tokio::time::timeout(
        wait,
        await_room_id(&mut messages, &space_id, &request_id, ctx.user_id()),
    )
    .await
    .map_err(|_| SessionError::RoomIdTimeout(wait))??;
    ctx.store.update(|s| {
        s.update_room(&space_id, |r| r.set_transport_room(Some(transport_room_id.clone())));
    });

    attempt.advance(JoinPhase::MediaConnect);
    ctx.connect_media(&space_id, &transport_room_id, ParticipantRole::Speaker)
        .await?;

    ctx.set_role(LocalRole::Participant {
        space_id: space_id.clone(),
        host_id: host_id.clone(),
        channel: channel.clone(),
    });
    spawn_visitor_listener(ctx, &space_id, messages);
    ctx.store.update(|s| s.set_in_space(true));
    Ok(())
}

/// Wait for the host's answer to `request_id`.
async fn await_room_id(
    messages: &mut broadcast::Receiver<BusMessage>,
    space_id: &str,
    request_id: &RequestId,
    me: &str,
) -> Result<String, SessionError> {
    loop {
        let msg = match messages.recv().await {
            Ok(msg) => msg,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Missed presence messages while waiting for host");
                continue;
            }
            Err(RecvError::Closed) => return Err(BusError::Disconnected.into()),
        };
        match msg.event.as_str() {
            events::ROOM_CREATED => {
                if let Some(p) = msg.decode::<RoomCreatedPayload>() {
                    if p.to_user_id == me && &p.request_id == request_id {
                        debug!(room_id = %p.transport_room_id, "Host created media room");
                        return Ok(p.transport_room_id);
                    }
                }
            }
            events::JOIN_DECLINED => {
                if let Some(p) = msg.decode::<JoinDeclinedPayload>() {
                    if p.to_user_id == me && &p.request_id == request_id {
                        return Err(SessionError::HostDeclined(p.reason));
                    }
                }
            }
            events::ROOM_ENDED => {
                if let Some(p) = msg.decode::<RoomEndedPayload>() {
                    if p.space_id == space_id {
                        return Err(SessionError::HostDeclined("space ended".into()));
                    }
                }
            }
            _ => {}
        }
    }
}
