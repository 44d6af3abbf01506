use std::sync::Arc;

use spaces_common::Toast;
use tracing::{debug, info, warn};

use crate::engine::{LocalRole, SessionContext, TaskSlot};
use crate::error::SessionError;
use crate::protocol::{events, ParticipantLeftPayload};
use crate::room::ParticipantKey;

pub(crate) const HOST_ENDED: &str = "The host ended this space.";

/// Leave `space_id` as a visitor.
///
/// A space that is only being viewed (no completed join) is cleared locally.
pub(crate) async fn leave_space(ctx: &Arc<SessionContext>, space_id: &str) -> Result<(), SessionError> {
    let channel = match ctx.take_participant(space_id) {
        Some(channel) => Some(channel),
        None => {
            let viewing = ctx.store.read(|s| s.current_viewing_space_id() == Some(space_id));
            if ctx.role() != LocalRole::Idle || !viewing {
                return Err(SessionError::NotInSpace(space_id.to_string()));
            }
            None
        }
    };
    finish_leave(ctx, space_id, channel).await;
    Ok(())
}

/// Run the leave protocol on its own task, optionally telling the user why.
///
/// Used from tasks that the leave itself tears down. The role is claimed
/// before spawning, so concurrent triggers for one space leave once.
pub(crate) fn spawn_leave(ctx: &Arc<SessionContext>, space_id: &str, notice: Option<&'static str>) {
    let Some(channel) = ctx.take_participant(space_id) else {
        debug!(space_id = %space_id, "Leave already under way");
        return;
    };
    let ctx = Arc::clone(ctx);
    let space_id = space_id.to_string();
    tokio::spawn(async move {
        finish_leave(&ctx, &space_id, Some(channel)).await;
        if let Some(message) = notice {
            ctx.store.toast(Toast::info(message));
        }
    });
}

async fn finish_leave(ctx: &Arc<SessionContext>, space_id: &str, channel: Option<String>) {
    info!(space_id = %space_id, "Leaving space");

    if let Some(channel) = &channel {
        ctx.announce(
            channel,
            events::PARTICIPANT_LEFT,
            &ParticipantLeftPayload {
                space_id: space_id.to_string(),
                user_id: ctx.user_id().to_string(),
            },
        )
        .await;
        if let Err(e) = ctx.gateway.leave(channel).await {
            warn!(channel = %channel, error = %e, "Presence leave failed");
        }
    }

    let me = ctx.user_id().to_string();
    ctx.store.update(|s| {
        s.update_room(space_id, |r| r.remove_participant(ParticipantKey::User(&me)));
        s.set_in_space(false);
        s.set_current_viewing_space(None);
    });

    ctx.teardown_media().await;
    ctx.abort_task(TaskSlot::VisitorListener);
    if let Some(channel) = &channel {
        if let Err(e) = ctx.gateway.detach(channel).await {
            warn!(channel = %channel, error = %e, "Detach failed");
        }
    }
    ctx.go_home_logged().await;
    ctx.recording.reset();
    info!(space_id = %space_id, "Left space");
}
