use serde::Serialize;
use spaces_common::new_correlation_id;
use tracing::{debug, info, warn};

use crate::engine::SessionContext;
use crate::protocol::{events, ParticipantLeftPayload};
use crate::store::SpaceSnapshot;

/// Phases of one visitor join, in order. `RollingBack` is entered from any
/// phase other than `Idle` and `Joined`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPhase {
    Idle,
    CapacityCheck,
    OptimisticJoin,
    PresenceNegotiation,
    AwaitingRoomId,
    MediaConnect,
    Joined,
    RollingBack,
}

impl JoinPhase {
    pub fn can_roll_back(self) -> bool {
        !matches!(self, Self::Idle | Self::Joined)
    }
}

#[derive(Debug)]
pub struct JoinAttempt {
    space_id: String,
    host_id: String,
    channel: String,
    phase: JoinPhase,
    snapshot: Option<SpaceSnapshot>,
    request_sent: bool,
    media_started: bool,
    correlation: String,
}

impl JoinAttempt {
    pub fn new(space_id: &str, host_id: &str, channel: &str) -> Self {
        Self {
            space_id: space_id.to_string(),
            host_id: host_id.to_string(),
            channel: channel.to_string(),
            phase: JoinPhase::Idle,
            snapshot: None,
            request_sent: false,
            media_started: false,
            correlation: new_correlation_id(),
        }
    }

    pub fn phase(&self) -> JoinPhase {
        self.phase
    }

    pub fn space_id(&self) -> &str {
        &self.space_id
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn correlation(&self) -> &str {
        &self.correlation
    }

    pub fn snapshot(&self) -> Option<&SpaceSnapshot> {
        self.snapshot.as_ref()
    }

    pub(crate) fn advance(&mut self, next: JoinPhase) {
        debug!(
            space_id = %self.space_id,
            correlation = %self.correlation,
            from = ?self.phase,
            to = ?next,
            "Join phase"
        );
        match next {
            JoinPhase::AwaitingRoomId => self.request_sent = true,
            JoinPhase::MediaConnect => self.media_started = true,
            _ => {}
        }
        self.phase = next;
    }

    /// Keep the first snapshot taken; later ones would capture the
    /// optimistic state itself.
    pub(crate) fn record_snapshot(&mut self, snapshot: SpaceSnapshot) {
        if self.snapshot.is_none() {
            self.snapshot = Some(snapshot);
        }
    }

    /// Undo everything this attempt did. Calling it again, or from `Idle`
    /// or `Joined`, does nothing.
    pub(crate) async fn rollback(&mut self, ctx: &SessionContext) {
        if !self.phase.can_roll_back() {
            debug!(space_id = %self.space_id, phase = ?self.phase, "Nothing to roll back");
            return;
        }
        warn!(
            space_id = %self.space_id,
            correlation = %self.correlation,
            phase = ?self.phase,
            "Rolling back join"
        );
        self.advance(JoinPhase::RollingBack);

        if let Some(snapshot) = &self.snapshot {
            ctx.store.update(|s| s.restore_space(snapshot));
        }
        if self.media_started {
            ctx.teardown_media().await;
        }
        if self.request_sent {
            ctx.announce(
                &self.channel,
                events::PARTICIPANT_LEFT,
                &ParticipantLeftPayload {
                    space_id: self.space_id.clone(),
                    user_id: ctx.user_id().to_string(),
                },
            )
            .await;
        }
        if let Err(e) = ctx.gateway.detach(&self.channel).await {
            warn!(channel = %self.channel, error = %e, "Detach during rollback failed");
        }
        ctx.go_home_logged().await;

        self.phase = JoinPhase::Idle;
        info!(space_id = %self.space_id, correlation = %self.correlation, "Join rolled back");
    }
}
