//! The session engine facade the UI talks to.
//!
//! [`SpaceEngine`] exposes the observable store and the user intents
//! (join, leave, start, end, mute, topic, recording, logout). It wires the
//! presence gateway, the media transport, backend services and the
//! recording manager around one shared [`SessionContext`].

mod context;
mod media_link;
#[cfg(test)]
pub(crate) mod testkit;

pub(crate) use context::{LocalRole, SessionContext, TaskSlot};

use std::sync::Arc;

use spaces_common::{Event, EventBus, SpacesError, Toast, ToastLevel};
use spaces_config::SpacesConfig;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::coordinator;
use crate::error::SessionError;
use crate::identity::Identity;
use crate::media::MediaTransport;
use crate::presence::{PresenceBus, PresenceGateway};
use crate::protocol::{events, RecordingPayload};
use crate::recording::{RecordingGate, RecordingManager, RecordingRole};
use crate::room::Room;
use crate::services::Services;
use crate::store::{StoreHandle, StoreView};

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct EngineBuilder {
    config: SpacesConfig,
    identity: Identity,
    bus: Option<Arc<dyn PresenceBus>>,
    transport: Option<Arc<dyn MediaTransport>>,
    services: Option<Services>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl EngineBuilder {
    pub fn new(config: SpacesConfig, identity: Identity) -> Self {
        Self {
            config,
            identity,
            bus: None,
            transport: None,
            services: None,
            clock: Arc::new(SystemClock),
            events: EventBus::default(),
        }
    }

    pub fn bus(mut self, bus: Arc<dyn PresenceBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn MediaTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn services(mut self, services: Services) -> Self {
        self.services = Some(services);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> Result<SpaceEngine, SpacesError> {
        let missing = |what: &str| SpacesError::Other(format!("engine needs a {what}"));
        let bus = self.bus.ok_or_else(|| missing("presence bus"))?;
        let transport = self.transport.ok_or_else(|| missing("media transport"))?;
        let services = self.services.ok_or_else(|| missing("service bundle"))?;

        let store = StoreHandle::new(self.config.recording.ceiling_secs, self.events);
        let gateway = PresenceGateway::new(bus, &self.config.presence, &self.identity.user_id);
        info!(user_id = %self.identity.user_id, "Session engine ready");
        Ok(SpaceEngine {
            ctx: Arc::new(SessionContext::new(
                self.config,
                self.identity,
                store,
                gateway,
                transport,
                services,
                self.clock,
            )),
        })
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SpaceEngine {
    ctx: Arc<SessionContext>,
}

impl SpaceEngine {
    pub fn identity(&self) -> &Identity {
        &self.ctx.identity
    }

    pub fn store(&self) -> &StoreHandle {
        &self.ctx.store
    }

    pub fn recording(&self) -> &RecordingManager {
        &self.ctx.recording
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.ctx.store.subscribe()
    }

    pub fn view(&self) -> StoreView {
        self.ctx.store.view()
    }

    pub fn toasts(&self) -> Vec<(ToastLevel, String)> {
        self.ctx.store.toasts()
    }

    /// Feed a room from the outer room list into the store.
    pub fn upsert_room(&self, room: Room) {
        self.ctx.store.update(|s| s.upsert_room(room));
    }

    /// Enter the local user's own channel so others can find them.
    pub async fn go_online(&self) -> Result<(), SessionError> {
        self.ctx.go_home().await?;
        Ok(())
    }

    pub async fn join_room(&self, space_id: &str) -> Result<(), SessionError> {
        coordinator::join_space(&self.ctx, space_id).await
    }

    pub async fn leave_room(&self, space_id: &str) -> Result<(), SessionError> {
        coordinator::leave_space(&self.ctx, space_id).await
    }

    pub async fn start_room(&self, space_id: &str, topic: Option<String>) -> Result<Room, SessionError> {
        coordinator::start_space(&self.ctx, space_id, topic).await
    }

    pub async fn end_room(&self, space_id: &str) -> Result<(), SessionError> {
        coordinator::end_space(&self.ctx, space_id).await
    }

    /// Toggle mute for `participant_id` (a user id). Muting anyone but
    /// yourself requires hosting the space.
    pub async fn toggle_mute(&self, participant_id: &str) -> Result<bool, SessionError> {
        let space_id = self
            .active_space()
            .ok_or_else(|| SessionError::NotInSpace(participant_id.to_string()))?;

        let (peer_id, muted) = if participant_id == self.ctx.user_id() {
            let adapter = self.ctx.adapter.lock();
            let peer = adapter
                .local_peer_id()
                .map(str::to_string)
                .ok_or_else(|| SessionError::NotInSpace(space_id.clone()))?;
            (peer, adapter.local_muted())
        } else {
            if !self.ctx.is_host_of(&space_id) {
                return Err(SessionError::NotHost);
            }
            let target = self.ctx.store.read(|s| {
                s.room(&space_id)
                    .and_then(|r| r.participant(participant_id))
                    .map(|p| (p.peer_id.clone(), p.muted))
            });
            match target {
                Some((Some(peer), muted)) => (peer, muted),
                _ => return Err(SessionError::NotInSpace(participant_id.to_string())),
            }
        };

        let next = !muted;
        let applied = self.ctx.transport.set_mute(&peer_id, next).await?;
        if !applied {
            debug!(peer_id = %peer_id, "Transport refused mute change");
            return Ok(muted);
        }
        if participant_id == self.ctx.user_id() {
            self.ctx.adapter.lock().set_local_muted(next);
        }
        self.ctx.store.update(|s| {
            s.update_room(&space_id, |r| r.set_mute(participant_id, next));
        });
        Ok(next)
    }

    /// Set or clear the hosted space's topic.
    pub fn set_topic(&self, space_id: &str, topic: Option<String>) -> Result<Room, SessionError> {
        if !self.ctx.is_host_of(space_id) {
            return Err(SessionError::NotHost);
        }
        self.ctx
            .store
            .update(|s| s.update_room(space_id, |r| r.set_topic(topic)))
            .ok_or_else(|| SessionError::SpaceNotFound(space_id.to_string()))
    }

    pub fn recording_gate(&self, space_id: &str) -> Option<RecordingGate> {
        let room = self.ctx.store.read(|s| s.room(space_id).cloned())?;
        let peers = self.ctx.adapter.lock().connected_peers();
        Some(self.ctx.recording.gate(&room, peers, self.ctx.is_host_of(space_id)))
    }

    /// Start capturing the hosted space and tell the visitors.
    pub async fn start_recording(&self, space_id: &str) -> Result<String, SessionError> {
        let room = self
            .ctx
            .store
            .read(|s| s.room(space_id).cloned())
            .ok_or_else(|| SessionError::SpaceNotFound(space_id.to_string()))?;
        let (peers, connected) = {
            let adapter = self.ctx.adapter.lock();
            (adapter.peer_ids_by_user(), adapter.connected_peers())
        };
        let is_host = self.ctx.is_host_of(space_id);
        let result = self
            .ctx
            .recording
            .start(&room, &peers, connected, is_host)
            .await;
        let session_id = match result {
            Ok(id) => id,
            Err(SessionError::RecordingCancelled) => return Err(SessionError::RecordingCancelled),
            Err(e) => {
                self.ctx
                    .store
                    .toast(Toast::warning(e.user_message()));
                return Err(e);
            }
        };
        let home = self.ctx.gateway.home_channel();
        self.ctx
            .announce(
                &home,
                events::RECORDING_STARTED,
                &RecordingPayload {
                    space_id: space_id.to_string(),
                    session_id: Some(session_id.clone()),
                    remaining_secs: self.ctx.config.recording.ceiling_secs,
                },
            )
            .await;
        Ok(session_id)
    }

    pub async fn stop_recording(&self, space_id: &str) -> Result<(), SessionError> {
        if !self.ctx.is_host_of(space_id) {
            return Err(SessionError::NotHost);
        }
        self.ctx.recording.stop(RecordingRole::Host).await;
        let home = self.ctx.gateway.home_channel();
        self.ctx
            .announce(
                &home,
                events::RECORDING_STOPPED,
                &RecordingPayload {
                    space_id: space_id.to_string(),
                    session_id: None,
                    remaining_secs: 0,
                },
            )
            .await;
        Ok(())
    }

    /// Tear down every connection and forget all rooms.
    pub async fn logout(&self) {
        info!(user_id = %self.ctx.user_id(), "Logging out");
        match self.ctx.role() {
            LocalRole::Host { space_id } => {
                if let Err(e) = self.end_room(&space_id).await {
                    warn!(space_id = %space_id, error = %e, "End on logout failed");
                }
            }
            LocalRole::Participant { space_id, .. } => {
                if let Err(e) = self.leave_room(&space_id).await {
                    warn!(space_id = %space_id, error = %e, "Leave on logout failed");
                }
            }
            LocalRole::Idle => {}
        }
        self.ctx.teardown_media().await;
        self.ctx.cancel_admission();
        for slot in TaskSlot::ALL {
            self.ctx.abort_task(slot);
        }
        self.ctx.recording.reset();
        self.ctx.gateway.detach_all().await;
        self.ctx.set_role(LocalRole::Idle);
        self.ctx.store.update(|s| s.clear());
    }

    /// Whether any background listener or media pump is still running.
    pub fn has_background_tasks(&self) -> bool {
        TaskSlot::ALL.into_iter().any(|slot| self.ctx.has_task(slot))
    }

    fn active_space(&self) -> Option<String> {
        match self.ctx.role() {
            LocalRole::Host { space_id } | LocalRole::Participant { space_id, .. } => Some(space_id),
            LocalRole::Idle => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }
}

#[cfg(test)]
mod tests;
