//! Connecting the local user to a media room and feeding transport events
//! through the adapter into the store.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::context::{SessionContext, TaskSlot};
use crate::coordinator;
use crate::error::SessionError;
use crate::media::{
    AdapterContext, AdapterEffect, MediaConnection, MediaJoinConfig, PeerMetadata, TransportEvent,
};
use crate::protocol::{events, RecordingPayload};
use crate::recording::RecordingRole;
use crate::room::ParticipantRole;

impl SessionContext {
    /// Join `transport_room_id` for `space_id` as `role`, replacing any live
    /// connection.
    pub(crate) async fn connect_media(
        self: &Arc<Self>,
        space_id: &str,
        transport_room_id: &str,
        role: ParticipantRole,
    ) -> Result<(), SessionError> {
        self.teardown_media().await;

        let topic = self
            .store
            .read(|s| s.room(space_id).and_then(|r| r.topic.clone()));
        let metadata = PeerMetadata::from_identity(&self.identity, role, topic);
        let auth_token = self
            .services
            .tokens
            .auth_token(transport_room_id, self.user_id(), role.as_str())
            .await
            .map_err(|e| SessionError::MediaConnectFailure(format!("auth token: {e}")))?;

        let MediaConnection {
            local_peer,
            roster,
            events,
        } = self
            .transport
            .join(MediaJoinConfig {
                room_id: transport_room_id.to_string(),
                auth_token,
                user_name: self.identity.display_name.clone(),
                role: role.as_str().to_string(),
                metadata: metadata.encode(),
                start_muted: false,
            })
            .await
            .map_err(|e| SessionError::MediaConnectFailure(e.to_string()))?;

        info!(
            space_id = %space_id,
            room_id = %transport_room_id,
            peer_id = %local_peer.peer_id,
            peers = roster.len(),
            "Media connected"
        );

        self.store.update(|s| {
            let mut adapter = self.adapter.lock();
            adapter.connected(local_peer, roster, false);
            if let Some(room) = s.room(space_id).cloned() {
                let next = adapter.reconcile(&room);
                s.upsert_room(next);
            }
        });

        let pump = tokio::spawn(pump_events(
            Arc::downgrade(self),
            space_id.to_string(),
            events,
        ));
        self.replace_task(TaskSlot::MediaPump, pump);
        Ok(())
    }

    /// Leave the media room, if connected, and forget its roster.
    pub(crate) async fn teardown_media(&self) {
        self.abort_task(TaskSlot::MediaPump);
        let was_connected = {
            let mut adapter = self.adapter.lock();
            let connected = adapter.is_connected();
            adapter.reset();
            connected
        };
        if was_connected {
            if let Err(e) = self.transport.leave().await {
                warn!(error = %e, "Media leave failed");
            }
            debug!("Media torn down");
        }
        self.store.update(|s| s.set_active_speaker(None));
    }

    async fn on_transport_event(self: &Arc<Self>, space_id: &str, event: TransportEvent) {
        let ctx = AdapterContext {
            recording_active: self.store.read(|s| s.is_recording()),
            local_is_host: self.is_host_of(space_id),
        };
        let effects = self.store.update(|s| {
            let room = s.room(space_id).cloned()?;
            let outcome = self.adapter.lock().apply(&room, &event, ctx);
            if let Some(next) = outcome.room {
                s.upsert_room(next);
            }
            Some(outcome.effects)
        });
        let Some(effects) = effects else {
            debug!(space_id = %space_id, "Transport event for unknown space");
            return;
        };

        for effect in effects {
            match effect {
                AdapterEffect::StopRecording => {
                    self.recording.stop(RecordingRole::Host).await;
                    let channel = self.gateway.home_channel();
                    self.announce(
                        &channel,
                        events::RECORDING_STOPPED,
                        &RecordingPayload {
                            space_id: space_id.to_string(),
                            session_id: None,
                            remaining_secs: 0,
                        },
                    )
                    .await;
                }
                AdapterEffect::ActiveSpeaker(speaker) => {
                    self.store.update(|s| s.set_active_speaker(speaker));
                }
                AdapterEffect::LocalMuteCorrected(muted) => {
                    debug!(muted, "Local mute follows transport");
                }
                AdapterEffect::RoomEnded(reason) => {
                    info!(space_id = %space_id, reason = %reason, "Media room ended");
                    if !self.is_host_of(space_id) {
                        coordinator::spawn_leave(self, space_id, Some(coordinator::HOST_ENDED));
                    }
                }
            }
        }
    }
}

async fn pump_events(
    ctx: Weak<SessionContext>,
    space_id: String,
    mut events: mpsc::Receiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(ctx) = ctx.upgrade() else {
            break;
        };
        ctx.on_transport_event(&space_id, event).await;
    }
    debug!(space_id = %space_id, "Media event stream closed");
}
