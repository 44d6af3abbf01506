use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use spaces_config::{CaptureVisibility, RecordingConfig};
use tracing::{debug, info, warn};

use super::freshness::{Freshness, FreshnessPolicy, RetryPolicy};
use super::timer::CountdownTimer;
use crate::clock::Clock;
use crate::error::SessionError;
use crate::protocol::{GeoLocation, Profile};
use crate::room::Room;
use crate::services::{
    ActiveSession, CaptureRecord, CaptureRegistration, ServiceError, Services,
};
use crate::store::StoreHandle;

/// Which side of the capture session the local user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingRole {
    Host,
    Participant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum GateBlock {
    #[error("only the host can record")]
    NotHost,
    #[error("{have} of {need} peers connected")]
    NotEnoughPeers { have: usize, need: usize },
    #[error("no topic set")]
    NoTopic,
    #[error("already recording")]
    AlreadyRecording,
}

/// Whether a capture may start right now, and how it would be published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingGate {
    pub can_start: bool,
    pub reason: Option<GateBlock>,
    pub visibility: CaptureVisibility,
}

#[derive(Debug, Clone)]
struct RegisteredParticipant {
    profile: Profile,
    location: Option<GeoLocation>,
}

/// A resolved capture session and who was registered in it.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub transport_room_id: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    registered: Vec<RegisteredParticipant>,
}

impl CaptureSession {
    pub fn registered_users(&self) -> Vec<String> {
        self.registered
            .iter()
            .map(|r| r.profile.user_id.clone())
            .collect()
    }
}

#[derive(Default)]
struct RecorderState {
    capture: Option<CaptureSession>,
    timer: Option<CountdownTimer>,
    expected_start: Option<DateTime<Utc>>,
    starting: bool,
    /// Bumped by `stop` and `reset`; a start begun under an older value
    /// must not commit.
    generation: u64,
}

struct Inner {
    config: RecordingConfig,
    store: StoreHandle,
    services: Services,
    clock: Arc<dyn Clock>,
    state: Mutex<RecorderState>,
}

/// Owns the capture session and the countdown for the local user.
#[derive(Clone)]
pub struct RecordingManager {
    inner: Arc<Inner>,
}

impl RecordingManager {
    pub fn new(
        config: RecordingConfig,
        store: StoreHandle,
        services: Services,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                services,
                clock,
                state: Mutex::new(RecorderState::default()),
            }),
        }
    }

    /// Remember when the current hosting attempt created its media room.
    pub fn mark_expected_start(&self, at: DateTime<Utc>) {
        self.inner.state.lock().expected_start = Some(at);
    }

    pub fn is_recording(&self) -> bool {
        self.inner.store.read(|s| s.is_recording())
    }

    pub fn has_active_timer(&self) -> bool {
        self.inner
            .state
            .lock()
            .timer
            .as_ref()
            .is_some_and(|t| !t.is_cancelled() && !t.is_finished())
    }

    pub fn capture(&self) -> Option<CaptureSession> {
        self.inner.state.lock().capture.clone()
    }

    pub fn gate(&self, room: &Room, connected_peers: usize, is_host: bool) -> RecordingGate {
        let need = self.inner.config.min_peers as usize;
        let reason = if !is_host {
            Some(GateBlock::NotHost)
        } else if self.is_recording() || self.inner.state.lock().starting {
            Some(GateBlock::AlreadyRecording)
        } else if connected_peers < need {
            Some(GateBlock::NotEnoughPeers {
                have: connected_peers,
                need,
            })
        } else if room.topic.is_none() {
            Some(GateBlock::NoTopic)
        } else {
            None
        };
        RecordingGate {
            can_start: reason.is_none(),
            reason,
            visibility: self.inner.config.visibility,
        }
    }

    /// Start capturing `room` as its host.
    ///
    /// Returns the existing session id when a capture is already running.
    /// `peers_by_user` maps user ids to live transport peer ids.
    pub async fn start(
        &self,
        room: &Room,
        peers_by_user: &HashMap<String, String>,
        connected_peers: usize,
        is_host: bool,
    ) -> Result<String, SessionError> {
        if !is_host {
            return Err(SessionError::NotHost);
        }
        if let Some(existing) = self.running_session() {
            debug!(session_id = %existing, "Capture already running");
            return Ok(existing);
        }
        let gate = self.gate(room, connected_peers, is_host);
        if let Some(reason) = gate.reason {
            return Err(SessionError::RecordingNotReady(reason.to_string()));
        }
        let transport_room_id = room
            .transport_room_id
            .clone()
            .ok_or_else(|| SessionError::RecordingNotReady("no media room".into()))?;

        let generation = {
            let mut state = self.inner.state.lock();
            state.starting = true;
            state.generation
        };
        let result = self
            .begin_capture(room, &transport_room_id, peers_by_user, generation)
            .await;
        {
            let mut state = self.inner.state.lock();
            if state.generation == generation {
                state.starting = false;
            }
        }
        match &result {
            Err(SessionError::RecordingCancelled) => {
                debug!(space_id = %room.id, "Recording start abandoned");
            }
            Err(e) => {
                warn!(space_id = %room.id, error = %e, "Recording start failed");
                self.inner.store.update(|s| s.set_recording(false));
            }
            Ok(_) => {}
        }
        result
    }

    fn ensure_current(&self, generation: u64) -> Result<(), SessionError> {
        if self.inner.state.lock().generation == generation {
            Ok(())
        } else {
            Err(SessionError::RecordingCancelled)
        }
    }

    fn running_session(&self) -> Option<String> {
        if !self.is_recording() {
            return None;
        }
        self.inner
            .state
            .lock()
            .capture
            .as_ref()
            .map(|c| c.session_id.clone())
    }

    async fn begin_capture(
        &self,
        room: &Room,
        transport_room_id: &str,
        peers_by_user: &HashMap<String, String>,
        generation: u64,
    ) -> Result<String, SessionError> {
        let session = self.resolve_session(transport_room_id, generation).await?;
        self.ensure_current(generation)?;
        let registered = self
            .register_participants(room, transport_room_id, &session.session_id, peers_by_user)
            .await;

        let capture = CaptureSession {
            transport_room_id: transport_room_id.to_string(),
            session_id: session.session_id.clone(),
            started_at: self.inner.clock.now(),
            registered,
        };
        let registered_count = capture.registered.len();

        let ceiling = self.inner.config.ceiling_secs;
        let previous = {
            // A reset either lands before this check or sees the committed capture.
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                debug!(session_id = %capture.session_id, "Discarding capture of an ended session");
                return Err(SessionError::RecordingCancelled);
            }
            self.inner.store.update(|s| {
                s.set_recording(true);
                s.set_recording_time_remaining(ceiling);
            });
            state.capture = Some(capture);
            state.timer.replace(self.spawn_timer(ceiling, RecordingRole::Host))
        };
        if let Some(old) = previous {
            old.cancel();
        }
        info!(
            space_id = %room.id,
            session_id = %session.session_id,
            registered = registered_count,
            "Capture started"
        );
        Ok(session.session_id)
    }

    async fn resolve_session(
        &self,
        transport_room_id: &str,
        generation: u64,
    ) -> Result<ActiveSession, SessionError> {
        let policy = FreshnessPolicy::from_config(&self.inner.config);
        let retry = RetryPolicy::from_config(&self.inner.config);
        let rooms = self.inner.services.rooms.clone();

        for attempt in 1..=retry.max_attempts {
            let lookup = self
                .inner
                .services
                .with_management_token(&self.inner.store, self.inner.clock.as_ref(), |token| {
                    let rooms = rooms.clone();
                    let room_id = transport_room_id.to_string();
                    async move { rooms.active_session(&room_id, &token).await }
                })
                .await;

            match lookup {
                Ok(session) => {
                    let expected = self.inner.state.lock().expected_start;
                    match policy.check(&session, self.inner.clock.now(), expected) {
                        Freshness::Fresh => {
                            debug!(attempt, session_id = %session.session_id, "Fresh capture session");
                            return Ok(session);
                        }
                        verdict => warn!(
                            attempt,
                            session_id = %session.session_id,
                            verdict = ?verdict,
                            "Capture session not fresh"
                        ),
                    }
                }
                Err(ServiceError::NotFound(what)) => {
                    warn!(attempt, room = %transport_room_id, missing = %what, "No active session yet");
                }
                Err(e) => return Err(e.into()),
            }

            if attempt < retry.max_attempts {
                let delay = retry.delay_for(attempt, &mut rand::thread_rng());
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying session lookup");
                tokio::time::sleep(delay).await;
                self.ensure_current(generation)?;
            }
        }

        Err(SessionError::SessionFreshnessFailure {
            attempts: retry.max_attempts,
        })
    }

    async fn register_participants(
        &self,
        room: &Room,
        transport_room_id: &str,
        session_id: &str,
        peers_by_user: &HashMap<String, String>,
    ) -> Vec<RegisteredParticipant> {
        let mut ordered: Vec<_> = room.host().into_iter().collect();
        ordered.extend(room.non_host_participants());

        let mut registered = Vec::new();
        for participant in ordered {
            let peer_id = peers_by_user
                .get(&participant.user_id)
                .cloned()
                .or_else(|| participant.peer_id.clone());
            let Some(peer_id) = peer_id else {
                warn!(user_id = %participant.user_id, "No transport peer, skipping registration");
                continue;
            };
            let registration = CaptureRegistration {
                room_id: transport_room_id.to_string(),
                session_id: session_id.to_string(),
                peer_id,
                user_id: participant.user_id.clone(),
            };
            let rooms = self.inner.services.rooms.clone();
            let outcome = self
                .inner
                .services
                .with_management_token(&self.inner.store, self.inner.clock.as_ref(), |token| {
                    let rooms = rooms.clone();
                    let registration = registration.clone();
                    async move { rooms.register_capture_participant(&registration, &token).await }
                })
                .await;
            match outcome {
                Ok(()) => registered.push(RegisteredParticipant {
                    profile: participant.profile(),
                    location: participant.location.clone(),
                }),
                Err(e) => warn!(user_id = %participant.user_id, error = %e, "Registration failed"),
            }
        }
        registered
    }

    fn spawn_timer(&self, remaining: u32, role: RecordingRole) -> CountdownTimer {
        let tick = Duration::from_millis(u64::from(self.inner.config.tick_ms.max(1)));
        let store = self.inner.store.clone();
        let manager = self.clone();
        CountdownTimer::spawn(
            remaining,
            tick,
            move |left| store.update(|s| s.set_recording_time_remaining(left)),
            async move {
                match role {
                    RecordingRole::Host => {
                        info!("Recording ceiling reached");
                        manager.stop(RecordingRole::Host).await;
                    }
                    RecordingRole::Participant => {
                        manager.inner.state.lock().timer.take();
                        manager.inner.store.update(|s| s.set_recording(false));
                    }
                }
            },
        )
    }

    /// Mirror the host's recording with a read-only countdown.
    pub fn start_participant_timer(&self, remaining: u32) {
        let remaining = remaining.min(self.inner.config.ceiling_secs);
        self.inner.store.update(|s| {
            s.set_recording(true);
            s.set_recording_time_remaining(remaining);
        });
        let timer = self.spawn_timer(remaining, RecordingRole::Participant);
        let previous = self.inner.state.lock().timer.replace(timer);
        if let Some(old) = previous {
            old.cancel();
        }
    }

    /// Stop the countdown and, as host, the capture itself.
    ///
    /// Network failures are logged; the local state always ends up not
    /// recording.
    pub async fn stop(&self, role: RecordingRole) {
        let (timer, capture) = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.starting = false;
            (state.timer.take(), state.capture.take())
        };
        if let Some(timer) = timer {
            timer.cancel();
        }

        if role == RecordingRole::Host {
            if let Some(capture) = capture {
                self.finish_capture(&capture).await;
            }
        }

        self.inner.store.update(|s| {
            s.set_recording(false);
            s.reset_recording_time();
        });
    }

    async fn finish_capture(&self, capture: &CaptureSession) {
        let rooms = self.inner.services.rooms.clone();
        let stopped = self
            .inner
            .services
            .with_management_token(&self.inner.store, self.inner.clock.as_ref(), |token| {
                let rooms = rooms.clone();
                let room_id = capture.transport_room_id.clone();
                let session_id = capture.session_id.clone();
                async move { rooms.stop_capture(&room_id, &session_id, &token).await }
            })
            .await;
        if let Err(e) = stopped {
            warn!(session_id = %capture.session_id, error = %e, "Stopping capture failed");
        }

        let elapsed = (self.inner.clock.now() - capture.started_at).num_seconds();
        let duration_secs = u32::try_from(elapsed.max(0))
            .unwrap_or(u32::MAX)
            .min(self.inner.config.ceiling_secs);
        for participant in &capture.registered {
            let record = CaptureRecord {
                room_id: capture.transport_room_id.clone(),
                session_id: capture.session_id.clone(),
                participant: participant.profile.clone(),
                duration_secs,
                tag: self.inner.config.tag.clone(),
                visibility: self.inner.config.visibility,
                location: participant.location.clone(),
            };
            if let Err(e) = self.inner.services.records.create_capture_record(&record).await {
                warn!(
                    user_id = %participant.profile.user_id,
                    error = %e,
                    "Capture record failed"
                );
            }
        }
        info!(session_id = %capture.session_id, duration_secs, "Capture stopped");
    }

    /// Drop every trace of recording without touching the network.
    pub fn reset(&self) {
        let timer = {
            let mut state = self.inner.state.lock();
            state.capture = None;
            state.expected_start = None;
            state.starting = false;
            state.generation += 1;
            state.timer.take()
        };
        if let Some(timer) = timer {
            timer.cancel();
        }
        self.inner.store.update(|s| {
            s.set_recording(false);
            s.reset_recording_time();
        });
    }
}
