use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::services::{
    ActiveSession, CaptureRecord, CaptureRecordApi, CaptureRegistration, ManagementToken,
    RoomService, ServiceError, TokenService,
};

#[derive(Default)]
struct ServicesState {
    scripted_sessions: HashMap<String, VecDeque<ActiveSession>>,
    session_lookups: u32,
    rooms_created: u32,
    failing_tokens: u32,
    failing_rooms: u32,
    room_creation_delay: std::time::Duration,
    registrations: Vec<CaptureRegistration>,
    stopped: Vec<(String, String)>,
    records: Vec<CaptureRecord>,
}

/// Token, room and capture-record backend held in memory.
///
/// Active-session lookups return scripted responses in order, then a fresh
/// session created "now" once the script runs out.
#[derive(Clone)]
pub struct LoopbackServices {
    state: Arc<Mutex<ServicesState>>,
    clock: Arc<dyn Clock>,
}

impl LoopbackServices {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServicesState::default())),
            clock,
        }
    }

    pub fn script_sessions(&self, transport_room_id: &str, sessions: Vec<ActiveSession>) {
        self.state
            .lock()
            .scripted_sessions
            .entry(transport_room_id.to_string())
            .or_default()
            .extend(sessions);
    }

    pub fn fail_next_tokens(&self, times: u32) {
        self.state.lock().failing_tokens += times;
    }

    pub fn fail_next_room_creations(&self, times: u32) {
        self.state.lock().failing_rooms += times;
    }

    /// Make every transport room creation take `delay` before answering.
    pub fn delay_room_creations(&self, delay: std::time::Duration) {
        self.state.lock().room_creation_delay = delay;
    }

    pub fn session_lookups(&self) -> u32 {
        self.state.lock().session_lookups
    }

    pub fn registrations(&self) -> Vec<CaptureRegistration> {
        self.state.lock().registrations.clone()
    }

    pub fn stopped_captures(&self) -> Vec<(String, String)> {
        self.state.lock().stopped.clone()
    }

    pub fn records(&self) -> Vec<CaptureRecord> {
        self.state.lock().records.clone()
    }
}

#[async_trait]
impl TokenService for LoopbackServices {
    async fn auth_token(
        &self,
        room_id: &str,
        user_id: &str,
        role: &str,
    ) -> Result<String, ServiceError> {
        let mut state = self.state.lock();
        if state.failing_tokens > 0 {
            state.failing_tokens -= 1;
            return Err(ServiceError::Unavailable("injected token failure".into()));
        }
        Ok(format!("auth:{room_id}:{user_id}:{role}"))
    }

    async fn management_token(&self) -> Result<ManagementToken, ServiceError> {
        Ok(ManagementToken {
            token: "loopback-management".into(),
            expires_at: self.clock.now() + Duration::hours(1),
        })
    }
}

#[async_trait]
impl RoomService for LoopbackServices {
    async fn create_transport_room(
        &self,
        space_id: &str,
        _management_token: &str,
    ) -> Result<String, ServiceError> {
        let delay = self.state.lock().room_creation_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        if state.failing_rooms > 0 {
            state.failing_rooms -= 1;
            return Err(ServiceError::Unavailable("injected room failure".into()));
        }
        state.rooms_created += 1;
        Ok(format!("{space_id}-room-{}", state.rooms_created))
    }

    async fn active_session(
        &self,
        transport_room_id: &str,
        _management_token: &str,
    ) -> Result<ActiveSession, ServiceError> {
        let mut state = self.state.lock();
        state.session_lookups += 1;
        let scripted = state
            .scripted_sessions
            .get_mut(transport_room_id)
            .and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or_else(|| ActiveSession {
            session_id: format!("{transport_room_id}-session"),
            created_at: self.clock.now(),
        }))
    }

    async fn register_capture_participant(
        &self,
        registration: &CaptureRegistration,
        _management_token: &str,
    ) -> Result<(), ServiceError> {
        self.state.lock().registrations.push(registration.clone());
        Ok(())
    }

    async fn stop_capture(
        &self,
        transport_room_id: &str,
        session_id: &str,
        _management_token: &str,
    ) -> Result<(), ServiceError> {
        self.state
            .lock()
            .stopped
            .push((transport_room_id.to_string(), session_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl CaptureRecordApi for LoopbackServices {
    async fn create_capture_record(&self, record: &CaptureRecord) -> Result<(), ServiceError> {
        self.state.lock().records.push(record.clone());
        Ok(())
    }
}
