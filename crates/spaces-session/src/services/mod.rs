//! Token, room-administration and capture-record services.

mod http;

pub use http::HttpServices;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spaces_config::CaptureVisibility;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::protocol::{GeoLocation, Profile};
use crate::store::StoreHandle;

/// The capture session currently attached to a transport room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, PartialEq)]
pub struct ManagementToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for ManagementToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Maps one peer of a transport room to a capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRegistration {
    pub room_id: String,
    pub session_id: String,
    pub peer_id: String,
    pub user_id: String,
}

/// Persisted record of one participant's part in a capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub room_id: String,
    pub session_id: String,
    pub participant: Profile,
    pub duration_secs: u32,
    pub tag: String,
    pub visibility: CaptureVisibility,
    #[serde(default)]
    pub location: Option<GeoLocation>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait TokenService: Send + Sync {
    /// Auth token for joining `room_id` as `user_id` with a transport role.
    async fn auth_token(&self, room_id: &str, user_id: &str, role: &str)
        -> Result<String, ServiceError>;

    async fn management_token(&self) -> Result<ManagementToken, ServiceError>;
}

#[async_trait]
pub trait RoomService: Send + Sync {
    async fn create_transport_room(
        &self,
        space_id: &str,
        management_token: &str,
    ) -> Result<String, ServiceError>;

    async fn active_session(
        &self,
        transport_room_id: &str,
        management_token: &str,
    ) -> Result<ActiveSession, ServiceError>;

    async fn register_capture_participant(
        &self,
        registration: &CaptureRegistration,
        management_token: &str,
    ) -> Result<(), ServiceError>;

    async fn stop_capture(
        &self,
        transport_room_id: &str,
        session_id: &str,
        management_token: &str,
    ) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait CaptureRecordApi: Send + Sync {
    async fn create_capture_record(&self, record: &CaptureRecord) -> Result<(), ServiceError>;
}

/// Bundle of service collaborators injected into the engine.
#[derive(Clone)]
pub struct Services {
    pub tokens: Arc<dyn TokenService>,
    pub rooms: Arc<dyn RoomService>,
    pub records: Arc<dyn CaptureRecordApi>,
}

impl Services {
    /// Use one implementation for every contract.
    pub fn from_shared<T>(service: Arc<T>) -> Self
    where
        T: TokenService + RoomService + CaptureRecordApi + 'static,
    {
        Self {
            tokens: service.clone(),
            rooms: service.clone(),
            records: service,
        }
    }

    /// Cached management token, fetching a new one when absent or expiring.
    pub async fn management_token(
        &self,
        store: &StoreHandle,
        clock: &dyn Clock,
    ) -> Result<String, ServiceError> {
        if let Some(token) = store.read(|s| s.management_token(clock.now()).map(str::to_string)) {
            return Ok(token);
        }
        debug!("Fetching management token");
        let fresh = self.tokens.management_token().await?;
        store.update(|s| s.cache_management_token(fresh.token.clone(), fresh.expires_at));
        Ok(fresh.token)
    }

    /// Run `call` with a management token. A 401 invalidates the cached
    /// token and retries once with a fresh one.
    pub async fn with_management_token<T, F, Fut>(
        &self,
        store: &StoreHandle,
        clock: &dyn Clock,
        call: F,
    ) -> Result<T, ServiceError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let token = self.management_token(store, clock).await?;
        match call(token).await {
            Err(ServiceError::Unauthorized) => {
                warn!("Management token rejected, refreshing");
                store.update(|s| s.invalidate_management_token());
                let token = self.management_token(store, clock).await?;
                call(token).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Duration;
    use spaces_common::EventBus;

    use super::*;
    use crate::clock::ManualClock;

    struct CountingTokens {
        issued: AtomicU32,
        now: DateTime<Utc>,
    }

    #[async_trait]
    impl TokenService for CountingTokens {
        async fn auth_token(&self, _: &str, _: &str, _: &str) -> Result<String, ServiceError> {
            Ok("auth".into())
        }

        async fn management_token(&self) -> Result<ManagementToken, ServiceError> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ManagementToken {
                token: format!("mgmt-{n}"),
                expires_at: self.now + Duration::hours(1),
            })
        }
    }

    #[async_trait]
    impl RoomService for CountingTokens {
        async fn create_transport_room(&self, _: &str, _: &str) -> Result<String, ServiceError> {
            Ok("room".into())
        }

        async fn active_session(&self, _: &str, token: &str) -> Result<ActiveSession, ServiceError> {
            if token == "mgmt-1" {
                return Err(ServiceError::Unauthorized);
            }
            Ok(ActiveSession {
                session_id: "s1".into(),
                created_at: self.now,
            })
        }

        async fn register_capture_participant(
            &self,
            _: &CaptureRegistration,
            _: &str,
        ) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn stop_capture(&self, _: &str, _: &str, _: &str) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    #[async_trait]
    impl CaptureRecordApi for CountingTokens {
        async fn create_capture_record(&self, _: &CaptureRecord) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    fn fixture() -> (Services, Arc<CountingTokens>, StoreHandle, ManualClock) {
        let clock = ManualClock::default();
        let tokens = Arc::new(CountingTokens {
            issued: AtomicU32::new(0),
            now: clock.now(),
        });
        let services = Services::from_shared(tokens.clone());
        (services, tokens, StoreHandle::new(420, EventBus::new(8)), clock)
    }

    #[tokio::test]
    async fn management_token_is_cached() {
        let (services, tokens, store, clock) = fixture();
        let first = services.management_token(&store, &clock).await.unwrap();
        let second = services.management_token(&store, &clock).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(tokens.issued.load(Ordering::SeqCst), 1);

        clock.advance(Duration::hours(2));
        let third = services.management_token(&store, &clock).await.unwrap();
        assert_eq!(third, "mgmt-2");
    }

    #[tokio::test]
    async fn unauthorized_refreshes_token_once() {
        let (services, tokens, store, clock) = fixture();
        let rooms = services.rooms.clone();
        let session = services
            .with_management_token(&store, &clock, |token| {
                let rooms = rooms.clone();
                async move { rooms.active_session("room", &token).await }
            })
            .await
            .unwrap();
        assert_eq!(session.session_id, "s1");
        assert_eq!(tokens.issued.load(Ordering::SeqCst), 2);
    }
}
