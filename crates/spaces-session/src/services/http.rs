//! `reqwest` implementation of the service contracts.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use spaces_config::ServicesConfig;
use tracing::debug;

use super::{
    ActiveSession, CaptureRecord, CaptureRecordApi, CaptureRegistration, ManagementToken,
    RoomService, ServiceError, TokenService,
};

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct RoomResponse {
    id: String,
}

#[derive(Deserialize)]
struct ActiveRoomResponse {
    session: SessionBody,
}

#[derive(Deserialize)]
struct SessionBody {
    id: String,
    created_at: DateTime<Utc>,
}

/// HTTP client for the token endpoint and the management API.
pub struct HttpServices {
    http: reqwest::Client,
    token_endpoint: String,
    api_base: String,
    access_token: Option<String>,
    management_ttl_secs: i64,
}

impl HttpServices {
    pub fn new(config: &ServicesConfig, access_token: Option<String>) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(u64::from(config.request_timeout_secs)))
            .build()
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            token_endpoint: config.token_endpoint.clone(),
            api_base: config.api_base_url.trim_end_matches('/').to_string(),
            access_token,
            management_ttl_secs: i64::from(config.management_token_ttl_secs),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn user_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ServiceError> {
        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ServiceError::Unauthorized);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(response.url().path().to_string()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text = text.chars().take(200).collect::<String>();
            return Err(ServiceError::Http(format!("HTTP {status}: {text}")));
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, ServiceError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TokenService for HttpServices {
    async fn auth_token(
        &self,
        room_id: &str,
        user_id: &str,
        role: &str,
    ) -> Result<String, ServiceError> {
        debug!(room_id = %room_id, user_id = %user_id, role = %role, "Requesting auth token");
        let body = serde_json::json!({
            "room_id": room_id,
            "user_id": user_id,
            "role": role,
        });
        let request = self.user_auth(self.http.post(&self.token_endpoint).json(&body));
        let response: TokenResponse = self.json(request).await?;
        Ok(response.token)
    }

    async fn management_token(&self) -> Result<ManagementToken, ServiceError> {
        let body = serde_json::json!({ "type": "management" });
        let request = self.user_auth(self.http.post(&self.token_endpoint).json(&body));
        let response: TokenResponse = self.json(request).await?;
        let ttl = response.expires_in.unwrap_or(self.management_ttl_secs);
        Ok(ManagementToken {
            token: response.token,
            expires_at: Utc::now() + chrono::Duration::seconds(ttl),
        })
    }
}

#[async_trait]
impl RoomService for HttpServices {
    async fn create_transport_room(
        &self,
        space_id: &str,
        management_token: &str,
    ) -> Result<String, ServiceError> {
        let body = serde_json::json!({ "name": space_id });
        let request = self
            .http
            .post(self.url("rooms"))
            .bearer_auth(management_token)
            .json(&body);
        let response: RoomResponse = self.json(request).await?;
        Ok(response.id)
    }

    async fn active_session(
        &self,
        transport_room_id: &str,
        management_token: &str,
    ) -> Result<ActiveSession, ServiceError> {
        let request = self
            .http
            .get(self.url(&format!("active-rooms/{transport_room_id}")))
            .bearer_auth(management_token);
        let response: ActiveRoomResponse = self.json(request).await?;
        Ok(ActiveSession {
            session_id: response.session.id,
            created_at: response.session.created_at,
        })
    }

    async fn register_capture_participant(
        &self,
        registration: &CaptureRegistration,
        management_token: &str,
    ) -> Result<(), ServiceError> {
        let request = self
            .http
            .post(self.url(&format!(
                "capture-sessions/{}/participants",
                registration.session_id
            )))
            .bearer_auth(management_token)
            .json(registration);
        self.send(request).await.map(|_| ())
    }

    async fn stop_capture(
        &self,
        transport_room_id: &str,
        session_id: &str,
        management_token: &str,
    ) -> Result<(), ServiceError> {
        let body = serde_json::json!({ "session_id": session_id });
        let request = self
            .http
            .post(self.url(&format!("recordings/room/{transport_room_id}/stop")))
            .bearer_auth(management_token)
            .json(&body);
        self.send(request).await.map(|_| ())
    }
}

#[async_trait]
impl CaptureRecordApi for HttpServices {
    async fn create_capture_record(&self, record: &CaptureRecord) -> Result<(), ServiceError> {
        let request = self.user_auth(self.http.post(self.url("capture-records")).json(record));
        self.send(request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_join_cleanly() {
        let config = ServicesConfig {
            api_base_url: "https://api.example.com/v2/".into(),
            ..ServicesConfig::default()
        };
        let services = HttpServices::new(&config, None).unwrap();
        assert_eq!(
            services.url("/active-rooms/abc"),
            "https://api.example.com/v2/active-rooms/abc"
        );
    }

    #[test]
    fn active_room_response_parses() {
        let json = r#"{"session":{"id":"s-1","created_at":"2024-05-01T10:00:00Z"}}"#;
        let parsed: ActiveRoomResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.session.id, "s-1");
    }

    #[test]
    fn token_response_ttl_is_optional() {
        let parsed: TokenResponse = serde_json::from_str(r#"{"token":"t"}"#).unwrap();
        assert_eq!(parsed.token, "t");
        assert!(parsed.expires_in.is_none());
    }
}
