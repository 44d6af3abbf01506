use std::time::Duration;

use spaces_common::SpacesError;

use crate::media::TransportError;
use crate::presence::BusError;
use crate::room::InvariantViolation;
use crate::services::ServiceError;

const HOST_BUSY: &str = "The host is busy right now. Try again later.";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("space {space_id} is full")]
    CapacityExceeded { space_id: String },

    #[error("presence failure: {0}")]
    PresenceFailure(#[from] BusError),

    #[error("host did not confirm within {0:?}")]
    RoomIdTimeout(Duration),

    #[error("host declined: {0}")]
    HostDeclined(String),

    #[error("media connect failed: {0}")]
    MediaConnectFailure(String),

    #[error("no fresh capture session after {attempts} attempts")]
    SessionFreshnessFailure { attempts: u32 },

    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),

    #[error("a join into {0} is already in progress")]
    JoinInProgress(String),

    #[error("space {0} not found")]
    SpaceNotFound(String),

    #[error("cannot join your own space")]
    OwnSpace,

    #[error("only the host can do that")]
    NotHost,

    #[error("not in space {0}")]
    NotInSpace(String),

    #[error("recording cannot start: {0}")]
    RecordingNotReady(String),

    #[error("recording start was abandoned because the session ended")]
    RecordingCancelled,

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    /// The single toast text shown for this failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::CapacityExceeded { .. } => "This space is full.".to_string(),
            Self::PresenceFailure(_) => "Couldn't reach the space. Check your connection.".to_string(),
            Self::RoomIdTimeout(_) | Self::HostDeclined(_) => HOST_BUSY.to_string(),
            Self::MediaConnectFailure(_) | Self::Transport(_) => {
                "Couldn't connect audio. Try again.".to_string()
            }
            Self::SessionFreshnessFailure { .. } => {
                "Recording couldn't start. Try again in a moment.".to_string()
            }
            Self::InvariantViolation(_) => "Something went wrong in this space.".to_string(),
            Self::JoinInProgress(_) => "Already joining this space.".to_string(),
            Self::SpaceNotFound(_) => "This space no longer exists.".to_string(),
            Self::OwnSpace => "You're the host of this space.".to_string(),
            Self::NotHost => "Only the host can do that.".to_string(),
            Self::NotInSpace(_) => "You're not in this space.".to_string(),
            Self::RecordingNotReady(reason) => format!("Recording can't start: {reason}."),
            Self::RecordingCancelled => "Recording was cancelled.".to_string(),
            Self::Service(_) => "The service is unavailable. Try again.".to_string(),
        }
    }

    /// Whether retrying the same intent later can succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::SpaceNotFound(_) | Self::OwnSpace | Self::NotHost | Self::InvariantViolation(_)
        )
    }

    /// Whether the failure happened after the optimistic join mutated state.
    pub fn needs_rollback(&self) -> bool {
        matches!(
            self,
            Self::PresenceFailure(_)
                | Self::RoomIdTimeout(_)
                | Self::HostDeclined(_)
                | Self::MediaConnectFailure(_)
                | Self::Service(_)
                | Self::Transport(_)
        )
    }
}

impl From<SessionError> for SpacesError {
    fn from(err: SessionError) -> Self {
        SpacesError::Session(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_busy_covers_timeout_and_decline() {
        let timeout = SessionError::RoomIdTimeout(Duration::from_secs(30));
        let declined = SessionError::HostDeclined("full".into());
        assert_eq!(timeout.user_message(), HOST_BUSY);
        assert_eq!(declined.user_message(), HOST_BUSY);
        assert!(timeout.needs_rollback());
    }

    #[test]
    fn capacity_needs_no_rollback() {
        let err = SessionError::CapacityExceeded {
            space_id: "s1".into(),
        };
        assert!(!err.needs_rollback());
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "space s1 is full");
    }

    #[test]
    fn bus_errors_convert_to_presence_failure() {
        let err: SessionError = BusError::Disconnected.into();
        assert!(matches!(err, SessionError::PresenceFailure(_)));
        assert!(err.needs_rollback());
    }

    #[test]
    fn converts_to_top_level_error() {
        let err: SpacesError = SessionError::NotHost.into();
        assert_eq!(err.to_string(), "session error: only the host can do that");
    }
}
