//! Real-time multi-party session engine for Spaces conversation rooms.
//!
//! Keeps a room consistent across the local optimistic store, the presence
//! bus used to negotiate joins, and the media transport that reports who is
//! actually connected. Also owns the capture-session lifecycle and active
//! speaker detection.

pub mod clock;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod identity;
pub mod loopback;
pub mod media;
pub mod presence;
pub mod protocol;
pub mod realtime;
pub mod recording;
pub mod room;
pub mod services;
pub mod speaker;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{JoinAttempt, JoinPhase};
pub use engine::{EngineBuilder, SpaceEngine};
pub use error::SessionError;
pub use identity::Identity;
pub use media::{MediaRoomAdapter, MediaTransport, TransportEvent};
pub use presence::{PresenceBus, PresenceGateway};
pub use protocol::{GeoLocation, PresenceData, PresenceRole, Profile};
pub use realtime::{RealtimeBus, RealtimeClient, RealtimeConfig};
pub use recording::{RecordingGate, RecordingManager};
pub use room::{Participant, ParticipantRole, QueueEntry, Room};
pub use services::{HttpServices, Services};
pub use speaker::{detect_active_speaker, SpeakerRole, SpeakerTracker};
pub use store::{LocalStore, StoreHandle, StoreView};
