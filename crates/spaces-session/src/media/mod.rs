//! Media transport contract and the adapter that reconciles the transport
//! roster against the room aggregate.

mod adapter;
mod metadata;
mod tracks;
mod transport;

pub use adapter::{AdapterContext, AdapterEffect, MediaRoomAdapter, Reconciliation};
pub use metadata::PeerMetadata;
pub use tracks::TrackBook;
pub use transport::{
    MediaConnection, MediaJoinConfig, MediaTransport, PeerInfo, PeerLevel, TrackInfo, TrackKind,
    TransportError, TransportEvent,
};
