//! Presence bus over Phoenix Channels (Supabase Realtime flavour).
//!
//! [`RealtimeClient`] owns a background WebSocket connection with
//! heartbeats, reconnect backoff, channel rejoin and presence re-track.
//! Requests carry a `ref` and resolve when the matching `phx_reply`
//! arrives. [`RealtimeBus`] layers the [`PresenceBus`](crate::presence::PresenceBus)
//! contract on top, answering `members` from a presence cache fed by
//! `presence_state` / `presence_diff`.

mod bus;
mod client;
mod connection;
mod handler;
mod types;

pub use bus::RealtimeBus;
pub use client::RealtimeClient;
pub use types::{
    BroadcastConfig, ChannelConfig, ChannelPresence, PhoenixMessage, RealtimeConfig,
    RealtimeError, RealtimeEvent,
};
