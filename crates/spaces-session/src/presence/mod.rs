//! Presence bus contract and the gateway that scopes it to host channels.

mod bus;
mod gateway;

pub use bus::{BusError, BusMessage, PresenceBus, PresenceMember};
pub use gateway::PresenceGateway;
