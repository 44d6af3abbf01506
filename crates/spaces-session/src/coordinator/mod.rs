//! Join, leave and hosting protocols.
//!
//! A visitor's join runs as an explicit state machine ([`JoinAttempt`])
//! whose optimistic store mutation is captured in a snapshot and undone
//! on any failure after the capacity check. Hosts answer join requests on
//! their own presence channel.

mod attempt;
mod host;
mod join;
mod leave;

pub use attempt::{JoinAttempt, JoinPhase};
pub(crate) use host::{end_space, start_space};
pub(crate) use join::join_space;
pub(crate) use leave::{leave_space, spawn_leave, HOST_ENDED};

#[cfg(test)]
mod tests;
