//! In-memory room aggregate: participants, roles, mute state, topic and
//! the speaker queue. Pure data; every operation returns a new `Room`.

mod aggregate;
mod invariants;
mod participant;
mod queue;

pub use aggregate::{ParticipantKey, Room};
pub use invariants::InvariantViolation;
pub use participant::{Participant, ParticipantRole};
pub use queue::QueueEntry;

#[cfg(test)]
mod tests;
