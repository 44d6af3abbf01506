//! In-process collaborators: a presence bus, a media transport hub and the
//! backend services. Used by `spaces simulate` and by the test suites.
//! Each supports failure injection.

mod bus;
mod services;
mod sfu;

pub use bus::{BusOp, LoopbackBus, LoopbackBusClient};
pub use services::LoopbackServices;
pub use sfu::{LoopbackSfu, LoopbackTransport};
