//! Capture session lifecycle: session-id resolution with freshness
//! retries, participant registration, the countdown timer and the
//! host-only start/stop guards.

mod freshness;
mod manager;
mod timer;

pub use freshness::{Freshness, FreshnessPolicy, RetryPolicy};
pub use manager::{CaptureSession, GateBlock, RecordingGate, RecordingManager, RecordingRole};
pub use timer::CountdownTimer;
