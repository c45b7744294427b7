//! The `relay` module ties an upstream source to the fan-out hub and owns
//! the process-level lifecycle, including reconnects.

pub mod orchestrator;

pub use orchestrator::{Relay, RelayState, RetryPolicy};
