//! Session orchestration
//!
//! [`Orchestrator`] owns the identity, the data channel and the media call and
//! applies user intents and inbound events one at a time. [`OrchestratorHandle`]
//! drives a spawned orchestrator from other tasks.

mod handle;
mod orchestrator;

pub use handle::{OrchestratorHandle, Snapshot};
pub use orchestrator::{Orchestrator, Session};
