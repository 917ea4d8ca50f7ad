//! Peer connection orchestration for direct text + audio/video sessions
//!
//! Two endpoints find each other through a rendezvous identifier assigned by a
//! signaling transport, then open a direct data channel (text messages) and a
//! media call (audio/video) without relaying payload through a server.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │  Presentation (UI / CLI)                               │
//! │  ↑ Notification stream      ↓ OrchestratorHandle      │
//! │  Orchestrator                                          │
//! │  ├─ IdentityRegistrar (rendezvous identity, once)      │
//! │  ├─ DataChannelManager (one channel, message log)      │
//! │  └─ MediaCallManager (one call, accept/reject gate)    │
//! │     ↓ requests                 ↑ Inbound events        │
//! │  SignalingTransport  +  MediaCapture                   │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! All transport events and capture completions go through a single queue and
//! are handled one at a time by the owner of the [`Orchestrator`].
//!
//! # Example
//!
//! ```ignore
//! use peerlink::{MemoryHub, Orchestrator, OrchestratorConfig, SyntheticCapture};
//! use std::sync::Arc;
//!
//! let hub = MemoryHub::new();
//! let (mut orchestrator, notifications) = Orchestrator::new(
//!     OrchestratorConfig::default(),
//!     Arc::new(hub.endpoint()),
//!     Arc::new(SyntheticCapture::new()),
//! )?;
//! orchestrator.start().await?;
//! let me = orchestrator.wait_for_identity().await?;
//!
//! let handle = orchestrator.spawn();
//! handle.start_session("remote-peer-id").await?;
//! handle.send_message("hello").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod config;
pub mod error;
pub mod event;
pub mod notify;

pub mod call;
pub mod channels;
pub mod media;
pub mod session;
pub mod signaling;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-exports for public API
pub use call::{CallDirection, CallState, IncomingCall, MediaCall, MediaCallManager};
pub use channels::{
    DataChannel, DataChannelManager, DataChannelState, DataChannelStats, Message, MessageLog,
    Origin,
};
pub use config::{IncomingChannelPolicy, OrchestratorConfig};
pub use error::{Error, ErrorKind, Result};
pub use event::{
    CallId, CaptureOutcome, ChannelId, DataChannelEvent, EventSink, Inbound, MediaCallEvent,
    PeerId, TransportEvent,
};
pub use media::{
    MediaCapture, MediaConstraints, MediaStream, MediaTrack, StreamInfo, StreamMonitor,
    SyntheticCapture, TrackKind,
};
pub use notify::{Notification, SessionState};
pub use session::{Orchestrator, OrchestratorHandle, Session, Snapshot};
pub use signaling::{IdentityRegistrar, LocalIdentity, MemoryHub, MemoryTransport, SignalingTransport};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
