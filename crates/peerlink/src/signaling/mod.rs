//! Signaling transport boundary and rendezvous identity
//!
//! The transport assigns identities, relays connection and call offers between
//! peers and carries data-channel payload. Notifications flow back through the
//! [`EventSink`] handed over at registration.

pub mod identity;
pub mod memory;

pub use identity::{IdentityRegistrar, LocalIdentity};
pub use memory::{MemoryHub, MemoryTransport};

use crate::event::{CallId, ChannelId, EventSink};
use crate::media::MediaStream;
use crate::{Error, Result};
use async_trait::async_trait;

/// Requests the orchestrator issues to the signaling transport
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Start registration; the identity arrives later as `TransportEvent::Open`
    async fn register(&self, preferred: Option<&str>, events: EventSink) -> Result<()>;

    /// Request a data channel to `remote`
    async fn connect(&self, remote: &str) -> Result<ChannelId>;

    /// Enqueue a text payload on an open channel (fire and forget)
    async fn send(&self, channel: &str, payload: &str) -> Result<()>;

    /// Close a data channel
    async fn close_channel(&self, channel: &str) -> Result<()>;

    /// Offer a call to `remote` carrying the local stream
    async fn call(&self, remote: &str, local: &MediaStream) -> Result<CallId>;

    /// Answer an offered call with the local stream
    async fn answer(&self, call: &str, local: &MediaStream) -> Result<()>;

    /// Close a call
    async fn close_call(&self, call: &str) -> Result<()>;
}

/// Validate a remote identifier typed by the user, returning it trimmed
pub fn validate_peer_id(remote: &str) -> Result<&str> {
    let trimmed = remote.trim();

    if trimmed.is_empty() || trimmed.chars().any(char::is_control) {
        return Err(Error::InvalidTarget(remote.to_string()));
    }

    Ok(trimmed)
}
