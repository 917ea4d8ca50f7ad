//! Rendezvous identity registration

use super::SignalingTransport;
use crate::event::EventSink;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Rendezvous identifier assigned to this process by the signaling transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalIdentity(String);

impl LocalIdentity {
    /// Wrap an assigned identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LocalIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Registration {
    Unrequested,
    Pending,
    Ready(LocalIdentity),
}

/// Obtains the local identity exactly once
///
/// There is no timeout here: if the transport never opens, the identity stays
/// pending. Callers bound the wait with `tokio::time::timeout`.
#[derive(Debug)]
pub struct IdentityRegistrar {
    state: Registration,
}

impl Default for IdentityRegistrar {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityRegistrar {
    /// Registrar that has not contacted the transport yet
    pub fn new() -> Self {
        Self {
            state: Registration::Unrequested,
        }
    }

    /// Ask the transport for an identity
    ///
    /// Only the first call reaches the transport; a failed request can be
    /// retried.
    pub async fn acquire(
        &mut self,
        transport: &dyn SignalingTransport,
        preferred: Option<&str>,
        events: EventSink,
    ) -> Result<()> {
        if self.state != Registration::Unrequested {
            warn!("Identity already requested, ignoring repeated acquire");
            return Ok(());
        }

        info!("Requesting rendezvous identity (preferred: {:?})", preferred);
        self.state = Registration::Pending;

        if let Err(e) = transport.register(preferred, events).await {
            self.state = Registration::Unrequested;
            return Err(e);
        }

        Ok(())
    }

    /// Record the identity from an `open` notification
    ///
    /// Returns the identity on first assignment, `None` if one was already set.
    pub fn assign(&mut self, id: String) -> Option<&LocalIdentity> {
        if let Registration::Ready(current) = &self.state {
            warn!(
                "Transport reported identity {} but {} is already assigned; ignoring",
                id, current
            );
            return None;
        }

        info!("Local identity assigned: {}", id);
        self.state = Registration::Ready(LocalIdentity::new(id));

        match &self.state {
            Registration::Ready(identity) => Some(identity),
            _ => None,
        }
    }

    /// The identity, once assigned
    pub fn identity(&self) -> Option<&LocalIdentity> {
        match &self.state {
            Registration::Ready(identity) => Some(identity),
            _ => None,
        }
    }

    /// Whether the transport has been asked for an identity
    pub fn is_requested(&self) -> bool {
        self.state != Registration::Unrequested
    }

    /// Whether registration is in flight
    pub fn is_pending(&self) -> bool {
        self.state == Registration::Pending
    }

    /// The identity, or [`Error::IdentityNotReady`]
    pub fn require(&self) -> Result<&LocalIdentity> {
        self.identity().ok_or(Error::IdentityNotReady)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingTransport, TransportRequest};

    #[tokio::test]
    async fn test_acquire_registers_once() {
        let transport = RecordingTransport::new();
        let (sink, _rx) = EventSink::channel();
        let mut registrar = IdentityRegistrar::new();

        registrar
            .acquire(&transport, Some("abc123"), sink.clone())
            .await
            .unwrap();
        registrar.acquire(&transport, None, sink).await.unwrap();

        assert!(registrar.is_pending());
        assert_eq!(
            transport.requests(),
            vec![TransportRequest::Register {
                preferred: Some("abc123".to_string())
            }]
        );
    }

    #[test]
    fn test_identity_is_immutable_once_assigned() {
        let mut registrar = IdentityRegistrar::new();
        assert!(matches!(registrar.require(), Err(Error::IdentityNotReady)));

        assert_eq!(
            registrar.assign("abc123".into()).map(LocalIdentity::as_str),
            Some("abc123")
        );
        assert!(registrar.assign("other".into()).is_none());
        assert_eq!(registrar.require().unwrap().as_str(), "abc123");
    }

    #[tokio::test]
    async fn test_failed_registration_can_be_retried() {
        let transport = RecordingTransport::new();
        transport.fail_requests(true);
        let (sink, _rx) = EventSink::channel();
        let mut registrar = IdentityRegistrar::new();

        assert!(registrar
            .acquire(&transport, None, sink.clone())
            .await
            .is_err());
        assert!(!registrar.is_requested());

        transport.fail_requests(false);
        registrar.acquire(&transport, None, sink).await.unwrap();
        assert!(registrar.is_pending());
    }
}
