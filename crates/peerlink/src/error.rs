//! Error types for peerlink

use std::time::Duration;
use thiserror::Error;

/// Result type alias for peerlink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for peerlink
#[derive(Debug, Error)]
pub enum Error {
    /// Outbound action attempted before the rendezvous identity was assigned
    #[error("Local identity is not assigned yet")]
    IdentityNotReady,

    /// The signaling transport never reported `open` within the boundary timeout
    #[error("Timed out after {0:?} waiting for a local identity")]
    IdentityTimeout(Duration),

    /// Empty or malformed remote identifier
    #[error("Invalid target peer id: {0:?}")]
    InvalidTarget(String),

    /// Capture permission refused or device unavailable
    #[error("Media access denied: {0}")]
    MediaAccessDenied(String),

    /// Send attempted with no open data channel
    #[error("No open data channel")]
    NotConnected,

    /// Send attempted with nothing to send
    #[error("Refusing to send an empty payload")]
    EmptyPayload,

    /// The underlying call transport reported an error
    #[error("Call error: {0}")]
    ExternalCallError(String),

    /// Conflicting concurrent session request
    #[error("Session busy with peer {0}")]
    SessionBusy(String),

    /// Confirmation given while no incoming call is waiting for one
    #[error("No incoming call is awaiting confirmation")]
    NoPendingCall,

    /// A request to the signaling transport failed
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The orchestrator task is gone
    #[error("Orchestrator has shut down")]
    Shutdown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of an [`Error`], carried by session-state notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::IdentityNotReady`] and [`Error::IdentityTimeout`]
    IdentityNotReady,
    /// See [`Error::InvalidTarget`]
    InvalidTarget,
    /// See [`Error::MediaAccessDenied`]
    MediaAccessDenied,
    /// See [`Error::NotConnected`]
    NotConnected,
    /// See [`Error::ExternalCallError`]
    ExternalCallError,
    /// See [`Error::SessionBusy`]
    SessionBusy,
    /// Anything else
    Other,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::IdentityNotReady | Error::IdentityTimeout(_) => ErrorKind::IdentityNotReady,
            Error::InvalidTarget(_) => ErrorKind::InvalidTarget,
            Error::MediaAccessDenied(_) => ErrorKind::MediaAccessDenied,
            Error::NotConnected => ErrorKind::NotConnected,
            Error::ExternalCallError(_) => ErrorKind::ExternalCallError,
            Error::SessionBusy(_) => ErrorKind::SessionBusy,
            _ => ErrorKind::Other,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::IdentityNotReady => "IdentityNotReady",
            ErrorKind::InvalidTarget => "InvalidTarget",
            ErrorKind::MediaAccessDenied => "MediaAccessDenied",
            ErrorKind::NotConnected => "NotConnected",
            ErrorKind::ExternalCallError => "ExternalCallError",
            ErrorKind::SessionBusy => "SessionBusy",
            ErrorKind::Other => "Other",
        };
        f.write_str(name)
    }
}
