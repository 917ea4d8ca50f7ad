//! Inbound event types
//!
//! Everything the orchestrator reacts to arrives as an [`Inbound`] value on one
//! queue: notifications raised by the signaling transport and completions of
//! local media capture. Events for one channel or call are handled in the
//! order they were raised.

use crate::media::MediaStream;
use crate::Result;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Rendezvous identifier of a peer (opaque printable text)
pub type PeerId = String;

/// Transport-assigned identifier of a data channel
pub type ChannelId = String;

/// Transport-assigned identifier of a media call
pub type CallId = String;

/// Events raised for one data channel
#[derive(Debug)]
pub enum DataChannelEvent {
    /// The channel can carry payload
    Opened,
    /// A payload arrived from the remote side
    PayloadReceived(Bytes),
    /// The channel was closed by the remote side or the transport
    Closed,
}

/// Events raised for one media call
#[derive(Debug)]
pub enum MediaCallEvent {
    /// A remote peer offers a call
    IncomingOffer {
        /// Caller identity
        remote: PeerId,
    },
    /// The remote audio/video stream is available
    RemoteStreamReady(MediaStream),
    /// The call transport failed
    Error(String),
    /// The remote side closed the call
    Closed,
}

/// Notifications produced by the signaling transport
#[derive(Debug)]
pub enum TransportEvent {
    /// Registration finished; carries the assigned identity
    Open(PeerId),
    /// A remote peer opened a data channel to us
    Connection {
        /// New channel
        channel: ChannelId,
        /// Peer on the other end
        remote: PeerId,
    },
    /// Event for an existing data channel
    Channel {
        /// Channel the event belongs to
        channel: ChannelId,
        /// What happened
        event: DataChannelEvent,
    },
    /// Event for a media call
    Media {
        /// Call the event belongs to
        call: CallId,
        /// What happened
        event: MediaCallEvent,
    },
}

/// Result of a local media capture request
#[derive(Debug)]
pub struct CaptureOutcome {
    /// Call attempt that requested the capture
    pub attempt: u64,
    /// Captured stream or the reason capture failed
    pub result: Result<MediaStream>,
}

/// Anything the orchestrator reacts to
#[derive(Debug)]
pub enum Inbound {
    /// Signaling transport notification
    Transport(TransportEvent),
    /// Media capture finished
    Capture(CaptureOutcome),
}

impl From<TransportEvent> for Inbound {
    fn from(event: TransportEvent) -> Self {
        Inbound::Transport(event)
    }
}

/// Sending side of the orchestrator's inbound queue
///
/// Handed to the signaling transport at registration; cloning is cheap.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Inbound>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Deliver a transport event; returns false once the orchestrator is gone
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send(Inbound::Transport(event)).is_ok()
    }

    pub(crate) fn capture_completed(&self, attempt: u64, result: Result<MediaStream>) -> bool {
        self.tx
            .send(Inbound::Capture(CaptureOutcome { attempt, result }))
            .is_ok()
    }

    /// Whether the receiving orchestrator has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
