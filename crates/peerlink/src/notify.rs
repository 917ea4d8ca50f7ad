//! Notifications for the presentation layer

use crate::call::IncomingCall;
use crate::channels::Message;
use crate::error::ErrorKind;
use crate::event::PeerId;
use crate::media::StreamInfo;
use crate::signaling::LocalIdentity;
use tokio::sync::mpsc;
use tracing::trace;

/// Session state as seen by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Identity assigned, ready to start or accept a session
    Ready,
    /// Outgoing call placed, waiting for the remote stream
    Ringing,
    /// Remote stream attached
    Active,
    /// Call ended
    Closed,
    /// Call ended because of an asynchronous failure
    Error {
        /// Failure classification
        kind: ErrorKind,
        /// Human readable detail
        message: String,
    },
}

/// Something the presentation layer should render
#[derive(Debug, Clone)]
pub enum Notification {
    /// The rendezvous identity is available
    IdentityReady(LocalIdentity),
    /// A message was appended to the log
    MessageAppended(Message),
    /// Local capture attached for preview
    LocalStreamReady(StreamInfo),
    /// Remote stream attached for playback
    RemoteStreamReady(StreamInfo),
    /// A call offer waits for `confirm_incoming_call`
    IncomingCall(IncomingCall),
    /// A call offer was closed without asking because a session is busy
    IncomingCallDeclined(IncomingCall),
    /// The data channel can carry messages
    ChannelOpened {
        /// Peer on the other end
        remote: PeerId,
    },
    /// The data channel is gone
    ChannelClosed {
        /// Peer on the other end
        remote: PeerId,
    },
    /// Session state transition
    SessionState(SessionState),
}

/// Sending side of the presentation notification stream
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub(crate) fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            trace!("Presentation receiver dropped, notification discarded");
        }
    }

    pub(crate) fn state(&self, state: SessionState) {
        self.notify(Notification::SessionState(state));
    }

    pub(crate) fn error(&self, kind: ErrorKind, message: impl Into<String>) {
        self.state(SessionState::Error {
            kind,
            message: message.into(),
        });
    }
}
