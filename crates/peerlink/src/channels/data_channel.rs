//! Single active data channel

use super::messages::{Message, MessageLog, Origin};
use crate::config::IncomingChannelPolicy;
use crate::event::{ChannelId, DataChannelEvent, PeerId};
use crate::notify::{Notification, Notifier};
use crate::signaling::{validate_peer_id, SignalingTransport};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Data channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    /// Requested, not yet usable
    Connecting,
    /// Open and ready for messages
    Open,
    /// Closed
    Closed,
}

/// Who opened the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelDirection {
    /// Opened by this process
    Outbound,
    /// Opened by the remote peer
    Inbound,
}

/// Per-channel traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataChannelStats {
    /// Messages sent
    pub messages_sent: u64,
    /// Messages received
    pub messages_received: u64,
    /// Payload bytes sent
    pub bytes_sent: u64,
    /// Payload bytes received
    pub bytes_received: u64,
}

/// The tracked data channel
#[derive(Debug)]
pub struct DataChannel {
    id: ChannelId,
    remote: PeerId,
    direction: ChannelDirection,
    state: DataChannelState,
    stats: DataChannelStats,
}

impl DataChannel {
    fn new(id: ChannelId, remote: PeerId, direction: ChannelDirection) -> Self {
        Self {
            id,
            remote,
            direction,
            state: DataChannelState::Connecting,
            stats: DataChannelStats::default(),
        }
    }

    /// Transport channel id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Peer on the other end
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Who opened the channel
    pub fn direction(&self) -> ChannelDirection {
        self.direction
    }

    /// Current state
    pub fn state(&self) -> DataChannelState {
        self.state
    }

    /// Traffic counters
    pub fn stats(&self) -> DataChannelStats {
        self.stats
    }

    fn set_state(&mut self, new_state: DataChannelState) {
        if self.state != new_state {
            debug!(
                "Data channel {} ({}) state transition: {:?} -> {:?}",
                self.id, self.remote, self.state, new_state
            );
            self.state = new_state;
        }
    }
}

/// Opens, accepts and tracks the single active data channel
///
/// Owns the message log: every successful send and every payload received on
/// the tracked channel appends exactly one [`Message`].
pub struct DataChannelManager {
    transport: Arc<dyn SignalingTransport>,
    policy: IncomingChannelPolicy,
    active: Option<DataChannel>,
    log: MessageLog,
    notifier: Notifier,
}

impl DataChannelManager {
    pub(crate) fn new(
        transport: Arc<dyn SignalingTransport>,
        policy: IncomingChannelPolicy,
        notifier: Notifier,
    ) -> Self {
        Self {
            transport,
            policy,
            active: None,
            log: MessageLog::new(),
            notifier,
        }
    }

    /// The tracked channel, if any
    pub fn active(&self) -> Option<&DataChannel> {
        self.active.as_ref()
    }

    /// Whether the tracked channel can carry payload
    pub fn is_open(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|c| c.state == DataChannelState::Open)
    }

    /// All messages in observed order
    pub fn messages(&self) -> &[Message] {
        self.log.messages()
    }

    /// Request a channel to `remote`
    ///
    /// The identifier is validated before the transport is contacted. A
    /// previously tracked channel is closed first.
    pub async fn connect(&mut self, remote: &str) -> Result<ChannelId> {
        let remote = validate_peer_id(remote)?;

        if self.active.is_some() {
            self.close().await;
        }

        info!("Opening data channel to {}", remote);
        let id = self.transport.connect(remote).await?;
        self.active = Some(DataChannel::new(
            id.clone(),
            remote.to_string(),
            ChannelDirection::Outbound,
        ));

        Ok(id)
    }

    /// Handle an inbound channel request according to the configured policy
    ///
    /// Returns true if the new channel is now the tracked one.
    pub async fn accept(&mut self, channel: ChannelId, remote: PeerId) -> bool {
        if let Some(current) = &self.active {
            match self.policy {
                IncomingChannelPolicy::RejectWhileBusy => {
                    warn!(
                        "Rejecting inbound channel {} from {}: channel {} to {} is active",
                        channel, remote, current.id, current.remote
                    );
                    if let Err(e) = self.transport.close_channel(&channel).await {
                        warn!("Failed to close rejected channel {}: {}", channel, e);
                    }
                    return false;
                }
                IncomingChannelPolicy::ReplaceAndClose => {
                    info!(
                        "Inbound channel {} from {} replaces channel {}",
                        channel, remote, current.id
                    );
                    self.close().await;
                }
            }
        }

        info!("Accepted inbound data channel {} from {}", channel, remote);
        self.active = Some(DataChannel::new(channel, remote, ChannelDirection::Inbound));
        true
    }

    /// Send a text payload on the open channel and record it
    pub async fn send(&mut self, payload: &str) -> Result<Message> {
        let channel = match self.active.as_mut() {
            Some(c) if c.state == DataChannelState::Open => c,
            _ => return Err(Error::NotConnected),
        };

        if payload.is_empty() {
            return Err(Error::EmptyPayload);
        }

        self.transport.send(&channel.id, payload).await?;
        channel.stats.messages_sent += 1;
        channel.stats.bytes_sent += payload.len() as u64;

        let message = self.log.append(Origin::Local, payload).clone();
        debug!("Sent message #{} on channel {}", message.sequence, channel.id);
        self.notifier
            .notify(Notification::MessageAppended(message.clone()));

        Ok(message)
    }

    /// Apply an event raised for `channel`
    pub fn handle_event(&mut self, channel: &str, event: DataChannelEvent) {
        let Some(current) = self.active.as_mut().filter(|c| c.id == channel) else {
            debug!("Ignoring {:?} for untracked channel {}", event, channel);
            return;
        };

        match event {
            DataChannelEvent::Opened => {
                current.set_state(DataChannelState::Open);
                info!("Data channel to {} is open", current.remote);
                self.notifier.notify(Notification::ChannelOpened {
                    remote: current.remote.clone(),
                });
            }
            DataChannelEvent::PayloadReceived(bytes) => {
                current.stats.messages_received += 1;
                current.stats.bytes_received += bytes.len() as u64;

                let payload = String::from_utf8_lossy(&bytes).into_owned();
                let message = self.log.append(Origin::Remote, payload).clone();
                debug!(
                    "Received message #{} on channel {}",
                    message.sequence, current.id
                );
                self.notifier.notify(Notification::MessageAppended(message));
            }
            DataChannelEvent::Closed => {
                current.set_state(DataChannelState::Closed);
                info!("Data channel to {} closed by remote", current.remote);
                let remote = current.remote.clone();
                self.active = None;
                self.notifier.notify(Notification::ChannelClosed { remote });
            }
        }
    }

    /// Close the tracked channel; no-op when there is none
    pub async fn close(&mut self) {
        let Some(mut channel) = self.active.take() else {
            return;
        };

        if let Err(e) = self.transport.close_channel(&channel.id).await {
            warn!("Failed to close data channel {}: {}", channel.id, e);
        }
        channel.set_state(DataChannelState::Closed);
        info!(
            "Closed data channel to {} (sent: {}, received: {})",
            channel.remote, channel.stats.messages_sent, channel.stats.messages_received
        );

        self.notifier.notify(Notification::ChannelClosed {
            remote: channel.remote,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingTransport, TransportRequest};
    use bytes::Bytes;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn manager(
        policy: IncomingChannelPolicy,
    ) -> (
        DataChannelManager,
        Arc<RecordingTransport>,
        UnboundedReceiver<Notification>,
    ) {
        let transport = Arc::new(RecordingTransport::new());
        let (notifier, rx) = Notifier::channel();
        (
            DataChannelManager::new(transport.clone(), policy, notifier),
            transport,
            rx,
        )
    }

    #[tokio::test]
    async fn test_empty_target_rejected_before_transport() {
        let (mut channels, transport, _rx) = manager(IncomingChannelPolicy::default());

        assert!(matches!(
            channels.connect("").await,
            Err(Error::InvalidTarget(_))
        ));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_send_requires_open_channel() {
        let (mut channels, transport, _rx) = manager(IncomingChannelPolicy::default());

        assert!(matches!(channels.send("hi").await, Err(Error::NotConnected)));

        let id = channels.connect("xyz789").await.unwrap();
        assert!(matches!(channels.send("hi").await, Err(Error::NotConnected)));
        assert!(channels.messages().is_empty());

        channels.handle_event(&id, DataChannelEvent::Opened);
        let message = channels.send("hi").await.unwrap();
        assert_eq!(message.sequence, 1);
        assert_eq!(message.origin, Origin::Local);
        assert_eq!(
            transport.count(|r| matches!(r, TransportRequest::Send { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_empty_payload_rejected() {
        let (mut channels, transport, _rx) = manager(IncomingChannelPolicy::default());
        let id = channels.connect("xyz789").await.unwrap();
        channels.handle_event(&id, DataChannelEvent::Opened);

        assert!(matches!(channels.send("").await, Err(Error::EmptyPayload)));
        assert_eq!(
            transport.count(|r| matches!(r, TransportRequest::Send { .. })),
            0
        );
    }

    #[tokio::test]
    async fn test_failed_send_appends_nothing() {
        let (mut channels, transport, _rx) = manager(IncomingChannelPolicy::default());
        let id = channels.connect("xyz789").await.unwrap();
        channels.handle_event(&id, DataChannelEvent::Opened);

        transport.fail_requests(true);
        assert!(matches!(
            channels.send("lost").await,
            Err(Error::Signaling(_))
        ));
        assert!(channels.messages().is_empty());
    }

    #[tokio::test]
    async fn test_payloads_interleave_in_observed_order() {
        let (mut channels, _transport, _rx) = manager(IncomingChannelPolicy::default());
        let id = channels.connect("xyz789").await.unwrap();
        channels.handle_event(&id, DataChannelEvent::Opened);

        channels.handle_event(
            &id,
            DataChannelEvent::PayloadReceived(Bytes::from_static(b"one")),
        );
        channels.send("two").await.unwrap();
        channels.handle_event(
            &id,
            DataChannelEvent::PayloadReceived(Bytes::from_static(b"three")),
        );

        let log: Vec<(u64, Origin, &str)> = channels
            .messages()
            .iter()
            .map(|m| (m.sequence, m.origin, m.payload.as_str()))
            .collect();
        assert_eq!(
            log,
            vec![
                (1, Origin::Remote, "one"),
                (2, Origin::Local, "two"),
                (3, Origin::Remote, "three"),
            ]
        );

        let stats = channels.active().unwrap().stats();
        assert_eq!(stats.messages_received, 2);
        assert_eq!(stats.bytes_sent, 3);
    }

    #[tokio::test]
    async fn test_stale_channel_payload_dropped() {
        let (mut channels, _transport, _rx) = manager(IncomingChannelPolicy::default());
        channels.connect("xyz789").await.unwrap();

        channels.handle_event(
            "some-other-channel",
            DataChannelEvent::PayloadReceived(Bytes::from_static(b"ghost")),
        );
        assert!(channels.messages().is_empty());
    }

    #[tokio::test]
    async fn test_replace_policy_closes_previous_channel() {
        let (mut channels, transport, _rx) = manager(IncomingChannelPolicy::ReplaceAndClose);

        assert!(channels.accept("c1".into(), "alice".into()).await);
        assert!(channels.accept("c2".into(), "bob".into()).await);

        assert_eq!(channels.active().unwrap().id(), "c2");
        assert_eq!(
            transport.requests(),
            vec![TransportRequest::CloseChannel {
                channel: "c1".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_reject_policy_keeps_current_channel() {
        let (mut channels, transport, _rx) = manager(IncomingChannelPolicy::RejectWhileBusy);

        assert!(channels.accept("c1".into(), "alice".into()).await);
        assert!(!channels.accept("c2".into(), "bob".into()).await);

        assert_eq!(channels.active().unwrap().id(), "c1");
        assert_eq!(
            transport.requests(),
            vec![TransportRequest::CloseChannel {
                channel: "c2".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut channels, transport, mut rx) = manager(IncomingChannelPolicy::default());
        channels.close().await;

        let id = channels.connect("xyz789").await.unwrap();
        channels.close().await;
        channels.close().await;

        assert!(channels.active().is_none());
        assert_eq!(
            transport.count(|r| matches!(r, TransportRequest::CloseChannel { channel } if *channel == id)),
            1
        );
        assert!(matches!(
            rx.recv().await,
            Some(Notification::ChannelClosed { remote }) if remote == "xyz789"
        ));
    }

    #[tokio::test]
    async fn test_remote_close_clears_channel() {
        let (mut channels, _transport, _rx) = manager(IncomingChannelPolicy::default());
        let id = channels.connect("xyz789").await.unwrap();
        channels.handle_event(&id, DataChannelEvent::Opened);
        channels.handle_event(&id, DataChannelEvent::Closed);

        assert!(channels.active().is_none());
        assert!(matches!(channels.send("hi").await, Err(Error::NotConnected)));
    }
}
