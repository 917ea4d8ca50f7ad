//! Connection orchestrator

use super::handle::Snapshot;
use crate::call::{CallState, IncomingCall, MediaCall, MediaCallManager};
use crate::channels::{DataChannel, DataChannelManager, Message};
use crate::config::OrchestratorConfig;
use crate::event::{ChannelId, EventSink, Inbound, MediaCallEvent, PeerId, TransportEvent};
use crate::media::MediaCapture;
use crate::notify::{Notification, Notifier, SessionState};
use crate::signaling::{validate_peer_id, IdentityRegistrar, LocalIdentity, SignalingTransport};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Pairing with one remote peer
///
/// Exists while a live call or a tracked data channel remains.
#[derive(Debug, Clone)]
pub struct Session {
    remote: PeerId,
    started_at: Instant,
}

impl Session {
    fn new(remote: PeerId) -> Self {
        Self {
            remote,
            started_at: Instant::now(),
        }
    }

    /// Remote peer identity
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Time since the session started
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Owns the identity, the data channel and the media call of one endpoint
///
/// Every transport event and capture completion enters through
/// [`Orchestrator::handle_event`]; user intents are plain methods. Nothing is
/// shared between tasks, so the owner (or the task started by
/// [`Orchestrator::spawn`]) serializes everything.
pub struct Orchestrator {
    config: OrchestratorConfig,
    transport: Arc<dyn SignalingTransport>,
    registrar: IdentityRegistrar,
    channels: DataChannelManager,
    calls: MediaCallManager,
    session: Option<Session>,
    notifier: Notifier,
    sink: EventSink,
    pub(super) inbound: mpsc::UnboundedReceiver<Inbound>,
}

impl Orchestrator {
    /// Create an orchestrator and the notification stream for the presentation layer
    pub fn new(
        config: OrchestratorConfig,
        transport: Arc<dyn SignalingTransport>,
        capture: Arc<dyn MediaCapture>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notification>)> {
        config.validate()?;

        let (sink, inbound) = EventSink::channel();
        let (notifier, notifications) = Notifier::channel();

        let channels = DataChannelManager::new(
            Arc::clone(&transport),
            config.incoming_channel_policy,
            notifier.clone(),
        );
        let calls = MediaCallManager::new(
            Arc::clone(&transport),
            capture,
            config.media,
            sink.clone(),
            notifier.clone(),
        );

        debug!(
            "Orchestrator created (media: {:?}, channel policy: {:?})",
            config.media, config.incoming_channel_policy
        );

        let orchestrator = Self {
            config,
            transport,
            registrar: IdentityRegistrar::new(),
            channels,
            calls,
            session: None,
            notifier,
            sink,
            inbound,
        };

        Ok((orchestrator, notifications))
    }

    /// Request the rendezvous identity; repeated calls are no-ops
    pub async fn start(&mut self) -> Result<()> {
        self.registrar
            .acquire(
                self.transport.as_ref(),
                self.config.preferred_peer_id.as_deref(),
                self.sink.clone(),
            )
            .await
    }

    /// Process events until the identity is assigned
    ///
    /// Bounded by the configured identity timeout. Only the wait for the next
    /// event is bounded; an event already taken off the queue is applied in full.
    pub async fn wait_for_identity(&mut self) -> Result<LocalIdentity> {
        if !self.registrar.is_requested() {
            self.start().await?;
        }

        let timeout = self.config.identity_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(identity) = self.registrar.identity() {
                return Ok(identity.clone());
            }

            match tokio::time::timeout_at(deadline, self.inbound.recv()).await {
                Ok(Some(event)) => self.handle_event(event).await,
                Ok(None) => return Err(Error::Shutdown),
                Err(_) => {
                    warn!("No identity assigned within {:?}", timeout);
                    return Err(Error::IdentityTimeout(timeout));
                }
            }
        }
    }

    /// Open a data channel and place a media call to `remote`
    ///
    /// Checks, in order: the identifier, the local identity, an existing
    /// session. Re-targeting the current remote while no call is live places a
    /// new call and keeps an existing channel.
    pub async fn start_session(&mut self, remote: &str) -> Result<()> {
        let remote = validate_peer_id(remote)?.to_string();
        let identity = self.registrar.require()?;

        if let Some(session) = &self.session {
            if session.remote != remote {
                warn!(
                    "Refusing session with {}: already in session with {}",
                    remote, session.remote
                );
                return Err(Error::SessionBusy(session.remote.clone()));
            }
        }

        info!("{} starting session with {}", identity, remote);
        self.calls.place_call(&remote)?;

        if self.channels.active().is_none() {
            if let Err(e) = self.channels.connect(&remote).await {
                warn!("Data channel to {} failed, abandoning call: {}", remote, e);
                self.calls.hangup().await;
                self.sync_session();
                return Err(e);
            }
        } else {
            debug!("Reusing data channel to {}", remote);
        }

        self.sync_session();
        Ok(())
    }

    /// Send a text message on the open data channel
    ///
    /// Refused with [`Error::IdentityNotReady`] until the identity is assigned,
    /// even on an inbound channel that is already open.
    pub async fn send_message(&mut self, text: &str) -> Result<Message> {
        self.registrar.require()?;
        self.channels.send(text).await
    }

    /// Hang up and close the data channel; safe to call repeatedly
    pub async fn end_session(&mut self) {
        let had_call = self.calls.hangup().await;
        let had_channel = self.channels.active().is_some();
        self.channels.close().await;
        self.sync_session();

        if had_call || had_channel {
            info!("Session ended by local user");
            self.notifier.state(SessionState::Closed);
        }
    }

    /// Accept or reject the call offer waiting for confirmation
    pub async fn confirm_incoming_call(&mut self, accept: bool) -> Result<()> {
        let result = self.calls.confirm(accept).await;
        self.sync_session();
        result
    }

    /// Decide incoming offers synchronously instead of through
    /// [`Orchestrator::confirm_incoming_call`]
    pub fn on_incoming_call<F>(&mut self, decider: F)
    where
        F: Fn(&IncomingCall) -> bool + Send + Sync + 'static,
    {
        self.calls.set_decider(Box::new(decider));
    }

    /// Wait for the next inbound event and apply it
    ///
    /// Returns false once the inbound queue is closed.
    pub async fn next_event(&mut self) -> bool {
        match self.inbound.recv().await {
            Some(event) => {
                self.handle_event(event).await;
                true
            }
            None => false,
        }
    }

    /// Apply every event already queued; returns how many were handled
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.inbound.try_recv() {
            self.handle_event(event).await;
            handled += 1;
        }
        handled
    }

    /// Apply one transport event or capture completion
    pub async fn handle_event(&mut self, event: Inbound) {
        match event {
            Inbound::Capture(outcome) => self.calls.on_capture_completed(outcome).await,
            Inbound::Transport(event) => self.on_transport_event(event).await,
        }
        self.sync_session();
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open(id) => {
                if let Some(identity) = self.registrar.assign(id) {
                    let identity = identity.clone();
                    self.notifier.notify(Notification::IdentityReady(identity));
                    self.notifier.state(SessionState::Ready);
                }
            }
            TransportEvent::Connection { channel, remote } => {
                self.on_connection(channel, remote).await
            }
            TransportEvent::Channel { channel, event } => {
                self.channels.handle_event(&channel, event)
            }
            TransportEvent::Media { call, event } => {
                if let MediaCallEvent::IncomingOffer { remote } = &event {
                    if let Some(session) = self.session.as_ref().filter(|s| s.remote != *remote) {
                        warn!(
                            "Declining call {} from {}: in session with {}",
                            call, remote, session.remote
                        );
                        let offer = IncomingCall {
                            call,
                            remote: remote.clone(),
                        };
                        self.calls.decline(offer).await;
                        return;
                    }
                }
                self.calls.handle_event(call, event).await;
            }
        }
    }

    async fn on_connection(&mut self, channel: ChannelId, remote: PeerId) {
        if let Some(call) = self.calls.current().filter(|c| c.remote() != remote) {
            warn!(
                "Closing inbound channel {} from {}: call with {} is live",
                channel,
                remote,
                call.remote()
            );
            if let Err(e) = self.transport.close_channel(&channel).await {
                warn!("Failed to close channel {}: {}", channel, e);
            }
            return;
        }

        self.channels.accept(channel, remote).await;
    }

    fn sync_session(&mut self) {
        let desired = self
            .calls
            .current()
            .map(|c| c.remote().to_string())
            .or_else(|| self.channels.active().map(|c| c.remote().to_string()));

        let current = self.session.as_ref().map(|s| s.remote.as_str());
        if desired.as_deref() == current {
            return;
        }

        if let Some(ended) = self.session.take() {
            info!(
                "Session with {} ended after {:?}",
                ended.remote,
                ended.elapsed()
            );
        }
        if let Some(remote) = desired {
            info!("Session with {} started", remote);
            self.session = Some(Session::new(remote));
        }
    }

    /// Local identity, once assigned
    pub fn local_identity(&self) -> Option<&LocalIdentity> {
        self.registrar.identity()
    }

    /// Message log in observed order
    pub fn messages(&self) -> &[Message] {
        self.channels.messages()
    }

    /// State of the live call, or of the last one
    pub fn call_state(&self) -> CallState {
        self.calls.state()
    }

    /// The live call, if any
    pub fn current_call(&self) -> Option<&MediaCall> {
        self.calls.current()
    }

    /// The tracked data channel, if any
    pub fn data_channel(&self) -> Option<&DataChannel> {
        self.channels.active()
    }

    /// The current session, if any
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Owned copy of the presentation-relevant state
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            identity: self.registrar.identity().cloned(),
            call_state: self.calls.state(),
            session: self.session.as_ref().map(|s| s.remote.clone()),
            channel_open: self.channels.is_open(),
            messages: self.channels.messages().to_vec(),
        }
    }
}
