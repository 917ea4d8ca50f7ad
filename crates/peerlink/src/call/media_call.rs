//! Single live media call
//!
//! ```text
//! Idle -> CapturingLocal -> OutgoingRinging -> Active -> Closed
//! Idle -> IncomingPendingConfirm -> (accept) CapturingLocal -> Answering -> Active -> Closed
//!                                -> (reject) Closed
//! ```
//!
//! Capture runs in a spawned task and reports back through the orchestrator's
//! inbound queue, so a hangup while capture is pending takes effect at once and
//! the late stream is released when it arrives.

use crate::error::ErrorKind;
use crate::event::{CallId, CaptureOutcome, EventSink, MediaCallEvent, PeerId};
use crate::media::{MediaCapture, MediaConstraints, MediaStream};
use crate::notify::{Notification, Notifier, SessionState};
use crate::signaling::{validate_peer_id, SignalingTransport};
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Media call state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// No call has been made yet
    Idle,
    /// Waiting for local media capture
    CapturingLocal,
    /// Offer sent, waiting for the remote stream
    OutgoingRinging,
    /// Offer received, waiting for the user to accept or reject
    IncomingPendingConfirm,
    /// Answer sent, waiting for the remote stream
    Answering,
    /// Both streams attached
    Active,
    /// Call ended
    Closed,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Idle => write!(f, "Idle"),
            CallState::CapturingLocal => write!(f, "CapturingLocal"),
            CallState::OutgoingRinging => write!(f, "OutgoingRinging"),
            CallState::IncomingPendingConfirm => write!(f, "IncomingPendingConfirm"),
            CallState::Answering => write!(f, "Answering"),
            CallState::Active => write!(f, "Active"),
            CallState::Closed => write!(f, "Closed"),
        }
    }
}

/// Who placed the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    /// Placed by this process
    Outgoing,
    /// Offered by the remote peer
    Incoming,
}

/// A call offer awaiting a decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCall {
    /// Transport call id
    pub call: CallId,
    /// Caller identity
    pub remote: PeerId,
}

/// Synchronous accept (true) / reject (false) decision for an incoming offer
pub type CallDecider = Box<dyn Fn(&IncomingCall) -> bool + Send + Sync>;

/// The live call and the streams it owns
#[derive(Debug)]
pub struct MediaCall {
    attempt: u64,
    call_id: Option<CallId>,
    remote: PeerId,
    direction: CallDirection,
    state: CallState,
    local: Option<MediaStream>,
    remote_stream: Option<MediaStream>,
}

impl MediaCall {
    /// Local attempt number, unique per manager
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Transport call id, once known
    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    /// Peer on the other end
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Who placed the call
    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    /// Current state
    pub fn state(&self) -> CallState {
        self.state
    }

    /// Attached local stream
    pub fn local_stream(&self) -> Option<&MediaStream> {
        self.local.as_ref()
    }

    /// Attached remote stream
    pub fn remote_stream(&self) -> Option<&MediaStream> {
        self.remote_stream.as_ref()
    }

    fn set_state(&mut self, new_state: CallState) {
        if self.state != new_state {
            debug!(
                "Call attempt {} with {} state transition: {} -> {}",
                self.attempt, self.remote, self.state, new_state
            );
            self.state = new_state;
        }
    }

    fn release(&mut self) {
        if let Some(stream) = self.local.take() {
            stream.stop();
        }
        if let Some(stream) = self.remote_stream.take() {
            stream.stop();
        }
    }
}

/// Places, accepts and tears down the single live media call
pub struct MediaCallManager {
    transport: Arc<dyn SignalingTransport>,
    capture: Arc<dyn MediaCapture>,
    constraints: MediaConstraints,
    events: EventSink,
    notifier: Notifier,
    current: Option<MediaCall>,
    last_state: CallState,
    next_attempt: u64,
    decider: Option<CallDecider>,
}

impl MediaCallManager {
    pub(crate) fn new(
        transport: Arc<dyn SignalingTransport>,
        capture: Arc<dyn MediaCapture>,
        constraints: MediaConstraints,
        events: EventSink,
        notifier: Notifier,
    ) -> Self {
        Self {
            transport,
            capture,
            constraints,
            events,
            notifier,
            current: None,
            last_state: CallState::Idle,
            next_attempt: 0,
            decider: None,
        }
    }

    /// The live call, if any
    pub fn current(&self) -> Option<&MediaCall> {
        self.current.as_ref()
    }

    /// State of the live call, or of the last one
    pub fn state(&self) -> CallState {
        self.current
            .as_ref()
            .map(|c| c.state)
            .unwrap_or(self.last_state)
    }

    /// Decide incoming offers synchronously instead of waiting for `confirm`
    pub fn set_decider(&mut self, decider: CallDecider) {
        self.decider = Some(decider);
    }

    /// Capture local media and call `remote` with it
    ///
    /// Returns the attempt number; capture completes asynchronously.
    pub fn place_call(&mut self, remote: &str) -> Result<u64> {
        let remote = validate_peer_id(remote)?;

        if let Some(call) = &self.current {
            return Err(Error::SessionBusy(call.remote.clone()));
        }

        info!("Placing call to {}", remote);
        let attempt = self.begin(
            remote.to_string(),
            CallDirection::Outgoing,
            None,
            CallState::CapturingLocal,
        );
        self.spawn_capture(attempt);

        Ok(attempt)
    }

    /// Accept or reject the offer waiting in `IncomingPendingConfirm`
    ///
    /// Rejecting never requests local media.
    pub async fn confirm(&mut self, accept: bool) -> Result<()> {
        let Some(call) = self
            .current
            .as_mut()
            .filter(|c| c.state == CallState::IncomingPendingConfirm)
        else {
            return Err(Error::NoPendingCall);
        };

        if accept {
            info!("Accepted call from {}", call.remote);
            call.set_state(CallState::CapturingLocal);
            let attempt = call.attempt;
            self.spawn_capture(attempt);
        } else {
            info!("Rejected call from {}", call.remote);
            self.teardown(true).await;
            self.notifier.state(SessionState::Closed);
        }

        Ok(())
    }

    /// Close an offer without touching local media
    ///
    /// The live call, if any, is left alone, so no session state is emitted.
    pub async fn decline(&mut self, offer: IncomingCall) {
        if let Err(e) = self.transport.close_call(&offer.call).await {
            warn!("Failed to close declined call {}: {}", offer.call, e);
        }
        self.notifier
            .notify(Notification::IncomingCallDeclined(offer));
    }

    /// End the live call and release its streams; no-op without one
    ///
    /// Returns true if a call was closed.
    pub async fn hangup(&mut self) -> bool {
        let closed = self.teardown(true).await;
        self.last_state = CallState::Closed;
        closed
    }

    /// Apply a capture completion
    pub async fn on_capture_completed(&mut self, outcome: CaptureOutcome) {
        let CaptureOutcome { attempt, result } = outcome;

        let pending = self
            .current
            .as_ref()
            .is_some_and(|c| c.attempt == attempt && c.state == CallState::CapturingLocal);
        if !pending {
            if let Ok(stream) = &result {
                debug!(
                    "Capture for attempt {} finished after hangup, releasing stream {}",
                    attempt,
                    stream.id()
                );
            }
            return;
        }

        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Local media capture failed for attempt {}: {}", attempt, e);
                self.fail(e.kind(), e.to_string()).await;
                return;
            }
        };

        self.notifier
            .notify(Notification::LocalStreamReady(stream.info()));

        let Some(call) = self.current.as_mut() else {
            return;
        };

        let request = match call.direction {
            CallDirection::Outgoing => self.transport.call(&call.remote, &stream).await,
            CallDirection::Incoming => {
                let call_id = call.call_id.clone().unwrap_or_default();
                self.transport
                    .answer(&call_id, &stream)
                    .await
                    .map(|()| call_id)
            }
        };
        call.local = Some(stream);

        match request {
            Ok(call_id) if call.direction == CallDirection::Outgoing => {
                info!("Call {} to {} is ringing", call_id, call.remote);
                call.call_id = Some(call_id);
                call.set_state(CallState::OutgoingRinging);
                self.notifier.state(SessionState::Ringing);
            }
            Ok(call_id) => {
                info!("Answered call {} from {}", call_id, call.remote);
                call.set_state(CallState::Answering);
            }
            Err(e) => {
                warn!("Call request to {} failed: {}", call.remote, e);
                self.fail(ErrorKind::ExternalCallError, e.to_string()).await;
            }
        }
    }

    /// Apply an event raised for `call_id`
    pub async fn handle_event(&mut self, call_id: CallId, event: MediaCallEvent) {
        match event {
            MediaCallEvent::IncomingOffer { remote } => self.on_offer(call_id, remote).await,
            MediaCallEvent::RemoteStreamReady(stream) => self.on_remote_stream(&call_id, stream),
            MediaCallEvent::Error(reason) => {
                if !self.is_current(&call_id) {
                    debug!("Ignoring error for stale call {}: {}", call_id, reason);
                    return;
                }
                warn!("Call {} failed: {}", call_id, reason);
                self.fail(ErrorKind::ExternalCallError, reason).await;
            }
            MediaCallEvent::Closed => {
                if !self.is_current(&call_id) {
                    debug!("Ignoring close of stale call {}", call_id);
                    return;
                }
                info!("Call {} closed by remote", call_id);
                self.teardown(false).await;
                self.notifier.state(SessionState::Closed);
            }
        }
    }

    async fn on_offer(&mut self, call_id: CallId, remote: PeerId) {
        let offer = IncomingCall {
            call: call_id,
            remote,
        };

        if let Some(current) = &self.current {
            warn!(
                "Declining call {} from {}: busy with {}",
                offer.call, offer.remote, current.remote
            );
            self.decline(offer).await;
            return;
        }

        info!("Incoming call {} from {}", offer.call, offer.remote);
        self.begin(
            offer.remote.clone(),
            CallDirection::Incoming,
            Some(offer.call.clone()),
            CallState::IncomingPendingConfirm,
        );
        self.notifier
            .notify(Notification::IncomingCall(offer.clone()));

        let decision = self.decider.as_ref().map(|decide| decide(&offer));
        if let Some(accept) = decision {
            if let Err(e) = self.confirm(accept).await {
                warn!("Could not apply decision for call {}: {}", offer.call, e);
            }
        }
    }

    fn on_remote_stream(&mut self, call_id: &str, stream: MediaStream) {
        let Some(call) = self
            .current
            .as_mut()
            .filter(|c| c.call_id.as_deref() == Some(call_id))
        else {
            debug!(
                "Releasing remote stream {} for stale call {}",
                stream.id(),
                call_id
            );
            return;
        };

        match call.state {
            CallState::OutgoingRinging | CallState::Answering => {
                let info = stream.info();
                call.remote_stream = Some(stream);
                call.set_state(CallState::Active);
                info!("Call {} with {} is active", call_id, call.remote);
                self.notifier.notify(Notification::RemoteStreamReady(info));
                self.notifier.state(SessionState::Active);
            }
            CallState::Active => {
                debug!(
                    "Ignoring duplicate remote stream {} on call {}",
                    stream.id(),
                    call_id
                );
            }
            other => {
                warn!(
                    "Remote stream on call {} in state {}, releasing",
                    call_id, other
                );
            }
        }
    }

    fn begin(
        &mut self,
        remote: PeerId,
        direction: CallDirection,
        call_id: Option<CallId>,
        state: CallState,
    ) -> u64 {
        self.next_attempt += 1;
        let attempt = self.next_attempt;

        debug!(
            "Call attempt {} with {} ({:?}) starts in {}",
            attempt, remote, direction, state
        );
        self.current = Some(MediaCall {
            attempt,
            call_id,
            remote,
            direction,
            state,
            local: None,
            remote_stream: None,
        });

        attempt
    }

    fn spawn_capture(&self, attempt: u64) {
        let capture = Arc::clone(&self.capture);
        let events = self.events.clone();
        let constraints = self.constraints;

        debug!(
            "Requesting local media {:?} for call attempt {}",
            constraints, attempt
        );
        tokio::spawn(async move {
            let result = capture.capture(constraints).await;
            if !events.capture_completed(attempt, result) {
                debug!("Orchestrator gone before capture {} completed", attempt);
            }
        });
    }

    fn is_current(&self, call_id: &str) -> bool {
        self.current
            .as_ref()
            .and_then(|c| c.call_id.as_deref())
            .is_some_and(|id| id == call_id)
    }

    async fn fail(&mut self, kind: ErrorKind, message: String) {
        self.teardown(true).await;
        self.notifier.error(kind, message);
    }

    async fn teardown(&mut self, close_transport: bool) -> bool {
        let Some(mut call) = self.current.take() else {
            return false;
        };

        if close_transport {
            if let Some(call_id) = &call.call_id {
                if let Err(e) = self.transport.close_call(call_id).await {
                    warn!("Failed to close call {}: {}", call_id, e);
                }
            }
        }

        call.set_state(CallState::Closed);
        call.release();
        self.last_state = CallState::Closed;
        info!(
            "Call attempt {} with {} closed",
            call.attempt, call.remote
        );

        true
    }
}
