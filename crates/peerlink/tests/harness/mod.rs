//! Orchestrator test harness
//!
//! Wraps an [`Orchestrator`] wired to a [`RecordingTransport`] and a
//! [`ScriptedCapture`], plus helpers to run the event loop until it goes idle
//! and to inspect notifications.

#![allow(dead_code)]

use peerlink::testing::{RecordingTransport, ScriptedCapture, TransportRequest};
use peerlink::{
    MediaCallEvent, MediaConstraints, MediaStream, Notification, Orchestrator, OrchestratorConfig,
    OrchestratorHandle, SessionState, Snapshot, TransportEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// How long the event loop must stay quiet to count as settled
const IDLE: Duration = Duration::from_millis(20);

/// One endpoint under test
pub struct TestPeer {
    pub orch: Orchestrator,
    pub notes: UnboundedReceiver<Notification>,
    pub transport: Arc<RecordingTransport>,
    pub capture: Arc<ScriptedCapture>,
}

impl TestPeer {
    /// Peer with default configuration and an immediate capture
    pub async fn ready(id: &str) -> Self {
        Self::ready_with(id, OrchestratorConfig::default(), ScriptedCapture::new()).await
    }

    /// Peer whose identity `id` has been assigned
    pub async fn ready_with(id: &str, config: OrchestratorConfig, capture: ScriptedCapture) -> Self {
        let mut peer = Self::unregistered(config, capture);
        peer.orch.start().await.unwrap();
        assert!(peer.transport.open(id));
        peer.orch.wait_for_identity().await.unwrap();
        peer.drain();
        peer
    }

    /// Peer that has not requested an identity
    pub fn unregistered(config: OrchestratorConfig, capture: ScriptedCapture) -> Self {
        let transport = Arc::new(RecordingTransport::new());
        let capture = Arc::new(capture);
        let (orch, notes) =
            Orchestrator::new(config, transport.clone(), capture.clone()).unwrap();
        Self {
            orch,
            notes,
            transport,
            capture,
        }
    }

    /// Process events until none arrives for a short while
    pub async fn settle(&mut self) {
        while let Ok(true) = tokio::time::timeout(IDLE, self.orch.next_event()).await {}
    }

    /// Inject a transport event and process it
    pub async fn inject(&mut self, event: TransportEvent) {
        assert!(self.transport.emit(event), "transport not registered");
        self.settle().await;
    }

    /// Deliver a remote stream for the latest outgoing call
    pub async fn remote_answers(&mut self) {
        let call = self.transport.last_call_id().expect("no call placed");
        self.remote_stream(&call).await;
    }

    /// Deliver a remote stream for `call`
    pub async fn remote_stream(&mut self, call: &str) {
        self.inject(TransportEvent::Media {
            call: call.to_string(),
            event: MediaCallEvent::RemoteStreamReady(MediaStream::new(MediaConstraints::default())),
        })
        .await;
    }

    /// Open the latest outgoing data channel
    pub async fn channel_opens(&mut self) {
        let channel = self.transport.last_channel_id().expect("no channel requested");
        self.inject(TransportEvent::Channel {
            channel,
            event: peerlink::DataChannelEvent::Opened,
        })
        .await;
    }

    /// Requests other than registration
    pub fn session_requests(&self) -> Vec<TransportRequest> {
        self.transport
            .requests()
            .into_iter()
            .filter(|r| !matches!(r, TransportRequest::Register { .. }))
            .collect()
    }

    /// Notifications received so far
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut notes = Vec::new();
        while let Ok(note) = self.notes.try_recv() {
            notes.push(note);
        }
        notes
    }

    /// Session state notifications received so far
    pub fn states(&mut self) -> Vec<SessionState> {
        self.drain()
            .into_iter()
            .filter_map(|n| match n {
                Notification::SessionState(state) => Some(state),
                _ => None,
            })
            .collect()
    }
}

/// Poll snapshots of `handle` until `check` passes or a second goes by
pub async fn wait_for(handle: &OrchestratorHandle, check: impl Fn(&Snapshot) -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let snapshot = handle.snapshot().await.unwrap();
            if check(&snapshot) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not reached within 1s");
}
