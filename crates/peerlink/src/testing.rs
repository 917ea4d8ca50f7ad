//! Test doubles for the transport and capture boundaries
//!
//! Available to unit tests and, through the `test-util` feature, to
//! integration tests and downstream crates.

use crate::event::{CallId, ChannelId, EventSink, TransportEvent};
use crate::media::{MediaCapture, MediaConstraints, MediaStream, StreamInfo, StreamMonitor};
use crate::signaling::SignalingTransport;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// One request observed by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportRequest {
    /// `register`
    Register {
        /// Requested identity
        preferred: Option<String>,
    },
    /// `connect`
    Connect {
        /// Target peer
        remote: String,
    },
    /// `send`
    Send {
        /// Channel used
        channel: String,
        /// Payload text
        payload: String,
    },
    /// `close_channel`
    CloseChannel {
        /// Channel closed
        channel: String,
    },
    /// `call`
    Call {
        /// Target peer
        remote: String,
        /// Offered local stream
        stream: StreamInfo,
    },
    /// `answer`
    Answer {
        /// Call answered
        call: String,
        /// Answering local stream
        stream: StreamInfo,
    },
    /// `close_call`
    CloseCall {
        /// Call closed
        call: String,
    },
}

/// Transport that records every request and lets tests inject events
///
/// Channel and call ids are `chan-N` and `call-N`.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<TransportRequest>>,
    failing: AtomicBool,
    latency: Mutex<Duration>,
    next_id: AtomicU64,
    sink: Mutex<Option<EventSink>>,
    last_channel: Mutex<Option<ChannelId>>,
    last_call: Mutex<Option<CallId>>,
}

impl RecordingTransport {
    /// Transport that accepts every request
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests seen so far, in order
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests matching `predicate`
    pub fn count(&self, predicate: impl Fn(&TransportRequest) -> bool) -> usize {
        self.requests.lock().iter().filter(|r| predicate(r)).count()
    }

    /// Make subsequent requests fail with a signaling error (they are still recorded)
    pub fn fail_requests(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    /// Delay every subsequent request by `latency` before it is recorded
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Deliver an event through the sink handed over at registration
    ///
    /// Returns false if nothing registered yet or the receiver is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.emit(event),
            None => false,
        }
    }

    /// Complete registration with `id`
    pub fn open(&self, id: &str) -> bool {
        self.emit(TransportEvent::Open(id.to_string()))
    }

    /// Id returned by the latest `connect`
    pub fn last_channel_id(&self) -> Option<ChannelId> {
        self.last_channel.lock().clone()
    }

    /// Id returned by the latest `call`
    pub fn last_call_id(&self) -> Option<CallId> {
        self.last_call.lock().clone()
    }

    async fn record(&self, request: TransportRequest) -> Result<()> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.requests.lock().push(request);

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Signaling("injected transport failure".to_string()));
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl SignalingTransport for RecordingTransport {
    async fn register(&self, preferred: Option<&str>, events: EventSink) -> Result<()> {
        self.record(TransportRequest::Register {
            preferred: preferred.map(str::to_string),
        })
        .await?;
        *self.sink.lock() = Some(events);
        Ok(())
    }

    async fn connect(&self, remote: &str) -> Result<ChannelId> {
        self.record(TransportRequest::Connect {
            remote: remote.to_string(),
        })
        .await?;
        let id = self.next_id("chan");
        *self.last_channel.lock() = Some(id.clone());
        Ok(id)
    }

    async fn send(&self, channel: &str, payload: &str) -> Result<()> {
        self.record(TransportRequest::Send {
            channel: channel.to_string(),
            payload: payload.to_string(),
        })
        .await
    }

    async fn close_channel(&self, channel: &str) -> Result<()> {
        self.record(TransportRequest::CloseChannel {
            channel: channel.to_string(),
        })
        .await
    }

    async fn call(&self, remote: &str, local: &MediaStream) -> Result<CallId> {
        self.record(TransportRequest::Call {
            remote: remote.to_string(),
            stream: local.info(),
        })
        .await?;
        let id = self.next_id("call");
        *self.last_call.lock() = Some(id.clone());
        Ok(id)
    }

    async fn answer(&self, call: &str, local: &MediaStream) -> Result<()> {
        self.record(TransportRequest::Answer {
            call: call.to_string(),
            stream: local.info(),
        })
        .await
    }

    async fn close_call(&self, call: &str) -> Result<()> {
        self.record(TransportRequest::CloseCall {
            call: call.to_string(),
        })
        .await
    }
}

/// Capture whose completion tests control
///
/// A gated capture blocks until [`ScriptedCapture::release`] is called once per
/// request. Every produced stream can be observed through [`StreamMonitor`]s.
#[derive(Debug)]
pub struct ScriptedCapture {
    gate: Option<Semaphore>,
    denied: AtomicBool,
    requests: AtomicUsize,
    monitors: Mutex<Vec<StreamMonitor>>,
}

impl Default for ScriptedCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCapture {
    /// Capture that completes immediately
    pub fn new() -> Self {
        Self {
            gate: None,
            denied: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
            monitors: Mutex::new(Vec::new()),
        }
    }

    /// Capture that waits for [`ScriptedCapture::release`]
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    /// Let one pending capture complete
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// Deny subsequent requests
    pub fn deny(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }

    /// Number of capture requests seen
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Monitors for every stream produced so far
    pub fn monitors(&self) -> Vec<StreamMonitor> {
        self.monitors.lock().clone()
    }
}

#[async_trait]
impl MediaCapture for ScriptedCapture {
    async fn capture(&self, constraints: MediaConstraints) -> Result<MediaStream> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.map_err(|_| Error::Shutdown)?.forget();
        }

        if self.denied.load(Ordering::SeqCst) {
            return Err(Error::MediaAccessDenied("denied by test".to_string()));
        }

        let stream = MediaStream::new(constraints);
        self.monitors.lock().push(stream.monitor());
        Ok(stream)
    }
}
