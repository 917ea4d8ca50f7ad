//! In-process rendezvous hub
//!
//! Implements [`SignalingTransport`] for peers living in the same process:
//! identities are assigned on registration, connection and call offers are
//! relayed to the addressed peer and answered calls receive a mirrored remote
//! stream. Used by the demo CLI and end-to-end tests.

use super::SignalingTransport;
use crate::event::{
    CallId, ChannelId, DataChannelEvent, EventSink, MediaCallEvent, PeerId, TransportEvent,
};
use crate::media::{MediaConstraints, MediaStream};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared registry of in-process peers
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubState>>,
}

#[derive(Default)]
struct HubState {
    peers: HashMap<PeerId, EventSink>,
    channels: HashMap<ChannelId, Link>,
    calls: HashMap<CallId, CallLink>,
}

struct Link {
    initiator: PeerId,
    acceptor: PeerId,
}

impl Link {
    fn other(&self, me: &str) -> &PeerId {
        if self.initiator == me {
            &self.acceptor
        } else {
            &self.initiator
        }
    }
}

struct CallLink {
    link: Link,
    offered: MediaConstraints,
}

impl HubState {
    fn sink(&self, peer: &str) -> Result<EventSink> {
        self.peers
            .get(peer)
            .filter(|sink| !sink.is_closed())
            .cloned()
            .ok_or_else(|| Error::Signaling(format!("peer {} is unavailable", peer)))
    }
}

impl MemoryHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an endpoint that registers with this hub
    pub fn endpoint(&self) -> MemoryTransport {
        MemoryTransport {
            hub: self.clone(),
            local: Mutex::new(None),
        }
    }

    /// Number of registered peers
    pub fn peer_count(&self) -> usize {
        self.inner.lock().peers.len()
    }

    /// Number of data channels not yet closed
    pub fn channel_count(&self) -> usize {
        self.inner.lock().channels.len()
    }

    /// Number of calls not yet closed
    pub fn call_count(&self) -> usize {
        self.inner.lock().calls.len()
    }
}

/// One peer's connection to a [`MemoryHub`]
pub struct MemoryTransport {
    hub: MemoryHub,
    local: Mutex<Option<PeerId>>,
}

impl MemoryTransport {
    /// Identity assigned to this endpoint, once registered
    pub fn local_id(&self) -> Option<PeerId> {
        self.local.lock().clone()
    }

    fn require_local(&self) -> Result<PeerId> {
        self.local_id()
            .ok_or_else(|| Error::Signaling("endpoint is not registered".to_string()))
    }
}

#[async_trait]
impl SignalingTransport for MemoryTransport {
    async fn register(&self, preferred: Option<&str>, events: EventSink) -> Result<()> {
        let id = {
            let mut state = self.hub.inner.lock();
            let id = preferred
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            if state.peers.get(&id).is_some_and(|sink| !sink.is_closed()) {
                return Err(Error::Signaling(format!("peer id {} is already taken", id)));
            }

            state.peers.insert(id.clone(), events.clone());
            id
        };

        info!("Memory hub registered peer {}", id);
        *self.local.lock() = Some(id.clone());
        events.emit(TransportEvent::Open(id));

        Ok(())
    }

    async fn connect(&self, remote: &str) -> Result<ChannelId> {
        let local = self.require_local()?;
        let channel = uuid::Uuid::new_v4().to_string();

        let (local_sink, remote_sink) = {
            let mut state = self.hub.inner.lock();
            let remote_sink = state.sink(remote)?;
            let local_sink = state.sink(&local)?;
            state.channels.insert(
                channel.clone(),
                Link {
                    initiator: local.clone(),
                    acceptor: remote.to_string(),
                },
            );
            (local_sink, remote_sink)
        };

        debug!("Memory hub channel {}: {} -> {}", channel, local, remote);

        remote_sink.emit(TransportEvent::Connection {
            channel: channel.clone(),
            remote: local,
        });
        remote_sink.emit(TransportEvent::Channel {
            channel: channel.clone(),
            event: DataChannelEvent::Opened,
        });
        local_sink.emit(TransportEvent::Channel {
            channel: channel.clone(),
            event: DataChannelEvent::Opened,
        });

        Ok(channel)
    }

    async fn send(&self, channel: &str, payload: &str) -> Result<()> {
        let local = self.require_local()?;

        let sink = {
            let state = self.hub.inner.lock();
            let link = state
                .channels
                .get(channel)
                .ok_or_else(|| Error::Signaling(format!("channel {} is closed", channel)))?;
            state.sink(link.other(&local))?
        };

        sink.emit(TransportEvent::Channel {
            channel: channel.to_string(),
            event: DataChannelEvent::PayloadReceived(Bytes::copy_from_slice(payload.as_bytes())),
        });

        Ok(())
    }

    async fn close_channel(&self, channel: &str) -> Result<()> {
        let local = self.require_local()?;

        let sink = {
            let mut state = self.hub.inner.lock();
            match state.channels.remove(channel) {
                Some(link) => state.sink(link.other(&local)).ok(),
                None => None,
            }
        };

        if let Some(sink) = sink {
            debug!("Memory hub closed channel {}", channel);
            sink.emit(TransportEvent::Channel {
                channel: channel.to_string(),
                event: DataChannelEvent::Closed,
            });
        }

        Ok(())
    }

    async fn call(&self, remote: &str, local_stream: &MediaStream) -> Result<CallId> {
        let local = self.require_local()?;
        let call = uuid::Uuid::new_v4().to_string();

        let sink = {
            let mut state = self.hub.inner.lock();
            let sink = state.sink(remote)?;
            state.calls.insert(
                call.clone(),
                CallLink {
                    link: Link {
                        initiator: local.clone(),
                        acceptor: remote.to_string(),
                    },
                    offered: local_stream.constraints(),
                },
            );
            sink
        };

        debug!("Memory hub call {}: {} -> {}", call, local, remote);

        sink.emit(TransportEvent::Media {
            call: call.clone(),
            event: MediaCallEvent::IncomingOffer { remote: local },
        });

        Ok(call)
    }

    async fn answer(&self, call: &str, local_stream: &MediaStream) -> Result<()> {
        let local = self.require_local()?;

        let (caller_sink, callee_sink, offered) = {
            let state = self.hub.inner.lock();
            let link = state
                .calls
                .get(call)
                .ok_or_else(|| Error::Signaling(format!("call {} is closed", call)))?;
            (
                state.sink(link.link.other(&local))?,
                state.sink(&local)?,
                link.offered,
            )
        };

        caller_sink.emit(TransportEvent::Media {
            call: call.to_string(),
            event: MediaCallEvent::RemoteStreamReady(MediaStream::new(
                local_stream.constraints(),
            )),
        });
        callee_sink.emit(TransportEvent::Media {
            call: call.to_string(),
            event: MediaCallEvent::RemoteStreamReady(MediaStream::new(offered)),
        });

        Ok(())
    }

    async fn close_call(&self, call: &str) -> Result<()> {
        let local = self.require_local()?;

        let sink = {
            let mut state = self.hub.inner.lock();
            match state.calls.remove(call) {
                Some(link) => state.sink(link.link.other(&local)).ok(),
                None => None,
            }
        };

        if let Some(sink) = sink {
            debug!("Memory hub closed call {}", call);
            sink.emit(TransportEvent::Media {
                call: call.to_string(),
                event: MediaCallEvent::Closed,
            });
        }

        Ok(())
    }
}
