//! Actor front-end for a spawned orchestrator

use super::orchestrator::Orchestrator;
use crate::call::CallState;
use crate::channels::Message;
use crate::event::PeerId;
use crate::signaling::LocalIdentity;
use crate::{Error, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

const COMMAND_QUEUE_DEPTH: usize = 32;

/// Presentation-relevant state at one point in time
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Local identity, once assigned
    pub identity: Option<LocalIdentity>,
    /// State of the live or last call
    pub call_state: CallState,
    /// Remote peer of the current session
    pub session: Option<PeerId>,
    /// Whether messages can be sent
    pub channel_open: bool,
    /// Message log in observed order
    pub messages: Vec<Message>,
}

enum Command {
    StartSession {
        remote: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SendMessage {
        text: String,
        reply: oneshot::Sender<Result<Message>>,
    },
    EndSession {
        reply: oneshot::Sender<()>,
    },
    ConfirmIncomingCall {
        accept: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
}

/// Cloneable handle to an orchestrator running in its own task
///
/// The task ends, tearing the session down, once every handle is dropped.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<Command>,
}

impl OrchestratorHandle {
    /// See [`Orchestrator::start_session`]
    pub async fn start_session(&self, remote: impl Into<String>) -> Result<()> {
        let remote = remote.into();
        self.request(|reply| Command::StartSession { remote, reply })
            .await?
    }

    /// See [`Orchestrator::send_message`]
    pub async fn send_message(&self, text: impl Into<String>) -> Result<Message> {
        let text = text.into();
        self.request(|reply| Command::SendMessage { text, reply })
            .await?
    }

    /// See [`Orchestrator::end_session`]
    pub async fn end_session(&self) -> Result<()> {
        self.request(|reply| Command::EndSession { reply }).await
    }

    /// See [`Orchestrator::confirm_incoming_call`]
    pub async fn confirm_incoming_call(&self, accept: bool) -> Result<()> {
        self.request(|reply| Command::ConfirmIncomingCall { accept, reply })
            .await?
    }

    /// Current state of the orchestrator
    pub async fn snapshot(&self) -> Result<Snapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Whether the orchestrator task has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| Error::Shutdown)?;
        rx.await.map_err(|_| Error::Shutdown)
    }
}

impl Orchestrator {
    /// Run the orchestrator as a task and return a handle to it
    ///
    /// Registration is requested first if [`Orchestrator::start`] was not
    /// called yet.
    pub fn spawn(self) -> OrchestratorHandle {
        self.spawn_with_join().0
    }

    /// Like [`Orchestrator::spawn`], also returning the task's join handle
    pub fn spawn_with_join(self) -> (OrchestratorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let task = tokio::spawn(self.run(rx));
        (OrchestratorHandle { tx }, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        if let Err(e) = self.start().await {
            error!("Identity registration failed: {}", e);
        }
        info!("Orchestrator task running");

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => self.execute(command).await,
                        None => {
                            debug!("All orchestrator handles dropped");
                            break;
                        }
                    }
                }
                event = self.inbound.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
            }
        }

        self.end_session().await;
        info!("Orchestrator task stopped");
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::StartSession { remote, reply } => {
                let _ = reply.send(self.start_session(&remote).await);
            }
            Command::SendMessage { text, reply } => {
                let _ = reply.send(self.send_message(&text).await);
            }
            Command::EndSession { reply } => {
                self.end_session().await;
                let _ = reply.send(());
            }
            Command::ConfirmIncomingCall { accept, reply } => {
                let _ = reply.send(self.confirm_incoming_call(accept).await);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::testing::{RecordingTransport, ScriptedCapture, TransportRequest};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_handle_drives_orchestrator() {
        let transport = Arc::new(RecordingTransport::new());
        let (orch, _rx) = Orchestrator::new(
            OrchestratorConfig::default(),
            transport.clone(),
            Arc::new(ScriptedCapture::new()),
        )
        .unwrap();
        let handle = orch.spawn();

        assert!(matches!(
            handle.start_session("xyz789").await,
            Err(Error::IdentityNotReady)
        ));

        assert!(transport.open("abc123"));
        let mut identity = None;
        for _ in 0..50 {
            identity = handle.snapshot().await.unwrap().identity;
            if identity.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(identity.unwrap().as_str(), "abc123");

        handle.start_session("xyz789").await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.session.as_deref(), Some("xyz789"));
        assert!(!snapshot.channel_open);
        assert!(matches!(
            handle.send_message("hi").await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            handle.confirm_incoming_call(true).await,
            Err(Error::NoPendingCall)
        ));
        assert_eq!(
            transport.count(|r| matches!(r, TransportRequest::Connect { remote } if remote == "xyz789")),
            1
        );
    }

    #[tokio::test]
    async fn test_dropping_handles_tears_down() {
        let transport = Arc::new(RecordingTransport::new());
        let (orch, _rx) = Orchestrator::new(
            OrchestratorConfig::default(),
            transport.clone(),
            Arc::new(ScriptedCapture::new()),
        )
        .unwrap();
        let (handle, task) = orch.spawn_with_join();

        // Registration has happened once the task answers
        handle.snapshot().await.unwrap();
        assert!(transport.open("abc123"));
        let mut started = false;
        for _ in 0..50 {
            if handle.start_session("xyz789").await.is_ok() {
                started = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(started);

        let second = handle.clone();
        drop(handle);
        second.end_session().await.unwrap();
        drop(second);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            transport.count(|r| matches!(r, TransportRequest::CloseChannel { .. })),
            1
        );
    }
}
