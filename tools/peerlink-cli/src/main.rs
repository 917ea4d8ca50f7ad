//! PeerLink demo - two in-process peers over the memory rendezvous hub
//!
//! # Usage
//!
//! ```bash
//! # Call, chat and hang up with default identities abc123 -> xyz789
//! peerlink-cli demo -m "hello" -m "hi back"
//!
//! # Callee rejects the call; chat still works
//! peerlink-cli demo --reject -m "text only then"
//!
//! # Caller denies camera access
//! peerlink-cli demo --deny-camera
//!
//! # Configuration from a JSON file, overridden from the environment
//! PEERLINK_CHANNEL_POLICY=reject peerlink-cli --config peerlink.json demo --audio-only
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use peerlink::{
    CallState, IncomingChannelPolicy, MediaCapture, MemoryHub, Notification, Orchestrator,
    OrchestratorConfig, OrchestratorHandle, Origin, SessionState, Snapshot, SyntheticCapture,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// PeerLink - direct text and audio/video sessions between two peers
#[derive(Parser)]
#[command(name = "peerlink-cli")]
#[command(author, version)]
#[command(about = "Run PeerLink sessions between in-process peers")]
struct Cli {
    /// Increase verbosity (-v, -vv); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON configuration file applied to every peer
    #[arg(long, global = true, env = "PEERLINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect two peers, exchange messages, then hang up
    Demo(DemoArgs),
}

#[derive(Args)]
struct DemoArgs {
    /// Message to send; repeat to alternate caller and callee
    #[arg(short = 'm', long = "message")]
    messages: Vec<String>,

    /// Callee rejects the incoming call
    #[arg(long)]
    reject: bool,

    /// Caller denies camera/microphone access
    #[arg(long)]
    deny_camera: bool,

    /// Capture audio without video
    #[arg(long)]
    audio_only: bool,

    /// Seconds to wait for the rendezvous identity (1-300)
    #[arg(long, env = "PEERLINK_IDENTITY_TIMEOUT_SECS")]
    identity_timeout_secs: Option<u64>,

    /// Inbound channel handling while busy: replace_and_close or reject_while_busy
    #[arg(long, env = "PEERLINK_CHANNEL_POLICY")]
    channel_policy: Option<IncomingChannelPolicy>,

    /// Identity requested by the calling peer
    #[arg(long, default_value = "abc123")]
    caller_id: String,

    /// Identity requested by the called peer
    #[arg(long, default_value = "xyz789")]
    callee_id: String,

    /// Simulated permission-prompt delay in milliseconds
    #[arg(long, default_value_t = 50)]
    capture_latency_ms: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("peerlink-worker")
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Command::Demo(args) => run_demo(cli.config.as_deref(), args).await,
        }
    })
}

fn load_config(path: Option<&Path>, args: &DemoArgs) -> Result<OrchestratorConfig> {
    let mut config = match path {
        Some(path) => OrchestratorConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => OrchestratorConfig::default(),
    };

    if let Some(secs) = args.identity_timeout_secs {
        config.identity_timeout_secs = secs;
    }
    if let Some(policy) = args.channel_policy {
        config.incoming_channel_policy = policy;
    }
    if args.audio_only {
        config.media = peerlink::MediaConstraints::audio_only();
    }

    config.validate().context("Invalid configuration")?;
    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

async fn run_demo(config_path: Option<&Path>, args: DemoArgs) -> Result<()> {
    let config = load_config(config_path, &args)?;
    let hub = MemoryHub::new();
    let latency = Duration::from_millis(args.capture_latency_ms);

    let caller_capture = SyntheticCapture::with_latency(latency);
    caller_capture.set_denied(args.deny_camera);

    let (caller, caller_notes) = launch(
        &hub,
        &args.caller_id,
        config.clone(),
        Arc::new(caller_capture),
        None,
    )
    .await?;
    let (callee, callee_notes) = launch(
        &hub,
        &args.callee_id,
        config,
        Arc::new(SyntheticCapture::with_latency(latency)),
        Some(!args.reject),
    )
    .await?;

    let printers = vec![
        print_notifications(args.caller_id.clone(), caller_notes),
        print_notifications(args.callee_id.clone(), callee_notes),
    ];

    caller
        .start_session(args.callee_id.as_str())
        .await
        .with_context(|| format!("Failed to start session with {}", args.callee_id))?;

    let settled = wait_until(&caller, |s| {
        s.channel_open && matches!(s.call_state, CallState::Active | CallState::Closed)
    })
    .await?;
    println!(
        "Session with {} settled: call {}",
        args.callee_id, settled.call_state
    );

    for (i, text) in args.messages.iter().enumerate() {
        let sender = if i % 2 == 0 { &caller } else { &callee };
        if let Err(e) = sender.send_message(text.as_str()).await {
            warn!("Message {} not sent: {}", i + 1, e);
        }
    }

    let expected = args.messages.len();
    let transcript = wait_until(&caller, |s| s.messages.len() >= expected).await?;
    println!("Transcript ({} messages):", transcript.messages.len());
    for message in &transcript.messages {
        let who = match message.origin {
            Origin::Local => args.caller_id.as_str(),
            Origin::Remote => args.callee_id.as_str(),
        };
        println!("  #{} {}: {}", message.sequence, who, message.payload);
    }

    caller.end_session().await?;
    info!("Session ended, shutting peers down");

    drop(caller);
    drop(callee);
    for printer in printers {
        if tokio::time::timeout(Duration::from_secs(1), printer)
            .await
            .is_err()
        {
            warn!("Notification printer did not finish");
        }
    }

    Ok(())
}

async fn launch(
    hub: &MemoryHub,
    id: &str,
    mut config: OrchestratorConfig,
    capture: Arc<dyn MediaCapture>,
    accept_calls: Option<bool>,
) -> Result<(OrchestratorHandle, UnboundedReceiver<Notification>)> {
    config.preferred_peer_id = Some(id.to_string());

    let (mut orchestrator, notes) = Orchestrator::new(config, Arc::new(hub.endpoint()), capture)?;
    if let Some(accept) = accept_calls {
        orchestrator.on_incoming_call(move |offer| {
            info!(
                "{} incoming call from {}",
                if accept { "Accepting" } else { "Rejecting" },
                offer.remote
            );
            accept
        });
    }

    orchestrator.start().await?;
    let identity = orchestrator
        .wait_for_identity()
        .await
        .with_context(|| format!("Peer {} never came online", id))?;
    println!("Peer {} is online", identity);

    Ok((orchestrator.spawn(), notes))
}

async fn wait_until(
    handle: &OrchestratorHandle,
    done: impl Fn(&Snapshot) -> bool,
) -> Result<Snapshot> {
    let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;

    loop {
        let snapshot = handle.snapshot().await?;
        if done(&snapshot) {
            return Ok(snapshot);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!(
                "Session did not settle within {:?} (call {})",
                SETTLE_TIMEOUT,
                snapshot.call_state
            );
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn print_notifications(
    label: String,
    mut notes: UnboundedReceiver<Notification>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(note) = notes.recv().await {
            println!("[{}] {}", label, describe(&note));
        }
    })
}

fn describe(note: &Notification) -> String {
    match note {
        Notification::IdentityReady(id) => format!("identity ready: {}", id),
        Notification::MessageAppended(m) => {
            format!("message #{} ({:?}): {}", m.sequence, m.origin, m.payload)
        }
        Notification::LocalStreamReady(s) => {
            format!("local preview {} (audio: {}, video: {})", s.id, s.audio, s.video)
        }
        Notification::RemoteStreamReady(s) => {
            format!("remote stream {} (audio: {}, video: {})", s.id, s.audio, s.video)
        }
        Notification::IncomingCall(c) => format!("incoming call from {}", c.remote),
        Notification::IncomingCallDeclined(c) => {
            format!("declined call from {} (busy)", c.remote)
        }
        Notification::ChannelOpened { remote } => format!("chat open with {}", remote),
        Notification::ChannelClosed { remote } => format!("chat closed with {}", remote),
        Notification::SessionState(SessionState::Error { kind, message }) => {
            format!("session error ({}): {}", kind, message)
        }
        Notification::SessionState(state) => format!("session {:?}", state),
    }
}
