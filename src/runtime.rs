// Message loop: zenoh subscriptions in, pin writes out
// Note: every message is handled on this one task, in arrival order, so the
// dispatcher (and the speed it owns) is never touched concurrently.

use std::error::Error;
use std::future::pending;
use std::path::PathBuf;

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

// local imports
use crate::config::{RobotConfig, TOPIC_DIRECTION_FILTER, TOPIC_SPEED, TOPIC_SPEED_FILTER};
use crate::dispatcher::{Dispatcher, SpeedSetting};
use crate::messages::{InboundMessage, OutgoingMessage};
use crate::motor::{GpioError, MotionController, PinBackend, PinDriver};

/// How the zenoh session joins the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SessionMode {
    Peer,
    Client,
}

impl SessionMode {
    fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Peer => "peer",
            SessionMode::Client => "client",
        }
    }
}

/// Transport settings for the zenoh session
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Base zenoh config file
    pub zenoh_config: Option<PathBuf>,
    pub mode: Option<SessionMode>,
    /// Endpoints to connect to, e.g. `tcp/192.168.4.91:7447`
    pub connect: Vec<String>,
}

impl TransportConfig {
    /// Build the zenoh config; a router endpoint implies client mode
    pub fn to_zenoh(&self) -> Result<zenoh::Config, Box<dyn Error + Send + Sync>> {
        let mut config = match &self.zenoh_config {
            Some(path) => zenoh::Config::from_file(path)?,
            None => zenoh::Config::default(),
        };

        let mode = match (self.mode, self.connect.is_empty()) {
            (Some(mode), _) => Some(mode),
            (None, false) => Some(SessionMode::Client),
            (None, true) => None,
        };
        if let Some(mode) = mode {
            config.insert_json5("mode", &serde_json::to_string(mode.as_str())?)?;
        }
        if !self.connect.is_empty() {
            config.insert_json5("connect/endpoints", &serde_json::to_string(&self.connect)?)?;
        }
        Ok(config)
    }
}

/// What ended the message loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
    Quit,
}

/// Set up pins and the dispatcher from the robot config
pub fn build_dispatcher<B: PinBackend>(
    backend: B,
    config: &RobotConfig,
) -> Result<Dispatcher<B>, GpioError> {
    let driver = PinDriver::new(backend, config.pins, config.speed_max)?;
    let controller = MotionController::with_turn_drive(driver, config.turn_drive);
    let speed = SpeedSetting::new(config.default_speed, config.speed_max);
    Ok(Dispatcher::new(controller, speed))
}

/// Read stdin on a plain thread; resolves when a `q` line is entered
///
/// A dedicated thread keeps a blocked read from holding up runtime shutdown.
fn spawn_quit_listener() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                    let _ = tx.send(());
                    return;
                }
                Ok(_) => continue,
                Err(_) => return,
            }
        }
    });
    rx
}

async fn shutdown_signal() -> ShutdownReason {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                pending::<()>().await;
            }
        }
    };

    // EOF on stdin (running as a service) is not a quit request
    let quit = async {
        if spawn_quit_listener().await.is_err() {
            pending::<()>().await;
        }
    };

    tokio::select! {
        _ = interrupt => ShutdownReason::Interrupt,
        _ = terminate => ShutdownReason::Terminate,
        _ = quit => ShutdownReason::Quit,
    }
}

/// Dispatch inbound messages until shutdown fires or the inbox closes
///
/// Shutdown is polled first, so once it fires no queued command is applied.
/// The motors are braked before this returns, whatever the outcome.
pub async fn pump<B, S, P, F>(
    dispatcher: &mut Dispatcher<B>,
    inbox: &mut mpsc::UnboundedReceiver<InboundMessage>,
    shutdown: S,
    mut publish: P,
) -> Result<ShutdownReason, Box<dyn Error + Send + Sync>>
where
    B: PinBackend,
    S: Future<Output = ShutdownReason>,
    P: FnMut(OutgoingMessage) -> F,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let result = loop {
        let msg = tokio::select! {
            biased;
            reason = &mut shutdown => {
                info!("Shutdown requested ({:?})", reason);
                break Ok(reason);
            }
            msg = inbox.recv() => msg,
        };

        let Some(msg) = msg else {
            error!("Subscriptions closed");
            break Err("subscriptions closed".into());
        };

        if let Some(reply) = dispatcher.handle(&msg.topic, &msg.payload) {
            publish(reply).await;
        }
    };

    dispatcher.emergency_stop();
    result
}

pub async fn run<B: PinBackend>(
    mut dispatcher: Dispatcher<B>,
    transport: &TransportConfig,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(transport.to_zenoh()?).await?;

    // Both subscriptions feed one inbox, in arrival order
    info!("Setting up subscribers...");
    let (inbox_tx, mut inbox) = mpsc::unbounded_channel();
    let mut subscribers = Vec::new();
    for filter in [TOPIC_DIRECTION_FILTER, TOPIC_SPEED_FILTER] {
        let tx = inbox_tx.clone();
        let subscriber = session
            .declare_subscriber(filter)
            .callback(move |sample| {
                let topic = sample.key_expr().as_str();
                let _ = tx.send(InboundMessage::new(topic, sample.payload().to_bytes()));
            })
            .await?;
        subscribers.push(subscriber);
    }
    drop(inbox_tx);

    info!("Subscribed to: {}, {}", TOPIC_DIRECTION_FILTER, TOPIC_SPEED_FILTER);
    info!("Speed reports on: {}", TOPIC_SPEED);
    info!(
        "Runtime started at speed {} (Ctrl-C or Q<Enter> to quit)",
        dispatcher.speed()
    );

    let session_ref = &session;
    let result = pump(
        &mut dispatcher,
        &mut inbox,
        shutdown_signal(),
        move |reply: OutgoingMessage| async move {
            if let Err(e) = session_ref.put(reply.topic.as_str(), reply.payload).await {
                warn!("Failed to publish on {}: {}", reply.topic, e);
            }
        },
    )
    .await;

    // Motors are already braked; now tear down the transport
    drop(subscribers);
    if let Err(e) = session.close().await {
        warn!("Failed to close Zenoh session: {}", e);
    }
    result.map(|_| ())
}
