use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use rc_robot_runtime::config::RobotConfig;
use rc_robot_runtime::motor::{PinBackend, RppalPins, SimulatedPins};
use rc_robot_runtime::runtime::{self, SessionMode, TransportConfig};

/// Drive a two-motor robot from direction/ and speed/ messages
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Robot config file (JSON); built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Zenoh endpoint to connect to (repeatable), e.g. tcp/192.168.4.91:7447
    #[arg(short = 'e', long = "connect")]
    connect: Vec<String>,

    /// Session mode; defaults to client when an endpoint is given
    #[arg(short, long, value_enum)]
    mode: Option<SessionMode>,

    /// Base zenoh config file
    #[arg(long)]
    zenoh_config: Option<PathBuf>,

    /// Run without GPIO hardware; pin writes are logged at debug level (RUST_LOG=debug)
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match RobotConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Config error ({}): {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => RobotConfig::default(),
    };

    let transport = TransportConfig {
        zenoh_config: args.zenoh_config,
        mode: args.mode,
        connect: args.connect,
    };

    let result = if args.simulate {
        info!("Using simulated GPIO");
        start(SimulatedPins::new(), &config, &transport).await
    } else {
        match RppalPins::open_with_frequency(config.pwm_frequency_hz) {
            Ok(pins) => start(pins, &config, &transport).await,
            Err(e) => Err(e.into()),
        }
    };

    if let Err(e) = result {
        error!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

/// Claim the pins, then hand the dispatcher to the message loop
async fn start<B: PinBackend>(
    pins: B,
    config: &RobotConfig,
    transport: &TransportConfig,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let dispatcher = runtime::build_dispatcher(pins, config)?;
    runtime::run(dispatcher, transport).await
}
