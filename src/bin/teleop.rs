// Keyboard teleop: WASD move, Space stop, R/F speed, G report speed, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::info;

use rc_robot_runtime::config::{
    TOPIC_BACK, TOPIC_FORWARD, TOPIC_LEFT, TOPIC_RIGHT, TOPIC_SPEED, TOPIC_SPEED_GET,
    TOPIC_SPEED_SET, TOPIC_STOP,
};

const SPEEDS: [u16; 4] = [50, 100, 150, 200]; // duty steps
const DEFAULT_SPEED_IDX: usize = 1;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    // Optional router endpoint, e.g. tcp/192.168.4.91:7447
    let mut config = zenoh::Config::default();
    if let Some(endpoint) = std::env::args().nth(1) {
        config.insert_json5("mode", "\"client\"")?;
        config.insert_json5("connect/endpoints", &serde_json::to_string(&[endpoint])?)?;
    }

    info!("Opening Zenoh session...");
    let session = zenoh::open(config).await?;
    let replies = session.declare_subscriber(TOPIC_SPEED).await?;

    info!("Controls: WASD=move, Space=stop, R/F=speed, G=report speed, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&session, &replies).await;
    disable_raw_mode()?;

    // Never leave the robot driving after we are gone
    session.put(TOPIC_STOP, "").await?;
    session.close().await?;
    result
}

async fn run_teleop(
    session: &zenoh::Session,
    replies: &zenoh::pubsub::Subscriber<
        zenoh::handlers::FifoChannelHandler<zenoh::sample::Sample>,
    >,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx = DEFAULT_SPEED_IDX;

    loop {
        // Print any speed reports that came back
        while let Ok(Some(sample)) = replies.try_recv() {
            let payload = sample.payload().to_bytes();
            info!("Robot speed: {}", String::from_utf8_lossy(&payload));
        }

        if !event::poll(Duration::from_millis(20))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press && kind != KeyEventKind::Repeat {
            continue;
        }

        let topic = match code {
            KeyCode::Char('w') => TOPIC_FORWARD,
            KeyCode::Char('s') => TOPIC_BACK,
            KeyCode::Char('a') => TOPIC_LEFT,
            KeyCode::Char('d') => TOPIC_RIGHT,
            KeyCode::Char(' ') => TOPIC_STOP,

            // Speed control
            KeyCode::Char('r') => {
                speed_idx = (speed_idx + 1).min(SPEEDS.len() - 1);
                set_speed(session, SPEEDS[speed_idx]).await?;
                continue;
            }
            KeyCode::Char('f') => {
                speed_idx = speed_idx.saturating_sub(1);
                set_speed(session, SPEEDS[speed_idx]).await?;
                continue;
            }
            KeyCode::Char('g') => TOPIC_SPEED_GET,

            // Quit
            KeyCode::Char('q') | KeyCode::Esc => break,

            _ => continue,
        };
        session.put(topic, "").await?;
    }

    Ok(())
}

async fn set_speed(
    session: &zenoh::Session,
    speed: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Speed: {}", speed);
    session.put(TOPIC_SPEED_SET, speed.to_string()).await?;
    Ok(())
}
