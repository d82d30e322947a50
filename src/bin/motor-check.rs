// Motor check: step-by-step test of the pin wiring
//
// Usage: cargo run --bin motor-check -- [config.json]
//
// Safety features:
// - Explicit confirmation before any motion
// - Low test speed, short pulses
// - Motors braked between steps and when the driver is dropped

use std::io::{self, Write};
use std::thread::sleep;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use rc_robot_runtime::config::RobotConfig;
use rc_robot_runtime::motor::motion::drive_pattern_with_turn;
use rc_robot_runtime::motor::{Motion, MotionController, MotorSide, PinDriver, RppalPins};

const TEST_DURATION: Duration = Duration::from_millis(400);
const PAUSE_DURATION: Duration = Duration::from_millis(600);

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    input.trim().eq_ignore_ascii_case("y")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::DEBUG.into())
                .from_env_lossy(),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => RobotConfig::load(path)?,
        None => RobotConfig::default(),
    };
    let test_speed = config.speed_max / 4;

    println!("Motor check (WITH MOTION)");
    println!("  Wheels must be OFF THE GROUND before proceeding.");
    println!();
    for side in MotorSide::ALL {
        let pins = config.pins.side(side);
        println!(
            "  {:?}: forward=BCM{} backward=BCM{} enable={}",
            side,
            pins.forward,
            pins.backward,
            pins.enable
                .map(|p| format!("BCM{}", p))
                .unwrap_or_else(|| "-".to_string())
        );
    }
    println!(
        "  Duty range 0..={}, test speed {}, PWM {} Hz",
        config.speed_max, test_speed, config.pwm_frequency_hz
    );
    println!();

    if !confirm("Are the robot's wheels OFF THE GROUND?") {
        println!("Please elevate the robot so the wheels can spin freely.");
        return Ok(());
    }

    // ========== STEP 1: Claim pins (motors braked) ==========
    println!("Step 1: Claiming pins...");
    let pins = RppalPins::open_with_frequency(config.pwm_frequency_hz)?;
    let driver = PinDriver::new(pins, config.pins, config.speed_max)?;
    let mut controller = MotionController::with_turn_drive(driver, config.turn_drive);
    println!("  ✓ All pins set to output, motors braked");
    println!();

    // ========== STEP 2: Motion sequence ==========
    println!("Step 2: Motion sequence");
    println!("  Each motion runs for {:?}, then brakes.", TEST_DURATION);
    println!();

    if !confirm("Proceed with motion test?") {
        controller.stop()?;
        return Ok(());
    }

    for motion in [Motion::Forward, Motion::Back, Motion::Left, Motion::Right] {
        let expected = drive_pattern_with_turn(motion, test_speed, config.turn_drive);
        println!(
            "  Testing {:?}: expect left={:?}, right={:?}",
            motion, expected.left, expected.right
        );

        controller.apply(motion, test_speed)?;
        sleep(TEST_DURATION);

        controller.stop()?;
        sleep(PAUSE_DURATION);
    }

    // ========== FINAL: Stop ==========
    println!();
    println!("Step 3: Braking...");
    controller.stop()?;
    println!("  ✓ Motors stopped");
    println!();
    println!("If every side moved as listed, the wiring matches the config.");
    println!("You can now run the runtime with: cargo run --bin rc-robot");

    Ok(())
}
