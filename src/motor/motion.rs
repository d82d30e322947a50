// Differential steering for the two-sided drivetrain
// Maps a motion command and speed to what each side should be doing.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::driver::{MotorSide, PinDriver, SideDrive};
use super::gpio::{PinBackend, Result};

/// Motion commands understood by the drivetrain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Forward,
    Back,
    Left,
    Right,
    Stop,
}

impl Motion {
    pub const ALL: [Motion; 5] = [
        Motion::Forward,
        Motion::Back,
        Motion::Left,
        Motion::Right,
        Motion::Stop,
    ];
}

/// Which line of the driven side turns the robot
///
/// The single driven side spins forward by default. Some chassis are wired so
/// the turning side has to run through its backward line instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDrive {
    #[default]
    Forward,
    Backward,
}

impl TurnDrive {
    fn drive(self, speed: u16) -> SideDrive {
        match self {
            TurnDrive::Forward => SideDrive::Forward(speed),
            TurnDrive::Backward => SideDrive::Backward(speed),
        }
    }
}

/// Per-side drive for one motion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrivePattern {
    pub left: SideDrive,
    pub right: SideDrive,
}

impl DrivePattern {
    pub fn new(left: SideDrive, right: SideDrive) -> Self {
        Self { left, right }
    }

    pub fn brake() -> Self {
        Self::default()
    }

    pub fn side(&self, side: MotorSide) -> SideDrive {
        match side {
            MotorSide::Left => self.left,
            MotorSide::Right => self.right,
        }
    }
}

/// Drive pattern for a motion at the given speed
///
/// Turning drives one side and brakes the other: `Left` drives the right
/// side, `Right` drives the left side.
pub fn drive_pattern(motion: Motion, speed: u16) -> DrivePattern {
    drive_pattern_with_turn(motion, speed, TurnDrive::Forward)
}

/// Drive pattern with a custom turning line
pub fn drive_pattern_with_turn(motion: Motion, speed: u16, turn: TurnDrive) -> DrivePattern {
    match motion {
        Motion::Forward => DrivePattern::new(SideDrive::Forward(speed), SideDrive::Forward(speed)),
        Motion::Back => DrivePattern::new(SideDrive::Backward(speed), SideDrive::Backward(speed)),
        Motion::Left => DrivePattern::new(SideDrive::Brake, turn.drive(speed)),
        Motion::Right => DrivePattern::new(turn.drive(speed), SideDrive::Brake),
        Motion::Stop => DrivePattern::brake(),
    }
}

/// Applies motions to the pin driver
pub struct MotionController<B: PinBackend> {
    driver: PinDriver<B>,
    turn: TurnDrive,
}

impl<B: PinBackend> MotionController<B> {
    pub fn new(driver: PinDriver<B>) -> Self {
        Self::with_turn_drive(driver, TurnDrive::default())
    }

    pub fn with_turn_drive(driver: PinDriver<B>, turn: TurnDrive) -> Self {
        Self { driver, turn }
    }

    /// Drive both sides for a motion; speed is clamped to the duty range
    pub fn apply(&mut self, motion: Motion, speed: u16) -> Result<DrivePattern> {
        let speed = speed.min(self.driver.speed_max());
        let pattern = drive_pattern_with_turn(motion, speed, self.turn);
        debug!("Applying {:?} @ {}: {:?}", motion, speed, pattern);

        for side in MotorSide::ALL {
            self.driver.set_side(side, pattern.side(side))?;
        }
        Ok(pattern)
    }

    /// Brake both sides immediately
    pub fn stop(&mut self) -> Result<()> {
        self.driver.brake_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::driver::{
        LEFT_BACKWARD_PIN, LEFT_FORWARD_PIN, PinLayout, RIGHT_BACKWARD_PIN, RIGHT_FORWARD_PIN,
    };
    use crate::motor::gpio::SimulatedPins;

    const SPEED_MAX: u16 = 200;

    fn expected(motion: Motion, speed: u16) -> (SideDrive, SideDrive) {
        use SideDrive::*;
        match motion {
            Motion::Forward => (Forward(speed), Forward(speed)),
            Motion::Back => (Backward(speed), Backward(speed)),
            Motion::Left => (Brake, Forward(speed)),
            Motion::Right => (Forward(speed), Brake),
            Motion::Stop => (Brake, Brake),
        }
    }

    #[test]
    fn test_pattern_table_every_speed() {
        for motion in Motion::ALL {
            for speed in 0..=SPEED_MAX {
                let pattern = drive_pattern(motion, speed);
                let (left, right) = expected(motion, speed);
                assert_eq!(pattern.left, left, "{:?} @ {} left", motion, speed);
                assert_eq!(pattern.right, right, "{:?} @ {} right", motion, speed);
            }
        }
    }

    #[test]
    fn test_turn_drive_backward() {
        let left = drive_pattern_with_turn(Motion::Left, 90, TurnDrive::Backward);
        assert_eq!(left, DrivePattern::new(SideDrive::Brake, SideDrive::Backward(90)));

        let right = drive_pattern_with_turn(Motion::Right, 90, TurnDrive::Backward);
        assert_eq!(right, DrivePattern::new(SideDrive::Backward(90), SideDrive::Brake));

        // Straight motion is unaffected
        assert_eq!(
            drive_pattern_with_turn(Motion::Forward, 90, TurnDrive::Backward),
            drive_pattern(Motion::Forward, 90)
        );
    }

    #[test]
    fn test_controller_writes_pins() {
        let sim = SimulatedPins::new();
        let driver = PinDriver::new(sim.clone(), PinLayout::default(), SPEED_MAX).unwrap();
        let mut controller = MotionController::new(driver);

        controller.apply(Motion::Right, 150).unwrap();
        assert_eq!(sim.duty(LEFT_FORWARD_PIN), 150);
        assert_eq!(sim.duty(LEFT_BACKWARD_PIN), 0);
        assert_eq!(sim.duty(RIGHT_FORWARD_PIN), 0);
        assert_eq!(sim.duty(RIGHT_BACKWARD_PIN), 0);

        controller.apply(Motion::Back, 60).unwrap();
        assert_eq!(sim.duty(LEFT_FORWARD_PIN), 0);
        assert_eq!(sim.duty(LEFT_BACKWARD_PIN), 60);
        assert_eq!(sim.duty(RIGHT_BACKWARD_PIN), 60);

        controller.stop().unwrap();
        for pin in [17, 18, 22, 23] {
            assert_eq!(sim.duty(pin), 0);
        }
    }

    #[test]
    fn test_controller_clamps_speed() {
        let sim = SimulatedPins::new();
        let driver = PinDriver::new(sim.clone(), PinLayout::default(), SPEED_MAX).unwrap();
        let mut controller = MotionController::new(driver);

        let pattern = controller.apply(Motion::Forward, 5000).unwrap();
        assert_eq!(pattern.left, SideDrive::Forward(SPEED_MAX));
        assert_eq!(sim.duty(RIGHT_FORWARD_PIN), SPEED_MAX);
    }
}
