// Motor control module for the two-sided drivetrain
//
// Provides:
// - GPIO/PWM backends (Raspberry Pi and simulated)
// - Pin driver mapping sides to H-bridge lines
// - Differential steering (motion -> per-side drive)

mod driver;
pub mod gpio;
pub mod motion;

pub use driver::{MotorSide, PinDriver, PinLayout, SideDrive, SidePins};
pub use gpio::{GpioError, PinBackend, RppalPins, SimulatedPins};
pub use motion::{DrivePattern, Motion, MotionController, TurnDrive, drive_pattern};
