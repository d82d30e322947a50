// Pin driver for the two drivetrain sides
//
// Each side has a forward and a backward line on the H-bridge. Without an
// enable pin the PWM duty goes straight onto the driven line; with one, the
// direction lines are plain digital outputs and the duty goes to enable.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::gpio::{GpioError, Level, PinBackend, Result};

/// Default pin layout (BCM numbering)
pub const LEFT_FORWARD_PIN: u8 = 17;
pub const LEFT_BACKWARD_PIN: u8 = 18;
pub const RIGHT_FORWARD_PIN: u8 = 22;
pub const RIGHT_BACKWARD_PIN: u8 = 23;

/// One of the two independently driven sides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorSide {
    Left,
    Right,
}

impl MotorSide {
    pub const ALL: [MotorSide; 2] = [MotorSide::Left, MotorSide::Right];
}

/// What a side is doing; at most one direction line is ever active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SideDrive {
    Forward(u16),
    Backward(u16),
    #[default]
    Brake,
}

impl SideDrive {
    /// Duty on the (forward, backward) lines
    pub fn levels(&self) -> (u16, u16) {
        match *self {
            SideDrive::Forward(duty) => (duty, 0),
            SideDrive::Backward(duty) => (0, duty),
            SideDrive::Brake => (0, 0),
        }
    }
}

/// Physical pins for one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidePins {
    pub forward: u8,
    pub backward: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable: Option<u8>,
}

impl SidePins {
    fn all(&self) -> impl Iterator<Item = u8> {
        [Some(self.forward), Some(self.backward), self.enable]
            .into_iter()
            .flatten()
    }
}

/// Side -> pin mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinLayout {
    pub left: SidePins,
    pub right: SidePins,
}

impl Default for PinLayout {
    fn default() -> Self {
        Self {
            left: SidePins {
                forward: LEFT_FORWARD_PIN,
                backward: LEFT_BACKWARD_PIN,
                enable: None,
            },
            right: SidePins {
                forward: RIGHT_FORWARD_PIN,
                backward: RIGHT_BACKWARD_PIN,
                enable: None,
            },
        }
    }
}

impl PinLayout {
    pub fn side(&self, side: MotorSide) -> &SidePins {
        match side {
            MotorSide::Left => &self.left,
            MotorSide::Right => &self.right,
        }
    }

    /// Every configured pin, in claim order
    pub fn pins(&self) -> Vec<u8> {
        self.left.all().chain(self.right.all()).collect()
    }

    /// First pin that appears more than once, if any
    pub fn duplicate_pin(&self) -> Option<u8> {
        let pins = self.pins();
        pins.iter()
            .enumerate()
            .find(|(i, pin)| pins[..*i].contains(pin))
            .map(|(_, &pin)| pin)
    }
}

/// Drives the H-bridge lines of both sides
pub struct PinDriver<B: PinBackend> {
    backend: B,
    layout: PinLayout,
    speed_max: u16,
}

impl<B: PinBackend> PinDriver<B> {
    /// Claim and configure every pin in the layout, then brake
    ///
    /// Any failure here means the board is unusable; nothing is retried.
    pub fn new(mut backend: B, layout: PinLayout, speed_max: u16) -> Result<Self> {
        info!("Initializing motor pins {:?} (duty range {})", layout.pins(), speed_max);

        if let Some(pin) = layout.duplicate_pin() {
            return Err(GpioError::DuplicatePin { pin });
        }

        for pin in layout.pins() {
            backend.set_output_mode(pin)?;
        }

        for side in MotorSide::ALL {
            for pin in Self::pwm_pins(layout.side(side)) {
                backend.configure_pwm_channel(pin, speed_max)?;
            }
        }

        let mut driver = Self {
            backend,
            layout,
            speed_max,
        };
        driver.brake_all()?;

        info!("Motor pins initialized");
        Ok(driver)
    }

    /// Lines carrying PWM for a side
    fn pwm_pins(pins: &SidePins) -> Vec<u8> {
        match pins.enable {
            Some(enable) => vec![enable],
            None => vec![pins.forward, pins.backward],
        }
    }

    /// Set one side's direction lines and duty
    pub fn set_side(&mut self, side: MotorSide, drive: SideDrive) -> Result<()> {
        let pins = *self.layout.side(side);
        let (forward, backward) = drive.levels();

        for (pin, duty) in [(pins.forward, forward), (pins.backward, backward)] {
            if duty > self.speed_max {
                return Err(GpioError::DutyOutOfRange {
                    pin,
                    duty,
                    range: self.speed_max,
                });
            }
        }

        debug!("{:?} side: {:?}", side, drive);

        match pins.enable {
            Some(enable) => {
                // Drop enable first so the bridge never sees a half-switched direction
                self.backend.write_pwm_duty(enable, 0)?;
                self.backend.write_digital(pins.forward, level_for(forward))?;
                self.backend.write_digital(pins.backward, level_for(backward))?;
                self.backend.write_pwm_duty(enable, forward.max(backward))?;
            }
            None => {
                // Release the inactive line before driving the active one
                if forward > 0 {
                    self.backend.write_pwm_duty(pins.backward, 0)?;
                    self.backend.write_pwm_duty(pins.forward, forward)?;
                } else {
                    self.backend.write_pwm_duty(pins.forward, 0)?;
                    self.backend.write_pwm_duty(pins.backward, backward)?;
                }
            }
        }
        Ok(())
    }

    /// Brake both sides (all lines low, duty 0)
    pub fn brake_all(&mut self) -> Result<()> {
        for side in MotorSide::ALL {
            self.set_side(side, SideDrive::Brake)?;
        }
        Ok(())
    }

    pub fn speed_max(&self) -> u16 {
        self.speed_max
    }
}

fn level_for(duty: u16) -> Level {
    if duty > 0 { Level::High } else { Level::Low }
}

impl<B: PinBackend> Drop for PinDriver<B> {
    fn drop(&mut self) {
        // Never leave the motors running when the driver goes away
        if let Err(e) = self.brake_all() {
            warn!("Failed to brake motors on drop: {}", e);
        }
    }
}
