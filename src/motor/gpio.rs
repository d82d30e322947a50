// GPIO/PWM primitives for the motor driver board
//
// The driver only ever needs four operations per physical pin:
// switch it to output, write a digital level, set up a PWM channel,
// and write a duty cycle. Pin numbers are BCM numbers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rppal::gpio::{Gpio, OutputPin};
use tracing::debug;

/// Default software PWM frequency (20 ms period, same as a 200-step softPwm range)
pub const DEFAULT_PWM_FREQUENCY_HZ: f64 = 50.0;

/// Digital output level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Level {
    #[default]
    Low,
    High,
}

/// Error types for GPIO/PWM access
#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[error("Pin {pin} is not configured as an output")]
    UnknownPin { pin: u8 },

    #[error("PWM channel for pin {pin} has not been configured")]
    PwmNotConfigured { pin: u8 },

    #[error("Duty {duty} out of range for pin {pin} (max {range})")]
    DutyOutOfRange { pin: u8, duty: u16, range: u16 },

    #[error("Pin {pin} is assigned more than once")]
    DuplicatePin { pin: u8 },
}

pub type Result<T> = std::result::Result<T, GpioError>;

/// Hardware layer the pin driver is built on
pub trait PinBackend {
    /// Claim a pin and switch it to output (driven low)
    fn set_output_mode(&mut self, pin: u8) -> Result<()>;

    /// Write a digital level to an output pin
    fn write_digital(&mut self, pin: u8, level: Level) -> Result<()>;

    /// Prepare a PWM channel on an output pin with duty range `[0, range]`
    fn configure_pwm_channel(&mut self, pin: u8, range: u16) -> Result<()>;

    /// Write a duty cycle in `[0, range]` to a configured PWM channel
    fn write_pwm_duty(&mut self, pin: u8, duty: u16) -> Result<()>;
}

/// Raspberry Pi backend using rppal software PWM
pub struct RppalPins {
    gpio: Gpio,
    frequency_hz: f64,
    outputs: HashMap<u8, OutputPin>,
    ranges: HashMap<u8, u16>,
}

impl RppalPins {
    /// Open the GPIO peripheral; software PWM runs at `frequency_hz`
    pub fn open_with_frequency(frequency_hz: f64) -> Result<Self> {
        let gpio = Gpio::new()?;
        Ok(Self {
            gpio,
            frequency_hz,
            outputs: HashMap::new(),
            ranges: HashMap::new(),
        })
    }

    fn output(&mut self, pin: u8) -> Result<&mut OutputPin> {
        self.outputs
            .get_mut(&pin)
            .ok_or(GpioError::UnknownPin { pin })
    }
}

impl PinBackend for RppalPins {
    fn set_output_mode(&mut self, pin: u8) -> Result<()> {
        if self.outputs.contains_key(&pin) {
            return Err(GpioError::DuplicatePin { pin });
        }
        let output = self.gpio.get(pin)?.into_output_low();
        debug!("Pin {} set to output", pin);
        self.outputs.insert(pin, output);
        Ok(())
    }

    fn write_digital(&mut self, pin: u8, level: Level) -> Result<()> {
        let output = self.output(pin)?;
        match level {
            Level::High => output.set_high(),
            Level::Low => output.set_low(),
        }
        Ok(())
    }

    fn configure_pwm_channel(&mut self, pin: u8, range: u16) -> Result<()> {
        let output = self.output(pin)?;
        // Start with the channel idle; software PWM only runs while duty > 0
        output.clear_pwm()?;
        output.set_low();
        self.ranges.insert(pin, range);
        debug!("PWM channel on pin {}: range {}", pin, range);
        Ok(())
    }

    fn write_pwm_duty(&mut self, pin: u8, duty: u16) -> Result<()> {
        let range = *self
            .ranges
            .get(&pin)
            .ok_or(GpioError::PwmNotConfigured { pin })?;
        if duty > range {
            return Err(GpioError::DutyOutOfRange { pin, duty, range });
        }

        let frequency_hz = self.frequency_hz;
        let output = self.output(pin)?;
        if duty == 0 {
            output.clear_pwm()?;
            output.set_low();
        } else if duty == range {
            output.clear_pwm()?;
            output.set_high();
        } else {
            output.set_pwm_frequency(frequency_hz, f64::from(duty) / f64::from(range))?;
        }
        Ok(())
    }
}

/// State of one simulated pin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinSnapshot {
    pub output: bool,
    pub level: Level,
    pub pwm_range: Option<u16>,
    pub duty: u16,
}

#[derive(Debug, Default)]
struct SimulatedState {
    pins: HashMap<u8, PinSnapshot>,
    missing: Vec<u8>,
    writes: usize,
}

/// In-memory backend for running without hardware
///
/// Clones share the same pin table, so a handle kept outside the driver
/// observes every write.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPins {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedPins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a board where the given pins cannot be claimed
    pub fn with_missing_pins(pins: &[u8]) -> Self {
        let sim = Self::new();
        sim.lock().missing = pins.to_vec();
        sim
    }

    /// Current state of a pin, if it has been claimed
    pub fn pin(&self, pin: u8) -> Option<PinSnapshot> {
        self.lock().pins.get(&pin).copied()
    }

    /// Duty written to a pin (0 for unknown pins)
    pub fn duty(&self, pin: u8) -> u16 {
        self.pin(pin).map(|p| p.duty).unwrap_or(0)
    }

    /// Digital level of a pin (low for unknown pins)
    pub fn level(&self, pin: u8) -> Level {
        self.pin(pin).map(|p| p.level).unwrap_or_default()
    }

    /// Number of digital and PWM writes so far
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PinBackend for SimulatedPins {
    fn set_output_mode(&mut self, pin: u8) -> Result<()> {
        let mut state = self.lock();
        if state.missing.contains(&pin) {
            return Err(GpioError::UnknownPin { pin });
        }
        if state.pins.get(&pin).is_some_and(|p| p.output) {
            return Err(GpioError::DuplicatePin { pin });
        }
        state.pins.insert(
            pin,
            PinSnapshot {
                output: true,
                ..PinSnapshot::default()
            },
        );
        Ok(())
    }

    fn write_digital(&mut self, pin: u8, level: Level) -> Result<()> {
        let mut state = self.lock();
        let snapshot = state
            .pins
            .get_mut(&pin)
            .ok_or(GpioError::UnknownPin { pin })?;
        snapshot.level = level;
        state.writes += 1;
        debug!("[sim] pin {} -> {:?}", pin, level);
        Ok(())
    }

    fn configure_pwm_channel(&mut self, pin: u8, range: u16) -> Result<()> {
        let mut state = self.lock();
        let snapshot = state
            .pins
            .get_mut(&pin)
            .ok_or(GpioError::UnknownPin { pin })?;
        snapshot.pwm_range = Some(range);
        snapshot.duty = 0;
        Ok(())
    }

    fn write_pwm_duty(&mut self, pin: u8, duty: u16) -> Result<()> {
        let mut state = self.lock();
        let snapshot = state
            .pins
            .get_mut(&pin)
            .ok_or(GpioError::UnknownPin { pin })?;
        let range = snapshot
            .pwm_range
            .ok_or(GpioError::PwmNotConfigured { pin })?;
        if duty > range {
            return Err(GpioError::DutyOutOfRange { pin, duty, range });
        }
        snapshot.duty = duty;
        snapshot.level = if duty > 0 { Level::High } else { Level::Low };
        state.writes += 1;
        debug!("[sim] pin {} duty {}/{}", pin, duty, range);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_pwm_write() {
        let mut sim = SimulatedPins::new();
        sim.set_output_mode(17).unwrap();
        sim.configure_pwm_channel(17, 200).unwrap();
        sim.write_pwm_duty(17, 120).unwrap();

        let pin = sim.pin(17).unwrap();
        assert!(pin.output);
        assert_eq!(pin.pwm_range, Some(200));
        assert_eq!(pin.duty, 120);
        assert_eq!(pin.level, Level::High);
        assert_eq!(sim.writes(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let handle = SimulatedPins::new();
        let mut backend = handle.clone();
        backend.set_output_mode(5).unwrap();
        backend.write_digital(5, Level::High).unwrap();
        assert_eq!(handle.level(5), Level::High);
    }

    #[test]
    fn test_write_requires_claimed_pin() {
        let mut sim = SimulatedPins::new();
        assert!(matches!(
            sim.write_digital(4, Level::High),
            Err(GpioError::UnknownPin { pin: 4 })
        ));
    }

    #[test]
    fn test_duty_requires_pwm_channel() {
        let mut sim = SimulatedPins::new();
        sim.set_output_mode(4).unwrap();
        assert!(matches!(
            sim.write_pwm_duty(4, 10),
            Err(GpioError::PwmNotConfigured { pin: 4 })
        ));
    }

    #[test]
    fn test_duty_above_range_rejected() {
        let mut sim = SimulatedPins::new();
        sim.set_output_mode(4).unwrap();
        sim.configure_pwm_channel(4, 200).unwrap();
        assert!(matches!(
            sim.write_pwm_duty(4, 201),
            Err(GpioError::DutyOutOfRange {
                pin: 4,
                duty: 201,
                range: 200
            })
        ));
        assert_eq!(sim.duty(4), 0);
    }

    #[test]
    fn test_missing_and_duplicate_pins() {
        let mut sim = SimulatedPins::with_missing_pins(&[18]);
        assert!(matches!(
            sim.set_output_mode(18),
            Err(GpioError::UnknownPin { pin: 18 })
        ));
        sim.set_output_mode(17).unwrap();
        assert!(matches!(
            sim.set_output_mode(17),
            Err(GpioError::DuplicatePin { pin: 17 })
        ));
    }
}
