// Topics, speed limits, pin layout
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::motor::gpio::DEFAULT_PWM_FREQUENCY_HZ;
use crate::motor::{PinLayout, TurnDrive};

// Topic filters the runtime subscribes to
pub const TOPIC_DIRECTION_FILTER: &str = "direction/**";
pub const TOPIC_SPEED_FILTER: &str = "speed/**";

// Command topics
pub const TOPIC_FORWARD: &str = "direction/forward";
pub const TOPIC_BACK: &str = "direction/back";
pub const TOPIC_LEFT: &str = "direction/left";
pub const TOPIC_RIGHT: &str = "direction/right";
pub const TOPIC_STOP: &str = "direction/stop";
pub const TOPIC_SPEED_SET: &str = "speed/set";
pub const TOPIC_SPEED_GET: &str = "speed/get";

// Reply topic for the speed report
pub const TOPIC_SPEED: &str = "speed";

// Upper bound of the duty range and of any commanded speed
pub const SPEED_MAX: u16 = 200;

// Speed used for motion commands until a speed/set arrives
pub const DEFAULT_SPEED: u16 = 100;

/// Error types for loading the robot configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Hardware and speed settings, loadable from a JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub speed_max: u16,
    pub default_speed: u16,
    pub pwm_frequency_hz: f64,
    pub turn_drive: TurnDrive,
    pub pins: PinLayout,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            speed_max: SPEED_MAX,
            default_speed: DEFAULT_SPEED,
            pwm_frequency_hz: DEFAULT_PWM_FREQUENCY_HZ,
            turn_drive: TurnDrive::default(),
            pins: PinLayout::default(),
        }
    }
}

impl RobotConfig {
    /// Load and validate a config file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.speed_max == 0 {
            return Err(ConfigError::Invalid("speed_max must be positive".into()));
        }
        if self.default_speed > self.speed_max {
            return Err(ConfigError::Invalid(format!(
                "default_speed {} exceeds speed_max {}",
                self.default_speed, self.speed_max
            )));
        }
        if !(self.pwm_frequency_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "pwm_frequency_hz must be positive, got {}",
                self.pwm_frequency_hz
            )));
        }
        if let Some(pin) = self.pins.duplicate_pin() {
            return Err(ConfigError::Invalid(format!(
                "pin {} is assigned more than once",
                pin
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = RobotConfig::default();
        config.validate().unwrap();
        assert_eq!(config.speed_max, 200);
        assert_eq!(config.default_speed, 100);
        assert_eq!(config.pins.pins(), vec![17, 18, 22, 23]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = RobotConfig::from_json(r#"{ "default_speed": 60, "turn_drive": "backward" }"#)
            .unwrap();
        assert_eq!(config.default_speed, 60);
        assert_eq!(config.speed_max, SPEED_MAX);
        assert_eq!(config.turn_drive, TurnDrive::Backward);
        assert_eq!(config.pins, PinLayout::default());
    }

    #[test]
    fn test_enable_pins_from_json() {
        let config = RobotConfig::from_json(
            r#"{
                "pins": {
                    "left": { "forward": 5, "backward": 6, "enable": 12 },
                    "right": { "forward": 20, "backward": 21, "enable": 13 }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.pins.left.enable, Some(12));
        assert_eq!(config.pins.right.forward, 20);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let cases = [
            r#"{ "speed_max": 0 }"#,
            r#"{ "speed_max": 50, "default_speed": 100 }"#,
            r#"{ "pwm_frequency_hz": 0.0 }"#,
            r#"{ "pins": { "left": { "forward": 4, "backward": 4 },
                           "right": { "forward": 22, "backward": 23 } } }"#,
        ];
        for case in cases {
            assert!(
                matches!(RobotConfig::from_json(case), Err(ConfigError::Invalid(_))),
                "accepted: {}",
                case
            );
        }
    }

    #[test]
    fn test_example_file_matches_defaults() {
        let config = RobotConfig::from_json(include_str!("../robot.example.json")).unwrap();
        assert_eq!(config, RobotConfig::default());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            RobotConfig::from_json("{ speed_max: }"),
            Err(ConfigError::Parse(_))
        ));
    }
}
