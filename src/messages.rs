// Message types for the runtime

use std::num::IntErrorKind;
use std::str;

use crate::config::{
    TOPIC_BACK, TOPIC_FORWARD, TOPIC_LEFT, TOPIC_RIGHT, TOPIC_SPEED, TOPIC_SPEED_GET,
    TOPIC_SPEED_SET, TOPIC_STOP,
};
use crate::motor::Motion;

/// Command decoded from an inbound topic and payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Drive(Motion),
    /// Raw requested speed, not yet clamped to the duty range
    SetSpeed(i64),
    GetSpeed,
    /// Anything else under `speed`, deliberately ignored
    Ignore,
}

/// Error types for decoding commands
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Malformed speed payload {payload:?}")]
    MalformedSpeed { payload: String },
}

impl Command {
    /// Decode a topic + payload
    ///
    /// Unknown topics decode to `Drive(Stop)` so a stray message always halts
    /// the robot.
    pub fn decode(topic: &str, payload: &[u8]) -> Result<Self, CommandError> {
        let cmd = match topic {
            TOPIC_FORWARD => Command::Drive(Motion::Forward),
            TOPIC_BACK => Command::Drive(Motion::Back),
            TOPIC_LEFT => Command::Drive(Motion::Left),
            TOPIC_RIGHT => Command::Drive(Motion::Right),
            TOPIC_STOP => Command::Drive(Motion::Stop),
            TOPIC_SPEED_SET => Command::SetSpeed(parse_speed(payload)?),
            TOPIC_SPEED_GET => Command::GetSpeed,
            t if t.starts_with(TOPIC_SPEED) => Command::Ignore,
            _ => Command::Drive(Motion::Stop),
        };
        Ok(cmd)
    }
}

/// Parse a decimal speed payload, surrounding whitespace allowed
///
/// Integers too large for `i64` saturate; clamping to the duty range is the
/// caller's job.
fn parse_speed(payload: &[u8]) -> Result<i64, CommandError> {
    let malformed = || CommandError::MalformedSpeed {
        payload: String::from_utf8_lossy(payload).into_owned(),
    };
    let text = str::from_utf8(payload).map_err(|_| malformed())?.trim();
    match text.parse::<i64>() {
        Ok(speed) => Ok(speed),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(i64::MAX),
            IntErrorKind::NegOverflow => Ok(i64::MIN),
            _ => Err(malformed()),
        },
    }
}

/// Message received from the transport, copied out of the sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Reply published back over the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub topic: String,
    pub payload: String,
}

impl OutgoingMessage {
    /// Speed report, decimal payload on the `speed` topic
    pub fn speed_report(speed: u16) -> Self {
        Self {
            topic: TOPIC_SPEED.to_string(),
            payload: speed.to_string(),
        }
    }
}
