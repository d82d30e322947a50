// Command dispatch: topic -> motion or speed change
//
// The dispatcher owns the configured speed. It is driven from a single task,
// one message at a time, so no locking is needed around the speed.

use tracing::{error, info, warn};

use crate::config::TOPIC_STOP;
use crate::messages::{Command, OutgoingMessage};
use crate::motor::{Motion, MotionController, PinBackend};

/// Configured speed for motion commands, always within `[0, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedSetting {
    configured: u16,
    max: u16,
}

impl SpeedSetting {
    pub fn new(initial: u16, max: u16) -> Self {
        Self {
            configured: initial.min(max),
            max,
        }
    }

    pub fn get(&self) -> u16 {
        self.configured
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    /// Store a requested speed, clamped into range; returns the stored value
    pub fn set(&mut self, requested: i64) -> u16 {
        let clamped = requested.clamp(0, i64::from(self.max)) as u16;
        if i64::from(clamped) != requested {
            warn!(
                "Requested speed {} outside [0, {}], clamped to {}",
                requested, self.max, clamped
            );
        }
        self.configured = clamped;
        clamped
    }
}

pub struct Dispatcher<B: PinBackend> {
    controller: MotionController<B>,
    speed: SpeedSetting,
}

impl<B: PinBackend> Dispatcher<B> {
    pub fn new(controller: MotionController<B>, speed: SpeedSetting) -> Self {
        Self { controller, speed }
    }

    /// Handle one inbound message; returns a reply to publish, if any
    pub fn handle(&mut self, topic: &str, payload: &[u8]) -> Option<OutgoingMessage> {
        let cmd = match Command::decode(topic, payload) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("Rejected command on {}: {}", topic, e);
                return None;
            }
        };

        match cmd {
            Command::Drive(motion) => {
                match motion {
                    Motion::Forward => info!("Moving forward..."),
                    Motion::Back => info!("Moving backward..."),
                    Motion::Left => info!("Turning left..."),
                    Motion::Right => info!("Turning right..."),
                    Motion::Stop if topic == TOPIC_STOP => info!("Stop"),
                    Motion::Stop => warn!("Unknown command on {:?}, stopping", topic),
                }
                self.drive(motion);
                None
            }
            Command::SetSpeed(requested) => {
                let speed = self.speed.set(requested);
                info!("Set speed configuration: {}", speed);
                None
            }
            Command::GetSpeed => {
                info!("Reporting speed configuration: {}", self.speed.get());
                Some(OutgoingMessage::speed_report(self.speed.get()))
            }
            Command::Ignore => None,
        }
    }

    fn drive(&mut self, motion: Motion) {
        let speed = match motion {
            Motion::Stop => 0,
            _ => self.speed.get(),
        };
        if let Err(e) = self.controller.apply(motion, speed) {
            error!("Failed to apply {:?}: {}", motion, e);
        }
    }

    /// Brake everything right away (shutdown path)
    pub fn emergency_stop(&mut self) {
        info!("Braking all motors");
        if let Err(e) = self.controller.stop() {
            error!("Failed to brake motors: {}", e);
        }
    }

    pub fn speed(&self) -> u16 {
        self.speed.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::gpio::SimulatedPins;
    use crate::motor::{PinDriver, PinLayout};

    // Default layout: left 17/18, right 22/23 (forward/backward)
    const LEFT_FWD: u8 = 17;
    const LEFT_BACK: u8 = 18;
    const RIGHT_FWD: u8 = 22;
    const RIGHT_BACK: u8 = 23;

    fn dispatcher() -> (Dispatcher<SimulatedPins>, SimulatedPins) {
        let sim = SimulatedPins::new();
        let driver = PinDriver::new(sim.clone(), PinLayout::default(), 200).unwrap();
        let dispatcher = Dispatcher::new(MotionController::new(driver), SpeedSetting::new(100, 200));
        (dispatcher, sim)
    }

    fn duties(sim: &SimulatedPins) -> [u16; 4] {
        [LEFT_FWD, LEFT_BACK, RIGHT_FWD, RIGHT_BACK].map(|pin| sim.duty(pin))
    }

    #[test]
    fn test_forward_uses_default_speed() {
        let (mut d, sim) = dispatcher();
        assert_eq!(d.handle("direction/forward", b""), None);
        assert_eq!(duties(&sim), [100, 0, 100, 0]);
    }

    #[test]
    fn test_set_speed_then_forward() {
        let (mut d, sim) = dispatcher();
        assert_eq!(d.handle("speed/set", b"75"), None);
        // No motion from the speed change itself
        assert_eq!(duties(&sim), [0, 0, 0, 0]);

        d.handle("direction/forward", b"");
        assert_eq!(duties(&sim), [75, 0, 75, 0]);
    }

    #[test]
    fn test_get_speed_reports_set_value() {
        let (mut d, _sim) = dispatcher();
        d.handle("speed/set", b"42");
        let reply = d.handle("speed/get", b"").expect("speed report");
        assert_eq!(reply.topic, "speed");
        assert_eq!(reply.payload, "42");
    }

    #[test]
    fn test_turns_and_back() {
        let (mut d, sim) = dispatcher();
        d.handle("direction/left", b"");
        assert_eq!(duties(&sim), [0, 0, 100, 0]);
        d.handle("direction/right", b"");
        assert_eq!(duties(&sim), [100, 0, 0, 0]);
        d.handle("direction/back", b"");
        assert_eq!(duties(&sim), [0, 100, 0, 100]);
    }

    #[test]
    fn test_unknown_topic_stops() {
        let (mut d, sim) = dispatcher();
        d.handle("direction/forward", b"");
        assert_eq!(duties(&sim), [100, 0, 100, 0]);

        assert_eq!(d.handle("junk/topic", b"go"), None);
        assert_eq!(duties(&sim), [0, 0, 0, 0]);
    }

    #[test]
    fn test_other_speed_topics_are_noops() {
        let (mut d, sim) = dispatcher();
        d.handle("direction/back", b"");
        let writes = sim.writes();

        assert_eq!(d.handle("speed/foo", b"10"), None);
        assert_eq!(d.handle("speed", b"100"), None);
        assert_eq!(sim.writes(), writes);
        assert_eq!(duties(&sim), [0, 100, 0, 100]);
        assert_eq!(d.speed(), 100);
    }

    #[test]
    fn test_stop_twice() {
        let (mut d, sim) = dispatcher();
        d.handle("direction/forward", b"");
        d.handle("direction/stop", b"");
        assert_eq!(duties(&sim), [0, 0, 0, 0]);
        let writes = sim.writes();

        d.handle("direction/stop", b"");
        assert_eq!(duties(&sim), [0, 0, 0, 0]);
        // Same pin writes again, nothing else
        assert_eq!(sim.writes() - writes, 4);
        assert_eq!(d.speed(), 100);
    }

    #[test]
    fn test_malformed_speed_keeps_previous() {
        let (mut d, sim) = dispatcher();
        d.handle("speed/set", b"60");
        d.handle("direction/forward", b"");
        let writes = sim.writes();

        assert_eq!(d.handle("speed/set", b"fast"), None);
        assert_eq!(d.speed(), 60);
        // Rejected input does not touch the motors
        assert_eq!(sim.writes(), writes);
        assert_eq!(duties(&sim), [60, 0, 60, 0]);
    }

    #[test]
    fn test_out_of_range_speed_clamped() {
        let (mut d, sim) = dispatcher();
        d.handle("speed/set", b"999");
        assert_eq!(d.speed(), 200);
        d.handle("direction/forward", b"");
        assert_eq!(duties(&sim), [200, 0, 200, 0]);

        d.handle("speed/set", b"-5");
        assert_eq!(d.speed(), 0);

        // Beyond i64 still clamps instead of being rejected
        d.handle("speed/set", b"99999999999999999999");
        assert_eq!(d.speed(), 200);
        d.handle("speed/set", b"-99999999999999999999");
        assert_eq!(d.speed(), 0);
    }

    #[test]
    fn test_emergency_stop() {
        let (mut d, sim) = dispatcher();
        d.handle("direction/right", b"");
        d.emergency_stop();
        assert_eq!(duties(&sim), [0, 0, 0, 0]);
    }

    #[test]
    fn test_speed_setting_initial_clamped() {
        let speed = SpeedSetting::new(500, 200);
        assert_eq!(speed.get(), 200);
        assert_eq!(speed.max(), 200);
    }
}
