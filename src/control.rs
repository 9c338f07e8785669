//! Follower control laws.

pub use self::nominal::{NominalController, NominalLimits};
pub use self::stopper::{compute_command, FollowerStopper};
use serde::{Deserialize, Serialize};

mod nominal;
mod stopper;

/// How long an acceleration command is held by the simulator, in s.
const ACCEL_HOLD_SEC: f64 = 1.0; // s

/// Weight of the speed difference in the acceleration based controller.
const ACCEL_SPEED_WEIGHT: f64 = 0.2;

/// The live measurements available to a follower's controller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    /// The ego vehicle's speed in m/s.
    pub ego_speed: f64,
    /// The speed of the vehicle ahead in m/s.
    pub lead_speed: f64,
    /// The gap to the vehicle ahead in m.
    pub gap: f64,
}

impl Measurement {
    /// The lead vehicle's speed relative to the ego vehicle, in m/s.
    pub fn relative_velocity(&self) -> f64 {
        self.lead_speed - self.ego_speed
    }
}

/// What quantity a controller commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Speed,
    Acceleration,
}

/// A command to be issued to the simulator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Drive at this speed, in m/s.
    Speed(f64),
    /// Apply this acceleration in m/s<sup>2</sup> for `duration` seconds.
    Acceleration { acc: f64, duration: f64 },
}

/// A follower control strategy together with its parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Controller {
    /// Tracks the reference speed subject to the Follower-Stopper safety bands.
    FollowerStopper(FollowerStopper),
    /// A proportional controller on the gap error.
    SimpleGap {
        gain: f64,
        desired_gap: f64,
        max_speed: f64,
    },
    /// A saturated acceleration law on the gap error and speed difference.
    AccelBased {
        desired_gap: f64,
        gain: f64,
        max_accel: f64,
        max_decel: f64,
    },
}

impl Default for Controller {
    fn default() -> Self {
        Controller::FollowerStopper(Default::default())
    }
}

impl Controller {
    /// A proportional gap controller with the usual parameters.
    pub fn simple_gap() -> Self {
        Controller::SimpleGap {
            gain: 0.4,
            desired_gap: 5.0,
            max_speed: 30.0,
        }
    }

    /// An acceleration based controller with the usual parameters.
    pub fn accel_based() -> Self {
        Controller::AccelBased {
            desired_gap: 5.0,
            gain: 0.3,
            max_accel: 2.5,
            max_decel: 4.5,
        }
    }

    /// The quantity this controller outputs.
    pub fn output(&self) -> CommandKind {
        match self {
            Controller::FollowerStopper(_) | Controller::SimpleGap { .. } => CommandKind::Speed,
            Controller::AccelBased { .. } => CommandKind::Acceleration,
        }
    }

    /// Whether the controller tracks a reference speed, and so benefits
    /// from the nominal smoother.
    pub fn uses_reference(&self) -> bool {
        matches!(self, Controller::FollowerStopper(_))
    }

    /// Checks the controller's parameters.
    pub fn validate(&self) -> Result<(), crate::error::ConfigError> {
        use crate::error::ConfigError;
        match self {
            Controller::FollowerStopper(fs) => fs.validate(),
            Controller::SimpleGap { max_speed, .. } => {
                ConfigError::non_negative("controller.max_speed", *max_speed)
            }
            Controller::AccelBased {
                max_accel,
                max_decel,
                ..
            } => {
                ConfigError::positive("controller.max_accel", *max_accel)?;
                ConfigError::positive("controller.max_decel", *max_decel)
            }
        }
    }

    /// Computes the command for one step.
    ///
    /// # Parameters
    /// * `reference` - The desired speed (m/s); only used by speed-tracking controllers.
    /// * `m` - The live measurements.
    pub fn command(&self, reference: f64, m: &Measurement) -> Command {
        match *self {
            Controller::FollowerStopper(fs) => Command::Speed(fs.command(
                reference,
                m.gap,
                m.relative_velocity(),
                m.ego_speed,
            )),
            Controller::SimpleGap {
                gain,
                desired_gap,
                max_speed,
            } => {
                let speed = m.ego_speed + gain * (m.gap - desired_gap);
                Command::Speed(speed.clamp(0.0, max_speed))
            }
            Controller::AccelBased {
                desired_gap,
                gain,
                max_accel,
                max_decel,
            } => {
                let drive =
                    gain * (m.gap - desired_gap) + ACCEL_SPEED_WEIGHT * m.relative_velocity();
                let acc = (max_accel * drive.tanh()).clamp(-max_decel, max_accel);
                Command::Acceleration {
                    acc,
                    duration: ACCEL_HOLD_SEC,
                }
            }
        }
    }
}
