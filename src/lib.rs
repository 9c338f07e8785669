pub use cgmath;
pub use config::ExperimentConfig;
pub use control::{compute_command, Command, Controller, FollowerStopper, NominalController};
pub use error::{ConfigError, Error, Result};
pub use experiment::{Experiment, ExperimentOutput, Phase, Termination};
pub use profile::SpeedProfile;
pub use reference::ReferenceSpeed;
pub use road::Road;
pub use simulation::LaneSimulation;
pub use simulator::{Leader, Simulator};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use telemetry::{Telemetry, TelemetryRow};
pub use util::Interval;
pub use vehicle::{Vehicle, VehicleType};

pub mod config;
pub mod control;
mod error;
pub mod experiment;
pub mod math;
pub mod profile;
pub mod reference;
mod road;
mod simulation;
pub mod simulator;
pub mod telemetry;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
