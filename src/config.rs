//! Experiment configuration, read from TOML.
//!
//! Every section is optional; omitted values fall back to the settings of the
//! reference experiment (50 Hz control, a 120 s baseline, a 500 s run and
//! seven IDM followers on a straight road).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::control::{Controller, FollowerStopper, NominalLimits};
use crate::error::ConfigError;
use crate::profile::{read_trace, SpeedProfile, SpeedUnit, TraceColumns};
use crate::road::Road;
use crate::vehicle::VehicleType;
use crate::{Error, Result};

/// Timing and sensing settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// The control frequency in Hz.
    pub frequency: f64,
    /// How long the followers drive under native control before the
    /// controllers take over, in s.
    pub baseline_duration: f64,
    /// The simulated time after which the run is cut short, in s.
    pub interrupt_time: f64,
    /// How far ahead a follower looks for its leader, in m.
    pub lookahead: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            frequency: 50.0,
            baseline_duration: 120.0,
            interrupt_time: 500.0,
            lookahead: 2000.0,
        }
    }
}

impl SimulationSettings {
    /// The control period in s.
    pub fn period(&self) -> f64 {
        1.0 / self.frequency
    }

    /// The step at which the controlled phase starts.
    pub fn switch_step(&self) -> usize {
        seconds_to_steps(self.baseline_duration, self.frequency)
    }

    /// The number of steps after which the run is interrupted.
    pub fn step_budget(&self) -> usize {
        seconds_to_steps(self.interrupt_time, self.frequency)
    }
}

fn seconds_to_steps(seconds: f64, frequency: f64) -> usize {
    (seconds * frequency).round().max(0.0) as usize
}

/// Where the leader's speed profile comes from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeaderSource {
    /// A recorded trace in a CSV file.
    Trace {
        path: PathBuf,
        #[serde(default)]
        time_column: Option<String>,
        #[serde(default = "default_speed_column")]
        speed_column: String,
        #[serde(default)]
        unit: SpeedUnit,
    },
    /// A sinusoidal stop-and-go wave lasting `duration` seconds.
    StopAndGo { duration: f64 },
    /// A cruise with a dip in speed, lasting `duration` seconds.
    StepChange { duration: f64 },
    /// A constant speed in m/s, held for `duration` seconds.
    Constant {
        #[serde(default = "default_constant_speed")]
        speed: f64,
        duration: f64,
    },
}

fn default_speed_column() -> String {
    TraceColumns::default().speed
}

fn default_constant_speed() -> f64 {
    25.0
}

impl Default for LeaderSource {
    fn default() -> Self {
        LeaderSource::Constant {
            speed: default_constant_speed(),
            duration: 500.0,
        }
    }
}

impl LeaderSource {
    /// Builds the leader's speed profile sampled at `frequency` Hz.
    pub fn build_profile(&self, frequency: f64) -> Result<SpeedProfile> {
        let steps = |duration: f64| seconds_to_steps(duration, frequency);
        Ok(match self {
            LeaderSource::Trace {
                path,
                time_column,
                speed_column,
                unit,
            } => {
                let columns = TraceColumns {
                    time: time_column.clone(),
                    speed: speed_column.clone(),
                };
                let trace = read_trace(path, &columns, *unit)?;
                SpeedProfile::resample(&trace, 1.0 / frequency)
            }
            LeaderSource::StopAndGo { duration } => SpeedProfile::stop_and_go(steps(*duration)),
            LeaderSource::StepChange { duration } => SpeedProfile::step_change(steps(*duration)),
            LeaderSource::Constant { speed, duration } => {
                SpeedProfile::constant(steps(*duration), *speed)
            }
        })
    }
}

/// Leader settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderSettings {
    pub source: LeaderSource,
}

/// Settings of the rate-limiting nominal speed smoother.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NominalSettings {
    /// Whether the smoother sits between the reference speed and the controllers.
    pub enabled: bool,
    /// In m/s<sup>2</sup>.
    pub max_accel: f64,
    /// In m/s<sup>2</sup>.
    pub max_decel: f64,
}

impl Default for NominalSettings {
    fn default() -> Self {
        let limits = NominalLimits::default();
        Self {
            enabled: false,
            max_accel: limits.max_accel,
            max_decel: limits.max_decel,
        }
    }
}

impl NominalSettings {
    pub fn limits(&self) -> NominalLimits {
        NominalLimits {
            max_accel: self.max_accel,
            max_decel: self.max_decel,
        }
    }
}

/// The road and how vehicles are lined up on it.
///
/// Read from a flat table in which `kind` defaults to a straight road.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NetworkTable")]
pub struct NetworkSettings {
    #[serde(flatten)]
    pub road: Road,
    /// The distance between the fronts of consecutive vehicles at departure, in m.
    pub spacing: f64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            road: Road::default(),
            spacing: 12.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RoadKind {
    #[default]
    Straight,
    Ring,
}

/// The `[network]` table as written, with every key optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct NetworkTable {
    kind: RoadKind,
    length: Option<f64>,
    circumference: Option<f64>,
    spacing: f64,
}

impl Default for NetworkTable {
    fn default() -> Self {
        Self {
            kind: RoadKind::default(),
            length: None,
            circumference: None,
            spacing: NetworkSettings::default().spacing,
        }
    }
}

impl TryFrom<NetworkTable> for NetworkSettings {
    type Error = String;

    fn try_from(table: NetworkTable) -> std::result::Result<Self, String> {
        let road = match table.kind {
            RoadKind::Straight => Road::Straight {
                length: table.length.unwrap_or_else(|| Road::default().length()),
            },
            RoadKind::Ring => Road::Ring {
                circumference: table
                    .circumference
                    .ok_or_else(|| "a ring road needs a `circumference`".to_string())?,
            },
        };
        Ok(Self {
            road,
            spacing: table.spacing,
        })
    }
}

/// A number of followers of one vehicle type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehiclePlan {
    pub vehicle_type: String,
    pub count: usize,
}

/// The complete configuration of an experiment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub simulation: SimulationSettings,
    pub leader: LeaderSettings,
    pub follower_stopper: FollowerStopper,
    pub nominal: NominalSettings,
    pub network: NetworkSettings,
    /// The followers, in order from the front of the platoon.
    pub vehicle_plan: Vec<VehiclePlan>,
    /// The vehicle type of the leader.
    pub leader_type: String,
    /// Vehicle types in addition to, or replacing, the built-in ones.
    pub vehicle_types: HashMap<String, VehicleType>,
    /// Controllers for specific followers. Others use the Follower-Stopper.
    pub controllers: HashMap<String, Controller>,
    /// The standard deviation of the native desired speed factors, if randomised.
    pub speed_factor_stddev: Option<f64>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            simulation: Default::default(),
            leader: Default::default(),
            follower_stopper: Default::default(),
            nominal: Default::default(),
            network: Default::default(),
            vehicle_plan: vec![VehiclePlan {
                vehicle_type: "idm_follower".to_string(),
                count: 7,
            }],
            leader_type: "idm_follower".to_string(),
            vehicle_types: HashMap::new(),
            controllers: HashMap::new(),
            speed_factor_stddev: None,
        }
    }
}

impl FromStr for ExperimentConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

/// The vehicle types available without any configuration.
pub fn builtin_vehicle_types() -> HashMap<String, VehicleType> {
    HashMap::from([
        (
            "krauss_follower".to_string(),
            VehicleType::new("Krauss", 2.5, 3.5, 1.1, 2.5, 35.0),
        ),
        (
            "idm_follower".to_string(),
            VehicleType::new("IDM", 1.5, 3.5, 4.0, 10.0, 30.0),
        ),
        (
            "cacc_follower".to_string(),
            VehicleType::new("CACC", 2.0, 2.0, 0.7, 1.5, 35.0),
        ),
    ])
}

impl ExperimentConfig {
    /// Reads a configuration from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        contents.parse()
    }

    /// The built-in vehicle types overlaid with the configured ones.
    pub fn vehicle_types(&self) -> HashMap<String, VehicleType> {
        let mut types = builtin_vehicle_types();
        types.extend(self.vehicle_types.clone());
        types
    }

    /// The controller driving the given follower.
    pub fn controller_for(&self, vehicle_id: &str) -> Controller {
        self.controllers
            .get(vehicle_id)
            .copied()
            .unwrap_or(Controller::FollowerStopper(self.follower_stopper))
    }

    /// Builds the leader's speed profile at the control frequency.
    pub fn leader_profile(&self) -> Result<SpeedProfile> {
        self.leader.source.build_profile(self.simulation.frequency)
    }

    /// Replaces the leader's source with a recorded trace, keeping any
    /// configured column names and unit.
    pub fn set_trace_path(&mut self, path: PathBuf) {
        match &mut self.leader.source {
            LeaderSource::Trace { path: current, .. } => *current = path,
            source => {
                *source = LeaderSource::Trace {
                    path,
                    time_column: None,
                    speed_column: default_speed_column(),
                    unit: SpeedUnit::default(),
                }
            }
        }
    }

    /// Checks that the configuration describes a well-defined experiment.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let sim = &self.simulation;
        ConfigError::positive("simulation.frequency", sim.frequency)?;
        ConfigError::non_negative("simulation.baseline_duration", sim.baseline_duration)?;
        ConfigError::positive("simulation.interrupt_time", sim.interrupt_time)?;
        ConfigError::positive("simulation.lookahead", sim.lookahead)?;

        match &self.leader.source {
            LeaderSource::Trace { .. } => {}
            LeaderSource::StopAndGo { duration } | LeaderSource::StepChange { duration } => {
                ConfigError::non_negative("leader.source.duration", *duration)?
            }
            LeaderSource::Constant { speed, duration } => {
                ConfigError::non_negative("leader.source.speed", *speed)?;
                ConfigError::non_negative("leader.source.duration", *duration)?;
            }
        }

        self.follower_stopper.validate()?;
        for controller in self.controllers.values() {
            controller.validate()?;
        }

        ConfigError::positive("nominal.max_accel", self.nominal.max_accel)?;
        ConfigError::positive("nominal.max_decel", self.nominal.max_decel.abs())?;

        ConfigError::positive("network.length", self.network.road.length())?;
        ConfigError::positive("network.spacing", self.network.spacing)?;

        let types = self.vehicle_types();
        let names = std::iter::once(&self.leader_type)
            .chain(self.vehicle_plan.iter().map(|p| &p.vehicle_type));
        for name in names {
            if !types.contains_key(name) {
                return Err(ConfigError::UnknownVehicleType(name.clone()));
            }
        }

        if let Some(stddev) = self.speed_factor_stddev {
            ConfigError::non_negative("speed_factor_stddev", stddev)?;
        }
        Ok(())
    }
}
