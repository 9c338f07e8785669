//! The interface through which an experiment drives a traffic simulator.

use crate::Result;

/// The vehicle immediately ahead of another.
#[derive(Clone, Debug, PartialEq)]
pub struct Leader {
    /// The ID of the vehicle ahead.
    pub id: String,
    /// The distance from the follower's front to the leader's rear, in m.
    pub gap: f64,
}

/// A microscopic traffic simulator that can be stepped, queried and commanded.
///
/// Queries about a vehicle that is not currently in the simulation fail with
/// [crate::Error::UnknownVehicle].
pub trait Simulator {
    /// Advances the simulation by one step.
    fn advance(&mut self) -> Result<()>;

    /// The IDs of the vehicles currently in the simulation.
    fn vehicle_ids(&self) -> Vec<String>;

    /// The vehicle's speed in m/s.
    fn speed(&self, id: &str) -> Result<f64>;

    /// The vehicle's acceleration over the last step in m/s<sup>2</sup>.
    fn acceleration(&self, id: &str) -> Result<f64>;

    /// The world coordinates of the vehicle's front, in m.
    fn position(&self, id: &str) -> Result<(f64, f64)>;

    /// The name of the vehicle's type.
    fn type_id(&self, id: &str) -> Result<String>;

    /// The vehicle ahead of `id`, if there is one within `max_distance` metres.
    fn leader(&self, id: &str, max_distance: f64) -> Result<Option<Leader>>;

    /// Commands the vehicle to drive at `speed` m/s.
    fn set_speed(&mut self, id: &str, speed: f64) -> Result<()>;

    /// Commands the vehicle to accelerate at `acc` m/s<sup>2</sup> for `duration` seconds.
    fn set_acceleration(&mut self, id: &str, acc: f64, duration: f64) -> Result<()>;

    /// Enables or disables the simulator's own car following model for a vehicle.
    /// While disabled, speed commands take effect without any safety checks.
    fn set_native_control(&mut self, id: &str, enabled: bool) -> Result<()>;

    /// Releases the simulator at the end of a run.
    fn close(&mut self) {}
}
