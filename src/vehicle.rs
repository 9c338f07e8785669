use self::acceleration::AccelerationModel;
use crate::math::Point2d;
use crate::road::Road;
use crate::VehicleId;
use serde::{Deserialize, Serialize};

mod acceleration;

/// A vehicle type, as declared in a scenario.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleType {
    /// The name of the car following model this type declares, e.g. `IDM`.
    pub car_follow_model: String,
    /// The maximum acceleration in m/s<sup>2</sup>.
    pub accel: f64,
    /// The comfortable deceleration in m/s<sup>2</sup>, as a positive number.
    pub decel: f64,
    /// The desired time headway in s.
    pub tau: f64,
    /// The gap kept to a stopped vehicle ahead, in m.
    pub min_gap: f64,
    /// The maximum speed in m/s.
    pub max_speed: f64,
    /// The vehicle length in m.
    #[serde(default = "default_length")]
    pub length: f64,
}

fn default_length() -> f64 {
    5.0
}

impl VehicleType {
    pub fn new(
        car_follow_model: &str,
        accel: f64,
        decel: f64,
        tau: f64,
        min_gap: f64,
        max_speed: f64,
    ) -> Self {
        Self {
            car_follow_model: car_follow_model.to_string(),
            accel,
            decel,
            tau,
            min_gap,
            max_speed,
            length: default_length(),
        }
    }
}

/// An acceleration command and the time it remains in force.
#[derive(Clone, Copy, Debug, PartialEq)]
struct AccelCommand {
    acc: f64,
    remaining: f64,
}

/// A simulated vehicle on a single-lane road.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's key.
    pub(crate) id: VehicleId,
    /// The vehicle's external name, e.g. `veh0`.
    name: String,
    /// The name of the vehicle's type.
    type_id: String,
    /// The vehicle's length in m.
    length: f64,
    /// The vehicle's maximum speed in m/s.
    max_speed: f64,
    /// The acceleration model
    acc: AccelerationModel,
    /// The longitudinal position of the vehicle's front along the road, in m.
    pos: f64,
    /// The velocity in m/s.
    vel: f64,
    /// The acceleration over the last step in m/s<sup>2</sup>.
    last_acc: f64,
    /// Whether the native car following model drives the vehicle.
    native: bool,
    /// The most recently commanded speed.
    speed_cmd: Option<f64>,
    /// The in-force acceleration command.
    accel_cmd: Option<AccelCommand>,
    /// The world space coordinates of the vehicle's front.
    world_pos: Point2d,
}

impl Vehicle {
    /// Creates a new vehicle at rest.
    pub(crate) fn new(
        id: VehicleId,
        name: &str,
        type_id: &str,
        vtype: &VehicleType,
        pos: f64,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            type_id: type_id.to_string(),
            length: vtype.length,
            max_speed: vtype.max_speed,
            acc: AccelerationModel::new(&acceleration::ModelParams {
                time_headway: vtype.tau,
                min_gap: vtype.min_gap,
                max_acceleration: vtype.accel,
                comf_deceleration: vtype.decel,
            }),
            pos,
            vel: 0.0,
            last_acc: 0.0,
            native: true,
            speed_cmd: None,
            accel_cmd: None,
            world_pos: Point2d::new(0.0, 0.0),
        }
    }

    /// Gets the vehicle's key.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The vehicle's external name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the vehicle's type.
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    /// The vehicle's length in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The longitudinal position of the front of the vehicle in m.
    pub fn pos_front(&self) -> f64 {
        self.pos
    }

    /// The longitudinal position of the rear of the vehicle in m.
    pub fn pos_rear(&self) -> f64 {
        self.pos - self.length
    }

    /// The coordinates in world space of the front of the vehicle.
    pub fn position(&self) -> Point2d {
        self.world_pos
    }

    /// The vehicle's velocity in m/s.
    pub fn vel(&self) -> f64 {
        self.vel
    }

    /// The vehicle's acceleration over the last step in m/s<sup>2</sup>.
    pub fn acceleration(&self) -> f64 {
        self.last_acc
    }

    /// Whether the native car following model drives the vehicle.
    pub fn is_native(&self) -> bool {
        self.native
    }

    /// Set the desired velocity adjustment factor for the vehicle, a scalar which is
    /// multiplied with its maximum speed when calculating its free road acceleration.
    pub fn set_velocity_adjust(&mut self, factor: f64) {
        self.acc.set_velocity_adjust(factor);
    }

    /// The desired velocity adjustment factor.
    pub fn velocity_adjust(&self) -> f64 {
        self.acc.velocity_adjust()
    }

    /// Enables or disables the native car following model.
    pub(crate) fn set_native(&mut self, native: bool) {
        self.native = native;
    }

    /// Commands a speed, replacing any acceleration command.
    pub(crate) fn command_speed(&mut self, speed: f64) {
        self.speed_cmd = Some(f64::max(speed, 0.0));
        self.accel_cmd = None;
    }

    /// Commands an acceleration for `duration` seconds.
    pub(crate) fn command_acceleration(&mut self, acc: f64, duration: f64) {
        self.accel_cmd = Some(AccelCommand {
            acc,
            remaining: duration,
        });
    }

    /// Resets internal model states in preparation for a new step of the simulation.
    pub(crate) fn reset(&self) {
        self.acc.reset();
        self.acc.apply_current_speed_limit(self.vel, self.max_speed);
    }

    /// Applies an acceleration to the vehicle so it follows the vehicle ahead.
    pub(crate) fn follow_vehicle(&self, gap: f64, vel: f64) {
        self.acc.follow_vehicle(gap, self.vel, vel);
    }

    /// Integrates the vehicle's velocity and position
    ///
    /// # Parameters
    /// * `dt` - The time step in seconds
    pub(crate) fn integrate(&mut self, dt: f64) {
        let vel = if let Some(cmd) = self.accel_cmd.as_mut() {
            cmd.remaining -= dt;
            let vel = f64::max(self.vel + dt * cmd.acc, 0.0);
            if cmd.remaining < 0.5 * dt {
                self.accel_cmd = None;
            }
            vel
        } else if self.native {
            if let Some(target) = self.speed_cmd {
                self.acc.apply_target_speed(self.vel, target, dt);
            }
            f64::max(self.vel + dt * self.acc.acc(), 0.0)
        } else {
            // Unchecked: commanded speeds take effect immediately.
            self.speed_cmd.unwrap_or(self.vel)
        };

        self.pos += 0.5 * (self.vel + vel) * dt;
        self.last_acc = (vel - self.vel) / dt;
        self.vel = vel;
    }

    /// Wraps or clamps the vehicle's position to the road.
    /// Returns `false` if the vehicle has driven off the end.
    pub(crate) fn advance(&mut self, road: &Road) -> bool {
        match road.wrap(self.pos) {
            Some(pos) => {
                self.pos = pos;
                true
            }
            None => false,
        }
    }

    /// Updates the vehicle's world coordinates
    pub(crate) fn update_coords(&mut self, road: &Road) {
        self.world_pos = road.world_position(self.pos);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use slotmap::Key;

    fn vehicle() -> Vehicle {
        let vtype = VehicleType::new("IDM", 1.5, 3.5, 4.0, 10.0, 30.0);
        Vehicle::new(VehicleId::null(), "veh1", "idm_follower", &vtype, 50.0)
    }

    #[test]
    fn native_vehicle_accelerates_from_rest() {
        let mut veh = vehicle();
        veh.reset();
        veh.integrate(0.1);
        assert_approx_eq!(veh.vel(), 0.15);
        assert_approx_eq!(veh.acceleration(), 1.5);
        assert_approx_eq!(veh.pos_front(), 50.0075);
        assert_approx_eq!(veh.pos_rear(), 45.0075);
    }

    #[test]
    fn unchecked_speed_command_is_immediate() {
        let mut veh = vehicle();
        veh.set_native(false);
        veh.command_speed(12.0);
        veh.reset();
        veh.integrate(0.1);
        assert_eq!(veh.vel(), 12.0);
        assert_approx_eq!(veh.pos_front(), 50.6);

        veh.command_speed(-3.0);
        veh.integrate(0.1);
        assert_eq!(veh.vel(), 0.0);
    }

    #[test]
    fn native_speed_command_is_rate_limited() {
        let mut veh = vehicle();
        veh.command_speed(12.0);
        veh.reset();
        veh.integrate(1.0);
        assert_approx_eq!(veh.vel(), 1.5);
    }

    #[test]
    fn acceleration_command_expires() {
        let mut veh = vehicle();
        veh.set_native(false);
        veh.command_acceleration(2.0, 0.2);
        veh.integrate(0.1);
        veh.integrate(0.1);
        assert_approx_eq!(veh.vel(), 0.4);
        veh.integrate(0.1);
        assert_approx_eq!(veh.vel(), 0.4);
    }
}
