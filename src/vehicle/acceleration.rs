use std::cell::Cell;

/// The maximum deceleration of all vehicles in ms<sup>-2</sup>.
const MAX_DECEL: f64 = -9.0; // m/s^2

/// The exponent of the free-road term of the intelligent driver model.
const FREE_ROAD_EXPONENT: i32 = 4;

/// The native acceleration model of a vehicle: the intelligent driver model.
///
/// Constraints are applied one at a time during a step and the most
/// restrictive acceleration wins.
#[derive(Clone, Debug)]
pub struct AccelerationModel {
    headway: f64,
    min_gap: f64,
    max_acc: f64,
    comf_dec: f64,
    vel_adj: f64,
    acc: Cell<f64>,
}

/// The parameters of the acceleration model.
pub struct ModelParams {
    /// The desired gap between this and the vehicle ahead in seconds.
    pub time_headway: f64,
    /// The gap to keep to a stopped vehicle ahead, in m.
    pub min_gap: f64,
    /// The vehicle's maximum acceleration in m/s<sup>2</sup>.
    pub max_acceleration: f64,
    /// The comfortable decelleration in m/s<sup>2</sup>.
    pub comf_deceleration: f64,
}

impl AccelerationModel {
    /// Creates a new acceleration model.
    pub fn new(params: &ModelParams) -> Self {
        AccelerationModel {
            headway: params.time_headway,
            min_gap: params.min_gap,
            max_acc: params.max_acceleration,
            comf_dec: params.comf_deceleration,
            vel_adj: 1.0,
            acc: Cell::new(params.max_acceleration),
        }
    }

    /// Set the desired velocity adjustment factor.
    pub fn set_velocity_adjust(&mut self, factor: f64) {
        self.vel_adj = factor;
    }

    /// The desired velocity adjustment factor.
    pub fn velocity_adjust(&self) -> f64 {
        self.vel_adj
    }

    /// Resets the acceleration model. Use at the start of an update.
    pub fn reset(&self) {
        self.acc.set(self.max_acc);
    }

    /// Gets the current acceleration of the vehicle.
    pub fn acc(&self) -> f64 {
        f64::max(self.acc.get(), MAX_DECEL)
    }

    /// Calculates the acceleration needed to maintain the speed limit.
    /// # Arguments
    /// * `vel` - The velocity of the simulated vehicle (m/s).
    /// * `speed_limit` - The current speed limit (m/s).
    pub fn apply_current_speed_limit(&self, vel: f64, speed_limit: f64) {
        let speed_limit = self.vel_adj * speed_limit;
        let this_acc = self.max_acc * (1. - (vel / speed_limit).powi(FREE_ROAD_EXPONENT));
        self.acc.set(f64::min(self.acc.get(), this_acc));
    }

    /// Limits the acceleration so the vehicle approaches `target` speed
    /// without exceeding its acceleration bounds within one step of `dt` seconds.
    pub fn apply_target_speed(&self, vel: f64, target: f64, dt: f64) {
        let this_acc = ((target - vel) / dt).clamp(-self.comf_dec, self.max_acc);
        self.acc.set(f64::min(self.acc.get(), this_acc));
    }

    /// Calculates the acceleration needed to follow the vehicle ahead.
    ///
    /// # Arguments
    /// * `net_dist` - The distance between this vehicle and the vehicle ahead in metres.
    /// * `my_vel` - The velocity of the simulated vehicle (m/s).
    /// * `their_vel` - The vehicle ahead's velocity (m/s).
    pub fn follow_vehicle(&self, net_dist: f64, my_vel: f64, their_vel: f64) {
        let acc = self.idm(net_dist, my_vel, their_vel);
        self.acc.set(f64::min(self.acc.get(), acc));
    }

    /// Computes an acceleration using the intelligent driver model.
    fn idm(&self, net_dist: f64, my_vel: f64, their_vel: f64) -> f64 {
        let comf_dec = self.comf_dec; // m.s^-2
        let max_acc = self.max_acc; // m.s^-2

        if net_dist <= 0.0 {
            MAX_DECEL
        } else {
            let appr = my_vel - their_vel;
            let factor = 1. / (2. * (max_acc * comf_dec).sqrt());
            let ss = self.min_gap + f64::max(my_vel * self.headway + my_vel * appr * factor, 0.0);
            let term = ss / net_dist;
            max_acc * (1. - (term * term))
        }
    }
}
