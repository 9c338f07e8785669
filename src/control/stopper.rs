use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::util::Interval;

/// The Follower-Stopper safety controller.
///
/// The gap ahead of the ego vehicle is split by three parabolic boundaries,
/// each a spacing threshold widened by `dv² / (2 d)` for a closing relative
/// velocity `dv`:
///
/// * below the first boundary the vehicle is commanded to stop;
/// * between the first and second, the command ramps from zero up to the
///   estimated lead vehicle speed (capped by the desired speed);
/// * between the second and third, it ramps on to the desired speed;
/// * beyond the third the desired speed is passed through unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FollowerStopper {
    /// The spacing below which the vehicle must stop, in m.
    pub min_spacing: f64,
    /// The spacing beyond which the controller no longer intervenes, in m.
    pub activate_spacing: f64,
    /// The decelerations shaping the three bands, in m/s<sup>2</sup>.
    pub decel: [f64; 3],
}

impl Default for FollowerStopper {
    fn default() -> Self {
        Self {
            min_spacing: 4.5,
            activate_spacing: 6.0,
            decel: [1.5, 1.0, 0.5],
        }
    }
}

impl FollowerStopper {
    /// Checks that the band boundaries are strictly increasing for every
    /// relative velocity, which keeps the interpolation well defined.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("follower_stopper.decel[0]", self.decel[0]),
            ("follower_stopper.decel[1]", self.decel[1]),
            ("follower_stopper.decel[2]", self.decel[2]),
        ] {
            ConfigError::positive(field, value)?;
        }
        ConfigError::non_negative("follower_stopper.min_spacing", self.min_spacing)?;
        if !(self.min_spacing < self.activate_spacing) {
            return Err(ConfigError::DegenerateBands(format!(
                "min_spacing ({}) must be below activate_spacing ({})",
                self.min_spacing, self.activate_spacing
            )));
        }
        if !(self.decel[0] >= self.decel[1] && self.decel[1] >= self.decel[2]) {
            return Err(ConfigError::DegenerateBands(format!(
                "decelerations {:?} must be non-increasing",
                self.decel
            )));
        }
        Ok(())
    }

    /// The spacing half way between the stop and activation thresholds, in m.
    pub fn mid_spacing(&self) -> f64 {
        0.5 * (self.min_spacing + self.activate_spacing)
    }

    /// The three band boundaries for a relative velocity `dv` (lead minus ego).
    /// Only closing speeds (`dv < 0`) widen the bands.
    pub fn bands(&self, dv: f64) -> [f64; 3] {
        let dv = f64::min(dv, 0.0);
        let widen = |decel: f64| dv * dv / (2.0 * decel);
        [
            self.min_spacing + widen(self.decel[0]),
            self.mid_spacing() + widen(self.decel[1]),
            self.activate_spacing + widen(self.decel[2]),
        ]
    }

    /// Computes the commanded speed.
    ///
    /// # Parameters
    /// * `desired_speed` - The speed the vehicle would like to travel at (m/s).
    /// * `gap` - The distance to the vehicle ahead (m).
    /// * `dv` - The lead vehicle's speed minus the ego vehicle's speed (m/s).
    /// * `ego_speed` - The ego vehicle's speed (m/s).
    ///
    /// The result never exceeds `desired_speed`.
    pub fn command(&self, desired_speed: f64, gap: f64, dv: f64, ego_speed: f64) -> f64 {
        let lead_speed = f64::max(ego_speed + dv, 0.0);
        let v = f64::min(desired_speed, lead_speed);
        let [b1, b2, b3] = self.bands(dv);

        if gap < b1 {
            0.0
        } else if gap < b2 {
            v * Interval::new(b1, b2).inv_lerp(gap)
        } else if gap < b3 {
            Interval::new(v, desired_speed).lerp(Interval::new(b2, b3).inv_lerp(gap))
        } else {
            desired_speed
        }
    }
}

/// Computes the Follower-Stopper command for a single set of parameters.
/// See [FollowerStopper::command].
pub fn compute_command(
    desired_speed: f64,
    gap: f64,
    dv: f64,
    ego_speed: f64,
    min_spacing: f64,
    activate_spacing: f64,
    decel: [f64; 3],
) -> f64 {
    FollowerStopper {
        min_spacing,
        activate_spacing,
        decel,
    }
    .command(desired_speed, gap, dv, ego_speed)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn stops_inside_first_band() {
        let u = compute_command(20.0, 3.0, -2.0, 15.0, 4.5, 6.0, [1.5, 1.0, 0.5]);
        assert_eq!(u, 0.0);
    }

    #[test]
    fn band_boundaries() {
        let fs = FollowerStopper::default();
        let [b1, b2, b3] = fs.bands(-2.0);
        assert_approx_eq!(b1, 4.5 + 4.0 / 3.0);
        assert_approx_eq!(b2, 5.25 + 2.0);
        assert_approx_eq!(b3, 6.0 + 4.0);
        // Opening gaps do not widen the bands.
        assert_eq!(fs.bands(3.0), [4.5, 5.25, 6.0]);
    }

    #[test]
    fn regions() {
        let fs = FollowerStopper::default();
        // Lead at 10 m/s, ego at 10 m/s, wants 20 m/s.
        assert_eq!(fs.command(20.0, 4.4, 0.0, 10.0), 0.0);
        assert_eq!(fs.command(20.0, 4.5, 0.0, 10.0), 0.0);
        assert_approx_eq!(fs.command(20.0, 4.875, 0.0, 10.0), 5.0);
        assert_approx_eq!(fs.command(20.0, 5.25, 0.0, 10.0), 10.0);
        assert_approx_eq!(fs.command(20.0, 5.625, 0.0, 10.0), 15.0);
        assert_eq!(fs.command(20.0, 6.0, 0.0, 10.0), 20.0);
        assert_eq!(fs.command(20.0, 100.0, 0.0, 10.0), 20.0);
    }

    #[test]
    fn reversing_lead_is_treated_as_stopped() {
        let fs = FollowerStopper::default();
        // Estimated lead speed is negative, so `v` is zero.
        assert_eq!(fs.command(20.0, 20.0, -12.0, 10.0), 0.0);
    }

    #[test]
    fn monotone_in_gap_and_bounded() {
        let fs = FollowerStopper::default();
        let desired = 18.0;
        let mut prev = 0.0;
        for i in 0..=800 {
            let gap = i as f64 * 0.01;
            let u = fs.command(desired, gap, 0.0, 12.0);
            assert!(u >= prev);
            assert!(u <= desired);
            prev = u;
        }
    }

    #[test]
    fn continuous_at_boundaries() {
        let fs = FollowerStopper::default();
        for dv in [0.0, -1.0, -3.5] {
            let [b1, b2, b3] = fs.bands(dv);
            let eps = 1e-9;
            let u = |gap| fs.command(25.0, gap, dv, 14.0);
            assert_approx_eq!(u(b1), 0.0, 1e-6);
            assert_approx_eq!(u(b2 - eps), u(b2), 1e-6);
            assert_approx_eq!(u(b3 - eps), 25.0, 1e-6);
        }
    }

    #[test]
    fn validation() {
        assert!(FollowerStopper::default().validate().is_ok());

        let fs = FollowerStopper {
            min_spacing: 6.0,
            activate_spacing: 6.0,
            ..Default::default()
        };
        assert!(matches!(fs.validate(), Err(ConfigError::DegenerateBands(_))));

        let fs = FollowerStopper {
            decel: [0.5, 1.0, 1.5],
            ..Default::default()
        };
        assert!(matches!(fs.validate(), Err(ConfigError::DegenerateBands(_))));

        let fs = FollowerStopper {
            decel: [1.5, 0.0, 0.0],
            ..Default::default()
        };
        assert!(matches!(fs.validate(), Err(ConfigError::NotPositive { .. })));
    }
}
