use serde::{Deserialize, Serialize};

/// Half-width of the band around the target within which the smoothed speed
/// snaps straight to the target, in m/s.
const SNAP_BAND: f64 = 1.0; // m/s

/// Rate limits of the nominal controller.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NominalLimits {
    /// The maximum rate the reference may rise at, in m/s<sup>2</sup>.
    pub max_accel: f64,
    /// The maximum rate the reference may fall at, in m/s<sup>2</sup>.
    /// Only the magnitude is used.
    pub max_decel: f64,
}

impl Default for NominalLimits {
    fn default() -> Self {
        Self {
            max_accel: 2.0,
            max_decel: 2.0,
        }
    }
}

/// A rate-limiting smoother that turns a raw target speed into the reference
/// speed fed to the safety controller.
///
/// Each ego vehicle owns its own instance; the smoothed speed persists across
/// steps and is never reset during a run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NominalController {
    /// The smoothed speed in m/s.
    speed: f64,
}

impl NominalController {
    /// Creates a controller whose smoothed speed starts at zero.
    pub fn new() -> Self {
        Default::default()
    }

    /// The current smoothed speed in m/s.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Advances the smoother by one control period and returns the reference speed.
    ///
    /// # Parameters
    /// * `current_speed` - The ego vehicle's measured speed (m/s).
    /// * `target_speed` - The raw target speed (m/s).
    /// * `limits` - The rate limits.
    /// * `period` - The control period (s).
    ///
    /// The returned reference is kept within `[current_speed - 1, current_speed + 2]`.
    pub fn update(
        &mut self,
        current_speed: f64,
        target_speed: f64,
        limits: &NominalLimits,
        period: f64,
    ) -> f64 {
        let y = if self.speed > target_speed + SNAP_BAND {
            f64::max(target_speed, self.speed - limits.max_decel.abs() * period)
        } else if self.speed < target_speed - SNAP_BAND {
            f64::min(target_speed, self.speed + limits.max_accel * period)
        } else {
            target_speed
        };

        // Keep the vehicle creeping rather than stalled when the target allows it.
        self.speed = if y < 2.0 && target_speed > 2.0 {
            2.0
        } else if y < 1.0 && target_speed > 1.0 {
            1.0
        } else {
            y
        };

        f64::min(f64::max(self.speed, current_speed - 1.0), current_speed + 2.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const LIMITS: NominalLimits = NominalLimits {
        max_accel: 2.0,
        max_decel: 2.0,
    };

    #[test]
    fn snaps_near_target() {
        let mut ctrl = NominalController { speed: 19.5 };
        let r = ctrl.update(20.0, 20.0, &LIMITS, 0.02);
        assert_eq!(ctrl.speed(), 20.0);
        assert_eq!(r, 20.0);
    }

    #[test]
    fn deadband_lifts_low_speeds() {
        let mut ctrl = NominalController::new();
        ctrl.update(0.0, 10.0, &LIMITS, 0.02);
        assert_eq!(ctrl.speed(), 2.0);

        let mut ctrl = NominalController::new();
        ctrl.update(0.0, 1.5, &LIMITS, 0.02);
        assert_eq!(ctrl.speed(), 1.0);

        let mut ctrl = NominalController::new();
        ctrl.update(0.0, 2.5, &LIMITS, 0.02);
        assert_eq!(ctrl.speed(), 2.0);
    }

    #[test]
    fn output_stays_near_ego_speed() {
        let mut ctrl = NominalController { speed: 30.0 };
        let r = ctrl.update(10.0, 30.0, &LIMITS, 0.02);
        assert_eq!(r, 12.0);

        let mut ctrl = NominalController { speed: 5.0 };
        let r = ctrl.update(10.0, 5.0, &LIMITS, 0.02);
        assert_eq!(r, 9.0);
    }

    #[test]
    fn converges_monotonically_without_overshoot() {
        let period = 0.1;
        let target = 15.0;
        let mut ctrl = NominalController { speed: 3.0 };
        let mut prev = ctrl.speed();
        for _ in 0..200 {
            let r = ctrl.update(ctrl.speed(), target, &LIMITS, period);
            let y = ctrl.speed();
            assert!(y >= prev);
            assert!(y - prev <= LIMITS.max_accel * period + 1.0 + 1e-12);
            assert!(y <= target);
            assert!(r >= ctrl.speed() - 1.0 && r <= ctrl.speed() + 2.0);
            prev = y;
        }
        assert_approx_eq!(ctrl.speed(), target);

        let mut ctrl = NominalController { speed: 30.0 };
        let mut prev = ctrl.speed();
        for _ in 0..200 {
            ctrl.update(ctrl.speed(), target, &LIMITS, period);
            assert!(ctrl.speed() <= prev);
            assert!(ctrl.speed() >= target);
            prev = ctrl.speed();
        }
        assert_approx_eq!(ctrl.speed(), target);
    }

    #[test]
    fn instances_are_independent() {
        let mut a = NominalController::new();
        let mut b = NominalController::new();
        for _ in 0..10 {
            a.update(5.0, 20.0, &LIMITS, 0.5);
        }
        b.update(5.0, 8.0, &LIMITS, 0.5);
        assert_eq!(a.speed(), 11.0);
        assert_eq!(b.speed(), 2.0);
    }
}
