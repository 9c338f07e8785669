//! Miscellaneous utility structs and functions.

use std::cmp::Ordering;
use std::fmt::Debug;

use cgmath::num_traits::Float;
use serde::{Deserialize, Serialize};

/// An interval on the real number line.
#[derive(Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    /// Creates a new interval.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: Float> Interval<T> {
    pub fn lerp(&self, t: T) -> T {
        self.min + t * (self.max - self.min)
    }

    pub fn inv_lerp(&self, value: T) -> T {
        (value - self.min) / (self.max - self.min)
    }
}

impl<T: Debug> Debug for Interval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interval({:?}, {:?})", &self.min, &self.max)
    }
}

/// Rounds a value to four decimal places, the precision telemetry is kept at.
pub fn round4(value: f64) -> f64 {
    (value * 1e4).round() / 1e4
}

/// Orders vehicle IDs so that a trailing number compares numerically,
/// e.g. `veh2` sorts before `veh10`. Falls back to plain string order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (a_stem, a_num) = split_numeric_suffix(a);
    let (b_stem, b_num) = split_numeric_suffix(b);
    a_stem
        .cmp(b_stem)
        .then_with(|| match (a_num, b_num) {
            (Some(x), Some(y)) => x.cmp(&y),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.cmp(b))
}

fn split_numeric_suffix(id: &str) -> (&str, Option<u64>) {
    let stem = id.trim_end_matches(|c: char| c.is_ascii_digit());
    let num = id[stem.len()..].parse().ok();
    (stem, num)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use itertools::Itertools;

    #[test]
    fn interval_lerp() {
        let range = Interval::new(4.5, 5.25);
        assert_approx_eq!(range.inv_lerp(4.5), 0.0);
        assert_approx_eq!(range.inv_lerp(5.25), 1.0);
        assert_approx_eq!(range.lerp(range.inv_lerp(4.8)), 4.8);
    }

    #[test]
    fn natural_order() {
        let ids = ["veh10", "veh2", "veh0", "veh1", "car"];
        let sorted = ids.iter().sorted_by(|a, b| natural_cmp(a, b)).collect_vec();
        assert_eq!(sorted, [&"car", &"veh0", &"veh1", &"veh2", &"veh10"]);
    }

    #[test]
    fn rounding() {
        assert_eq!(round4(1.234_56), 1.2346);
        assert_eq!(round4(-0.000_04), -0.0);
    }
}
