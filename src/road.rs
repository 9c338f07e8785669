//! Single-lane road geometry.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::math::Point2d;

/// A single lane of traffic.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Road {
    /// A straight road along the x axis. Vehicles leave the simulation
    /// once their front passes the end.
    Straight { length: f64 },
    /// A circular road. Vehicles drive around it indefinitely.
    Ring { circumference: f64 },
}

impl Default for Road {
    fn default() -> Self {
        Road::Straight { length: 10_000.0 }
    }
}

impl Road {
    /// The length of the road in m.
    pub fn length(&self) -> f64 {
        match *self {
            Road::Straight { length } => length,
            Road::Ring { circumference } => circumference,
        }
    }

    /// Maps a longitudinal position onto the road, or `None` if it lies past
    /// the end of a straight road.
    pub fn wrap(&self, pos: f64) -> Option<f64> {
        match *self {
            Road::Straight { length } => (pos <= length).then_some(pos),
            Road::Ring { circumference } => Some(pos.rem_euclid(circumference)),
        }
    }

    /// The distance travelled along the road from `from` to reach `to`,
    /// or `None` if `to` is behind `from` on a straight road.
    pub fn distance_ahead(&self, from: f64, to: f64) -> Option<f64> {
        match *self {
            Road::Straight { .. } => (to >= from).then_some(to - from),
            Road::Ring { circumference } => Some((to - from).rem_euclid(circumference)),
        }
    }

    /// The world space coordinates of a longitudinal position.
    /// Both roads start at the origin heading along the positive x axis.
    pub fn world_position(&self, pos: f64) -> Point2d {
        match *self {
            Road::Straight { .. } => Point2d::new(pos, 0.0),
            Road::Ring { circumference } => {
                let radius = circumference / TAU;
                let angle = pos / radius;
                Point2d::new(radius * angle.sin(), radius * (1.0 - angle.cos()))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn straight_road() {
        let road = Road::Straight { length: 100.0 };
        assert_eq!(road.wrap(99.0), Some(99.0));
        assert_eq!(road.wrap(100.5), None);
        assert_eq!(road.distance_ahead(10.0, 25.0), Some(15.0));
        assert_eq!(road.distance_ahead(25.0, 10.0), None);
        assert_eq!(road.world_position(42.0), Point2d::new(42.0, 0.0));
    }

    #[test]
    fn ring_road() {
        let road = Road::Ring { circumference: 100.0 };
        assert_approx_eq!(road.wrap(130.0).unwrap(), 30.0);
        assert_approx_eq!(road.distance_ahead(90.0, 10.0).unwrap(), 20.0);

        let half = road.world_position(50.0);
        assert_approx_eq!(half.x, 0.0);
        assert_approx_eq!(half.y, 100.0 / std::f64::consts::PI);
        let full = road.world_position(100.0);
        assert_approx_eq!(full.x, 0.0);
        assert_approx_eq!(full.y, 0.0);
    }
}
