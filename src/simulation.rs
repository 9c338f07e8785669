use crate::config::VehiclePlan;
use crate::error::ConfigError;
use crate::road::Road;
use crate::simulator::{Leader, Simulator};
use crate::util::natural_cmp;
use crate::vehicle::{Vehicle, VehicleType};
use crate::{Error, Result, VehicleId, VehicleSet};
use itertools::Itertools;
use log::{debug, warn};
use rand::Rng;
use rand_distr::Distribution;
use std::collections::HashMap;

/// The smallest and largest desired velocity adjustment factors.
const VELOCITY_ADJUST_RANGE: (f64, f64) = (0.75, 1.25);

/// A vehicle waiting to be inserted into the simulation.
#[derive(Clone, Debug)]
struct Departure {
    name: String,
    type_id: String,
    vtype: VehicleType,
    pos: f64,
    depart: usize,
    velocity_adjust: f64,
}

/// A kinematic traffic simulation of a single lane.
///
/// Vehicles that are not under external control follow the vehicle ahead
/// with the intelligent driver model.
#[derive(Clone, Debug)]
pub struct LaneSimulation {
    /// The road the vehicles drive on.
    road: Road,
    /// The time step in s.
    dt: f64,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// Maps external vehicle names to keys.
    ids: HashMap<String, VehicleId>,
    /// Vehicles that have not departed yet.
    departures: Vec<Departure>,
    /// The current frame of simulation.
    frame: usize,
}

impl LaneSimulation {
    /// Creates an empty simulation that advances `dt` seconds per step.
    pub fn new(road: Road, dt: f64) -> Self {
        Self {
            road,
            dt,
            vehicles: VehicleSet::default(),
            ids: HashMap::new(),
            departures: vec![],
            frame: 0,
        }
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Schedules a vehicle to enter the simulation at rest during step `depart`.
    ///
    /// # Parameters
    /// * `name` - The vehicle's external name; must be unique.
    /// * `type_id` - The name of the vehicle's type.
    /// * `vtype` - The vehicle type's parameters.
    /// * `pos` - The longitudinal position of the vehicle's front in m.
    /// * `depart` - The step during which the vehicle is inserted.
    pub fn add_vehicle(
        &mut self,
        name: &str,
        type_id: &str,
        vtype: &VehicleType,
        pos: f64,
        depart: usize,
    ) {
        if self.ids.contains_key(name) || self.departures.iter().any(|d| d.name == name) {
            warn!("Vehicle {} already exists, ignoring", name);
            return;
        }
        self.departures.push(Departure {
            name: name.to_string(),
            type_id: type_id.to_string(),
            vtype: vtype.clone(),
            pos,
            depart,
            velocity_adjust: 1.0,
        });
    }

    /// Schedules the leader `veh0` and the followers of `plan` to depart at step 0,
    /// lined up `spacing` metres apart with the leader in front.
    pub fn spawn_plan(
        &mut self,
        leader_type: &str,
        types: &HashMap<String, VehicleType>,
        plan: &[VehiclePlan],
        spacing: f64,
    ) -> std::result::Result<(), ConfigError> {
        let lookup = |name: &str| {
            types
                .get(name)
                .ok_or_else(|| ConfigError::UnknownVehicleType(name.to_string()))
        };

        let followers = plan.iter().map(|p| p.count).sum::<usize>();
        let start = spacing * followers as f64;
        self.add_vehicle("veh0", leader_type, lookup(leader_type)?, start, 0);

        let mut idx = 1;
        for entry in plan {
            let vtype = lookup(&entry.vehicle_type)?;
            for _ in 0..entry.count {
                let pos = start - idx as f64 * spacing;
                self.add_vehicle(&format!("veh{}", idx), &entry.vehicle_type, vtype, pos, 0);
                idx += 1;
            }
        }
        Ok(())
    }

    /// Randomly assigns a desired velocity adjustment factor to each vehicle,
    /// which is sampled from a normal distribution with a mean of 1 (no adjustment)
    /// and standard deviation of `stddev`.
    pub fn randomise_velocity_adjusts(
        &mut self,
        stddev: f64,
        rng: &mut impl Rng,
    ) -> std::result::Result<(), ConfigError> {
        ConfigError::non_negative("speed_factor_stddev", stddev)?;
        let distr = rand_distr::Normal::new(1.0, stddev).map_err(|_| ConfigError::Negative {
            field: "speed_factor_stddev",
            value: stddev,
        })?;
        let (min, max) = VELOCITY_ADJUST_RANGE;
        for departure in &mut self.departures {
            departure.velocity_adjust = distr.sample(rng).clamp(min, max);
        }
        for vehicle in self.vehicles.values_mut() {
            vehicle.set_velocity_adjust(distr.sample(rng).clamp(min, max));
        }
        Ok(())
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a vehicle by its external name.
    pub fn get_vehicle(&self, name: &str) -> Option<&Vehicle> {
        self.ids.get(name).map(|id| &self.vehicles[*id])
    }

    /// Advances the simulation by one time step.
    pub fn step(&mut self) {
        self.apply_accelerations();
        self.integrate();
        self.advance_vehicles();
        self.insert_departures();
        self.update_vehicle_coords();
        self.frame += 1;
    }

    fn vehicle(&self, name: &str) -> Result<&Vehicle> {
        self.get_vehicle(name)
            .ok_or_else(|| Error::UnknownVehicle(name.to_string()))
    }

    fn vehicle_mut(&mut self, name: &str) -> Result<&mut Vehicle> {
        let id = *self
            .ids
            .get(name)
            .ok_or_else(|| Error::UnknownVehicle(name.to_string()))?;
        Ok(&mut self.vehicles[id])
    }

    /// Finds the nearest vehicle ahead of `vehicle`, returning it and the gap to its rear.
    fn nearest_ahead(&self, vehicle: &Vehicle) -> Option<(&Vehicle, f64)> {
        self.vehicles
            .values()
            .filter(|other| other.id() != vehicle.id())
            .filter_map(|other| {
                let dist = self
                    .road
                    .distance_ahead(vehicle.pos_front(), other.pos_front())?;
                (dist > 0.0).then_some((other, dist))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(other, dist)| (other, dist - other.length()))
    }

    /// Applies the car following model and speed limits to all vehicles.
    fn apply_accelerations(&self) {
        for vehicle in self.vehicles.values() {
            vehicle.reset();
            if let Some((leader, gap)) = self.nearest_ahead(vehicle) {
                vehicle.follow_vehicle(gap, leader.vel());
            }
        }
    }

    /// Integrates the velocities and positions of all vehicles.
    fn integrate(&mut self) {
        for vehicle in self.vehicles.values_mut() {
            vehicle.integrate(self.dt);
        }
    }

    /// Wraps vehicles around a ring road, or removes those that have
    /// driven off the end of a straight road.
    fn advance_vehicles(&mut self) {
        let mut exited = vec![];
        for (vehicle_id, vehicle) in &mut self.vehicles {
            if !vehicle.advance(&self.road) {
                exited.push(vehicle_id);
            }
        }
        for vehicle_id in exited {
            if let Some(vehicle) = self.vehicles.remove(vehicle_id) {
                debug!("Vehicle {} left the road at step {}", vehicle.name(), self.frame);
                self.ids.remove(vehicle.name());
            }
        }
    }

    /// Inserts vehicles whose departure step has come.
    fn insert_departures(&mut self) {
        let frame = self.frame;
        let (departing, waiting) = std::mem::take(&mut self.departures)
            .into_iter()
            .partition::<Vec<_>, _>(|d| d.depart <= frame);
        self.departures = waiting;

        for d in departing {
            let vehicle_id = self.vehicles.insert_with_key(|id| {
                let mut vehicle = Vehicle::new(id, &d.name, &d.type_id, &d.vtype, d.pos);
                vehicle.set_velocity_adjust(d.velocity_adjust);
                vehicle
            });
            self.ids.insert(d.name, vehicle_id);
        }
    }

    /// Updates the world coordinates of all the vehicles.
    fn update_vehicle_coords(&mut self) {
        for vehicle in self.vehicles.values_mut() {
            vehicle.update_coords(&self.road);
        }
    }
}

impl Simulator for LaneSimulation {
    fn advance(&mut self) -> Result<()> {
        self.step();
        Ok(())
    }

    fn vehicle_ids(&self) -> Vec<String> {
        self.ids
            .keys()
            .sorted_by(|a, b| natural_cmp(a, b))
            .cloned()
            .collect()
    }

    fn speed(&self, id: &str) -> Result<f64> {
        Ok(self.vehicle(id)?.vel())
    }

    fn acceleration(&self, id: &str) -> Result<f64> {
        Ok(self.vehicle(id)?.acceleration())
    }

    fn position(&self, id: &str) -> Result<(f64, f64)> {
        let pos = self.vehicle(id)?.position();
        Ok((pos.x, pos.y))
    }

    fn type_id(&self, id: &str) -> Result<String> {
        Ok(self.vehicle(id)?.type_id().to_string())
    }

    fn leader(&self, id: &str, max_distance: f64) -> Result<Option<Leader>> {
        let vehicle = self.vehicle(id)?;
        Ok(self
            .nearest_ahead(vehicle)
            .filter(|(_, gap)| *gap <= max_distance)
            .map(|(leader, gap)| Leader {
                id: leader.name().to_string(),
                gap,
            }))
    }

    fn set_speed(&mut self, id: &str, speed: f64) -> Result<()> {
        self.vehicle_mut(id)?.command_speed(speed);
        Ok(())
    }

    fn set_acceleration(&mut self, id: &str, acc: f64, duration: f64) -> Result<()> {
        self.vehicle_mut(id)?.command_acceleration(acc, duration);
        Ok(())
    }

    fn set_native_control(&mut self, id: &str, enabled: bool) -> Result<()> {
        self.vehicle_mut(id)?.set_native(enabled);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;

    fn idm() -> VehicleType {
        VehicleType::new("IDM", 1.5, 3.5, 4.0, 10.0, 30.0)
    }

    fn plan(count: usize) -> Vec<VehiclePlan> {
        vec![VehiclePlan {
            vehicle_type: "idm_follower".to_string(),
            count,
        }]
    }

    fn types() -> HashMap<String, VehicleType> {
        HashMap::from([("idm_follower".to_string(), idm())])
    }

    #[test]
    fn vehicles_depart_on_first_step() {
        let mut sim = LaneSimulation::new(Road::default(), 0.1);
        sim.spawn_plan("idm_follower", &types(), &plan(3), 12.0).unwrap();
        assert!(sim.vehicle_ids().is_empty());

        sim.advance().unwrap();
        assert_eq!(sim.vehicle_ids(), ["veh0", "veh1", "veh2", "veh3"]);
        assert_eq!(sim.position("veh0").unwrap(), (36.0, 0.0));
        assert_eq!(sim.position("veh3").unwrap(), (0.0, 0.0));
    }

    #[test]
    fn unknown_vehicle_type_is_rejected() {
        let mut sim = LaneSimulation::new(Road::default(), 0.1);
        let err = sim.spawn_plan("krauss_follower", &types(), &plan(1), 12.0);
        assert_eq!(
            err,
            Err(ConfigError::UnknownVehicleType("krauss_follower".to_string()))
        );
    }

    #[test]
    fn leader_is_nearest_vehicle_ahead() {
        let mut sim = LaneSimulation::new(Road::default(), 0.1);
        sim.spawn_plan("idm_follower", &types(), &plan(2), 12.0).unwrap();
        sim.advance().unwrap();

        let leader = sim.leader("veh2", 100.0).unwrap().unwrap();
        assert_eq!(leader.id, "veh1");
        assert_approx_eq!(leader.gap, 7.0);
        assert_eq!(sim.leader("veh2", 5.0).unwrap(), None);
        assert_eq!(sim.leader("veh0", 100.0).unwrap(), None);
        assert!(matches!(
            sim.leader("veh9", 100.0),
            Err(Error::UnknownVehicle(id)) if id == "veh9"
        ));
    }

    #[test]
    fn ring_road_wraps_leader_search() {
        let road = Road::Ring {
            circumference: 100.0,
        };
        let mut sim = LaneSimulation::new(road, 0.1);
        sim.add_vehicle("veh0", "idm_follower", &idm(), 90.0, 0);
        sim.add_vehicle("veh1", "idm_follower", &idm(), 10.0, 0);
        sim.advance().unwrap();

        let leader = sim.leader("veh0", 100.0).unwrap().unwrap();
        assert_eq!(leader.id, "veh1");
        assert_approx_eq!(leader.gap, 15.0);
    }

    #[test]
    fn vehicles_leave_straight_road() {
        let road = Road::Straight { length: 20.0 };
        let mut sim = LaneSimulation::new(road, 0.5);
        sim.add_vehicle("veh0", "idm_follower", &idm(), 15.0, 0);
        sim.advance().unwrap();
        sim.set_native_control("veh0", false).unwrap();
        sim.set_speed("veh0", 10.0).unwrap();
        sim.advance().unwrap();
        assert_approx_eq!(sim.speed("veh0").unwrap(), 10.0);
        sim.advance().unwrap();
        assert!(sim.vehicle_ids().is_empty());
        assert!(sim.speed("veh0").is_err());
    }

    #[test]
    fn followers_do_not_collide() {
        let mut sim = LaneSimulation::new(Road::default(), 0.1);
        sim.spawn_plan("idm_follower", &types(), &plan(4), 12.0).unwrap();
        sim.advance().unwrap();
        sim.set_native_control("veh0", false).unwrap();
        for step in 0..600 {
            let speed = if step < 300 { 15.0 } else { 0.0 };
            sim.set_speed("veh0", speed).unwrap();
            sim.advance().unwrap();
            for id in sim.vehicle_ids().iter().skip(1) {
                let leader = sim.leader(id, 1000.0).unwrap().unwrap();
                assert!(leader.gap > 0.0, "{} collided at step {}", id, step);
            }
        }
    }

    #[test]
    fn velocity_adjusts_are_clamped() {
        let mut sim = LaneSimulation::new(Road::default(), 0.1);
        sim.spawn_plan("idm_follower", &types(), &plan(20), 12.0).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        sim.randomise_velocity_adjusts(0.5, &mut rng).unwrap();
        sim.advance().unwrap();
        for vehicle in sim.iter_vehicles() {
            assert!((0.75..=1.25).contains(&vehicle.velocity_adjust()));
        }
        assert_eq!(
            sim.randomise_velocity_adjusts(-1.0, &mut rng),
            Err(ConfigError::Negative {
                field: "speed_factor_stddev",
                value: -1.0
            })
        );
        assert!(sim.randomise_velocity_adjusts(f64::NAN, &mut rng).is_err());
    }
}
