//! Tests that involve the simulation of a single lane.

use assert_approx_eq::assert_approx_eq;
use follower_stopper::{LaneSimulation, Road, Simulator, VehicleType};

fn car() -> VehicleType {
    VehicleType::new("IDM", 2.0, 2.0, 1.5, 2.0, 16.66)
}

/// Test that a vehicle's position increases monotonically.
#[test]
fn vehicle_drives_forward() {
    let mut sim = LaneSimulation::new(Road::Straight { length: 1000.0 }, 0.1);
    sim.add_vehicle("veh0", "car", &car(), 0.0, 0);
    sim.step();

    let mut pos = sim.get_vehicle("veh0").unwrap().pos_front();
    for _ in 0..100 {
        sim.step();
        let next_pos = sim.get_vehicle("veh0").unwrap().pos_front();
        assert!(next_pos > pos);
        pos = next_pos;
    }
    assert!(sim.speed("veh0").unwrap() <= 16.66);
}

/// Test that vehicles on a ring road stay on the circle and keep their order.
#[test]
fn ring_road_platoon() {
    let circumference = 200.0;
    let radius = circumference / std::f64::consts::TAU;
    let mut sim = LaneSimulation::new(Road::Ring { circumference }, 0.1);
    for i in 0..5 {
        sim.add_vehicle(&format!("veh{}", i), "car", &car(), 160.0 - 40.0 * i as f64, 0);
    }

    for _ in 0..1000 {
        sim.step();
        for id in sim.vehicle_ids() {
            let (x, y) = sim.position(&id).unwrap();
            assert_approx_eq!(x.hypot(y - radius), radius, 1e-6);
            let leader = sim.leader(&id, circumference).unwrap().unwrap();
            assert!(leader.gap > 0.0);
        }
    }
    assert_eq!(sim.vehicle_ids().len(), 5);
    assert_eq!(sim.leader("veh1", 1000.0).unwrap().unwrap().id, "veh0");
    assert_eq!(sim.leader("veh0", 1000.0).unwrap().unwrap().id, "veh4");
}

/// Test that a vehicle scheduled for a later step only appears then.
#[test]
fn delayed_departure() {
    let mut sim = LaneSimulation::new(Road::default(), 0.1);
    sim.add_vehicle("veh0", "car", &car(), 0.0, 3);
    for _ in 0..3 {
        sim.advance().unwrap();
        assert!(sim.vehicle_ids().is_empty());
    }
    sim.advance().unwrap();
    assert_eq!(sim.vehicle_ids(), ["veh0"]);
    assert_eq!(sim.type_id("veh0").unwrap(), "car");
    assert_eq!(sim.frame(), 4);
}
