//! End-to-end experiments against the built-in simulator.

use std::io::Write;

use follower_stopper::config::{LeaderSource, VehiclePlan};
use follower_stopper::{
    Experiment, ExperimentConfig, ExperimentOutput, LaneSimulation, Termination,
};

fn run(config: &ExperimentConfig) -> ExperimentOutput {
    config.validate().unwrap();
    let profile = config.leader_profile().unwrap();
    let mut sim = LaneSimulation::new(config.network.road, config.simulation.period());
    sim.spawn_plan(
        &config.leader_type,
        &config.vehicle_types(),
        &config.vehicle_plan,
        config.network.spacing,
    )
    .unwrap();
    Experiment::new(config, profile).run(&mut sim).unwrap()
}

/// Followers track a leader replaying a recorded trace without colliding.
#[test]
fn follows_recorded_trace() {
    let mut trace = tempfile::NamedTempFile::new().unwrap();
    writeln!(trace, "Time,Message").unwrap();
    for t in 0..=30 {
        writeln!(trace, "{}.0,36.0", 1627337420 + t).unwrap();
    }

    let mut config = ExperimentConfig::default();
    config.simulation.frequency = 10.0;
    config.simulation.baseline_duration = 5.0;
    config.simulation.interrupt_time = 100.0;
    config.vehicle_plan = vec![VehiclePlan {
        vehicle_type: "idm_follower".to_string(),
        count: 3,
    }];
    config.set_trace_path(trace.path().to_path_buf());

    let output = run(&config);
    assert_eq!(output.termination, Termination::ProfileExhausted);
    assert_eq!(output.leader_id, "veh0");
    assert_eq!(output.switch_step, 50);
    assert_eq!(output.time_log.len(), 300);
    assert_eq!(output.telemetry.len(), 4);

    for record in output.telemetry.iter() {
        assert_eq!(record.len(), 300);
        assert_eq!(record.cf_model(), "IDM");
        assert!(record.headway().iter().flatten().all(|gap| *gap > 0.0));
        if record.id() == "veh0" {
            assert!(record.reference().iter().all(Option::is_none));
        } else {
            assert!(record.reference()[..50].iter().all(Option::is_none));
            assert!(record.reference()[50..].iter().all(|r| *r == Some(10.0)));
        }
    }
    let leader = output.telemetry.get("veh0").unwrap();
    assert_eq!(leader.speed()[299], 10.0);

    let rows = output.telemetry.rows();
    assert_eq!(rows.len(), 1200);
    assert_eq!(rows[0].role, "Leader");
    assert_eq!(rows[3].vehicle_id, "veh3");
    assert_eq!(rows[3].role, "Follower3");
}

/// A ring road run with mixed controllers is cut short by the step budget.
#[test]
fn ring_road_with_mixed_controllers() {
    let config: ExperimentConfig = r#"
        [simulation]
        frequency = 10.0
        baseline_duration = 3.0
        interrupt_time = 20.0

        [leader.source]
        kind = "stop_and_go"
        duration = 60.0

        [network]
        kind = "ring"
        circumference = 300.0

        [[vehicle_plan]]
        vehicle_type = "cacc_follower"
        count = 2

        [[vehicle_plan]]
        vehicle_type = "krauss_follower"
        count = 2

        [nominal]
        enabled = true

        [controllers.veh3]
        kind = "accel_based"
        desired_gap = 5.0
        gain = 0.3
        max_accel = 2.5
        max_decel = 4.5
    "#
    .parse()
    .unwrap();
    assert!(matches!(
        config.leader.source,
        LeaderSource::StopAndGo { .. }
    ));

    let output = run(&config);
    assert_eq!(output.termination, Termination::StepBudget);
    assert_eq!(output.time_log.len(), 200);
    let models = output.telemetry.cf_models().collect::<Vec<_>>();
    assert_eq!(
        models,
        [
            ("veh0", "IDM"),
            ("veh1", "CACC"),
            ("veh2", "CACC"),
            ("veh3", "Krauss"),
            ("veh4", "Krauss"),
        ]
    );
    for record in output.telemetry.iter() {
        assert_eq!(record.len(), 200);
    }
}

/// An unreadable trace yields an empty profile, so the run ends at once.
#[test]
fn empty_trace_ends_run() {
    let mut trace = tempfile::NamedTempFile::new().unwrap();
    writeln!(trace, "Time,Speed").unwrap();
    writeln!(trace, "0.0,10.0").unwrap();

    let mut config = ExperimentConfig::default();
    config.set_trace_path(trace.path().to_path_buf());
    let output = run(&config);
    assert_eq!(output.termination, Termination::ProfileExhausted);
    assert!(output.time_log.is_empty());
}

#[test]
fn malformed_trace_ends_run() {
    let mut trace = tempfile::NamedTempFile::new().unwrap();
    trace
        .write_all(b"Time,Message\n0.0,10,3\n\xff\xfe,20\n")
        .unwrap();
    trace.flush().unwrap();

    let mut config = ExperimentConfig::default();
    config.set_trace_path(trace.path().to_path_buf());
    let output = run(&config);
    assert_eq!(output.termination, Termination::ProfileExhausted);
    assert!(output.time_log.is_empty());
}
