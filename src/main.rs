use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use follower_stopper::{Experiment, ExperimentConfig, LaneSimulation, Result, Telemetry};
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// The experiment configuration. Defaults are used when omitted.
    #[arg(short = 'c', long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,
    /// A recorded leader speed trace, replacing the configured leader source.
    #[arg(short = 't', long, value_name = "TRACE_FILE")]
    trace: Option<PathBuf>,
    /// Where to write the telemetry, as `.csv` or `.json`.
    #[arg(short = 'o', long, value_name = "OUTPUT_FILE")]
    output: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let args = CliArgs::parse();
    if let Err(err) = run(&args) {
        eprintln!("Experiment failed: {}", err);
        std::process::exit(1);
    }
}

fn run(args: &CliArgs) -> Result<()> {
    let start = Instant::now();
    let mut config = match &args.config {
        Some(path) => ExperimentConfig::from_path(path)?,
        None => ExperimentConfig::default(),
    };
    if let Some(trace) = &args.trace {
        config.set_trace_path(trace.clone());
    }
    config.validate()?;

    let profile = config.leader_profile()?;
    let mut sim = LaneSimulation::new(config.network.road, config.simulation.period());
    sim.spawn_plan(
        &config.leader_type,
        &config.vehicle_types(),
        &config.vehicle_plan,
        config.network.spacing,
    )?;
    if let Some(stddev) = config.speed_factor_stddev {
        sim.randomise_velocity_adjusts(stddev, &mut rand::thread_rng())?;
    }

    let output = Experiment::new(&config, profile).run(&mut sim)?;
    if let Some(path) = &args.output {
        write_telemetry(path, &output.telemetry)?;
    }

    println!(
        "Experiment finished after {} steps ({:?}) with {} vehicles in {} ms.",
        output.time_log.len(),
        output.termination,
        output.telemetry.len(),
        start.elapsed().as_millis()
    );
    Ok(())
}

fn write_telemetry(path: &Path, telemetry: &Telemetry) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => telemetry.write_json(writer)?,
        _ => telemetry.write_csv(writer)?,
    }
    info!("Telemetry written to {}", path.display());
    Ok(())
}
