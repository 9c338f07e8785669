//! The experiment step loop.
//!
//! An experiment bootstraps the simulator, picks the leader, replays the
//! leader's speed profile and, once the baseline phase is over, drives every
//! follower with its controller while recording telemetry each step.

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::config::ExperimentConfig;
use crate::control::{Command, Measurement, NominalController};
use crate::profile::SpeedProfile;
use crate::reference::ReferenceSpeed;
use crate::simulator::Simulator;
use crate::telemetry::{Sample, Telemetry};
use crate::util::{natural_cmp, round4};
use crate::{Error, Result};

/// The phase of an experiment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Nothing has been simulated yet.
    Spawn,
    /// The leader replays its profile while the followers drive natively.
    OpenLoop,
    /// The followers are driven by their controllers.
    Controlled,
    /// The run has ended.
    Done,
}

/// Why a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The leader's profile ran out while the leader was still on the road.
    ProfileExhausted,
    /// Every vehicle left the simulation.
    VehiclesExited,
    /// The configured number of steps was simulated.
    StepBudget,
}

/// Everything recorded during a run.
#[derive(Clone, Debug)]
pub struct ExperimentOutput {
    /// The index of every recorded step.
    pub time_log: Vec<usize>,
    pub telemetry: Telemetry,
    pub leader_id: String,
    pub switch_step: usize,
    pub termination: Termination,
}

/// A single car following experiment.
#[derive(Clone, Debug)]
pub struct Experiment {
    config: ExperimentConfig,
    profile: SpeedProfile,
    reference: ReferenceSpeed,
    /// The nominal smoother of each follower, created on first use.
    smoothers: HashMap<String, NominalController>,
    /// The car following model name of each vehicle type.
    cf_models: HashMap<String, String>,
    phase: Phase,
    /// The index of the next step to record.
    step: usize,
    leader_id: Option<String>,
    termination: Option<Termination>,
    telemetry: Telemetry,
    time_log: Vec<usize>,
}

impl Experiment {
    /// Creates an experiment in which the leader follows `profile`.
    pub fn new(config: &ExperimentConfig, profile: SpeedProfile) -> Self {
        let cf_models = config
            .vehicle_types()
            .into_iter()
            .map(|(name, vtype)| (name, vtype.car_follow_model))
            .collect();
        Self {
            reference: ReferenceSpeed::new(config.simulation.switch_step()),
            config: config.clone(),
            profile,
            smoothers: HashMap::new(),
            cf_models,
            phase: Phase::Spawn,
            step: 0,
            leader_id: None,
            termination: None,
            telemetry: Telemetry::new(),
            time_log: vec![],
        }
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The index of the next step to be recorded.
    pub fn current_step(&self) -> usize {
        self.step
    }

    /// The leader's ID, once it has been chosen.
    pub fn leader_id(&self) -> Option<&str> {
        self.leader_id.as_deref()
    }

    /// The reference speed estimator.
    pub fn reference(&self) -> &ReferenceSpeed {
        &self.reference
    }

    /// The telemetry recorded so far.
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Runs the experiment to completion.
    pub fn run<S: Simulator>(mut self, sim: &mut S) -> Result<ExperimentOutput> {
        info!(
            "Running experiment: {} profile steps, control from step {}, budget {} steps",
            self.profile.len(),
            self.reference.switch_step(),
            self.config.simulation.step_budget()
        );
        let termination = loop {
            if let Some(termination) = self.step(sim)? {
                break termination;
            }
        };
        Ok(self.into_output(termination))
    }

    /// Packages the recorded data.
    pub fn into_output(self, termination: Termination) -> ExperimentOutput {
        ExperimentOutput {
            time_log: self.time_log,
            telemetry: self.telemetry,
            leader_id: self.leader_id.unwrap_or_default(),
            switch_step: self.reference.switch_step(),
            termination,
        }
    }

    /// Simulates one step. Returns why the run ended once it has.
    pub fn step<S: Simulator>(&mut self, sim: &mut S) -> Result<Option<Termination>> {
        match self.phase {
            Phase::Spawn => {
                self.spawn(sim)?;
                return Ok(None);
            }
            Phase::Done => return Ok(self.termination),
            Phase::OpenLoop | Phase::Controlled => {}
        }

        sim.advance()?;
        let ids = sim.vehicle_ids();
        if ids.is_empty() {
            info!("All vehicles have exited at step {}", self.step);
            return Ok(Some(self.finish(sim, Termination::VehiclesExited, true)));
        }

        let leader_id = self.leader_id.clone().unwrap_or_default();
        let leader_present = ids.contains(&leader_id);
        let step = self.step;
        let mut references = HashMap::new();

        if step < self.profile.len() {
            if self.reference.advance_to(step) {
                self.enter_controlled(sim, &ids)?;
            }
            if leader_present {
                let speed = self.profile.sample_at(step);
                sim.set_speed(&leader_id, speed)?;
                if let Some(reference) = self.reference.observe(step, speed) {
                    references = self.control_followers(sim, &ids, &leader_id, reference)?;
                }
            }
        } else if leader_present {
            info!("Leader profile finished at step {}", step);
            return Ok(Some(self.finish(sim, Termination::ProfileExhausted, true)));
        } else {
            debug!(
                "Leader profile finished at step {}, waiting for {} followers",
                step,
                ids.len()
            );
        }

        self.record(sim, &ids, &references);
        self.time_log.push(step);
        self.step += 1;

        if self.step == self.config.simulation.step_budget() {
            info!("Step budget of {} steps reached", self.step);
            return Ok(Some(self.finish(sim, Termination::StepBudget, false)));
        }
        Ok(None)
    }

    /// Performs the bootstrap step and designates the leader.
    fn spawn<S: Simulator>(&mut self, sim: &mut S) -> Result<()> {
        sim.advance()?;
        let leader_id = sim
            .vehicle_ids()
            .into_iter()
            .min_by(|a, b| natural_cmp(a, b))
            .ok_or(Error::NoVehicles)?;
        sim.set_native_control(&leader_id, false)?;
        info!("Leader is {}", leader_id);
        self.telemetry.set_leader(&leader_id);
        self.leader_id = Some(leader_id);
        self.phase = Phase::OpenLoop;
        Ok(())
    }

    /// Hands every present vehicle over to external control.
    fn enter_controlled<S: Simulator>(&mut self, sim: &mut S, ids: &[String]) -> Result<()> {
        for id in ids {
            sim.set_native_control(id, false)?;
            debug!("Native control disabled for {}", id);
        }
        info!("Controllers take over at step {}", self.step);
        self.phase = Phase::Controlled;
        Ok(())
    }

    /// Commands every follower that has a vehicle ahead within range.
    /// Returns the desired speed used for each commanded follower.
    fn control_followers<S: Simulator>(
        &mut self,
        sim: &mut S,
        ids: &[String],
        leader_id: &str,
        reference: f64,
    ) -> Result<HashMap<String, f64>> {
        let lookahead = self.config.simulation.lookahead;
        let period = self.config.simulation.period();
        let limits = self.config.nominal.limits();
        let mut references = HashMap::new();

        for id in ids.iter().filter(|id| id.as_str() != leader_id) {
            let Some(ahead) = sim.leader(id, lookahead)? else {
                warn!("At step {}, no leader found for {}", self.step, id);
                continue;
            };
            let m = Measurement {
                ego_speed: sim.speed(id)?,
                lead_speed: sim.speed(&ahead.id)?,
                gap: ahead.gap,
            };

            let controller = self.config.controller_for(id);
            let mut desired = reference;
            if self.config.nominal.enabled && controller.uses_reference() {
                let smoother = self.smoothers.entry(id.clone()).or_default();
                desired = smoother.update(m.ego_speed, reference, &limits, period);
            }
            let desired = round4(desired);

            match controller.command(desired, &m) {
                Command::Speed(speed) => sim.set_speed(id, speed)?,
                Command::Acceleration { acc, duration } => {
                    sim.set_acceleration(id, acc, duration)?
                }
            }
            references.insert(id.clone(), desired);
        }
        Ok(references)
    }

    /// Appends a sample for every present vehicle.
    fn record<S: Simulator>(
        &mut self,
        sim: &S,
        ids: &[String],
        references: &HashMap<String, f64>,
    ) {
        let lookahead = self.config.simulation.lookahead;
        for id in ids {
            if !self.telemetry.contains(id) {
                let cf_model = sim
                    .type_id(id)
                    .ok()
                    .and_then(|type_id| self.cf_models.get(&type_id).cloned())
                    .unwrap_or_else(|| "unknown".to_string());
                self.telemetry.register(id, || cf_model);
            }

            match measure(sim, id, self.step, lookahead) {
                Ok(sample) => {
                    let sample = Sample {
                        reference: references.get(id).copied(),
                        ..sample
                    };
                    self.telemetry.record(id, &sample);
                }
                Err(err) => warn!("No telemetry for {} at step {}: {}", id, self.step, err),
            }
        }
    }

    fn finish<S: Simulator>(
        &mut self,
        sim: &mut S,
        termination: Termination,
        close: bool,
    ) -> Termination {
        self.phase = Phase::Done;
        self.termination = Some(termination);
        if close {
            sim.close();
        }
        termination
    }
}

/// Reads a vehicle's state, rounded to the precision telemetry is kept at.
fn measure<S: Simulator>(sim: &S, id: &str, step: usize, lookahead: f64) -> Result<Sample> {
    let (x, y) = sim.position(id)?;
    Ok(Sample {
        step,
        speed: round4(sim.speed(id)?),
        acceleration: round4(sim.acceleration(id)?),
        x: round4(x),
        y: round4(y),
        headway: sim.leader(id, lookahead)?.map(|ahead| round4(ahead.gap)),
        reference: None,
    })
}
