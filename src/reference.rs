//! Rolling reference speed estimation.

use std::collections::VecDeque;

use log::info;

/// The number of leader speed samples averaged into the reference speed.
pub const HISTORY_CAPACITY: usize = 200;

/// The phase of an experiment, as far as the reference speed is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferencePhase {
    /// Followers drive under the simulator's native model; speeds are only collected.
    Baseline,
    /// Followers are controlled and track the rolling reference speed.
    Controlled,
}

/// Tracks the leader's recent speeds and derives the followers' reference speed.
///
/// Before the switch step the leader's speeds are merely collected. At the
/// switch step the mean of the last [HISTORY_CAPACITY] samples seeds the
/// reference, and from then on every new sample updates a rolling mean over
/// the same window.
#[derive(Clone, Debug)]
pub struct ReferenceSpeed {
    /// The most recent leader speeds, oldest first.
    history: VecDeque<f64>,
    /// The step at which control starts.
    switch_step: usize,
    /// The current phase.
    phase: ReferencePhase,
    /// The reference speed computed from the baseline phase, if one was collected.
    seed: Option<f64>,
    /// The latest reference speed.
    reference: Option<f64>,
}

impl ReferenceSpeed {
    /// Creates an estimator that switches to the controlled phase at `switch_step`.
    pub fn new(switch_step: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
            switch_step,
            phase: ReferencePhase::Baseline,
            seed: None,
            reference: None,
        }
    }

    /// The step at which control starts.
    pub fn switch_step(&self) -> usize {
        self.switch_step
    }

    /// The current phase.
    pub fn phase(&self) -> ReferencePhase {
        self.phase
    }

    /// Whether the controlled phase has started.
    pub fn is_controlled(&self) -> bool {
        self.phase == ReferencePhase::Controlled
    }

    /// The mean of the baseline speeds at the switch step.
    pub fn seed(&self) -> Option<f64> {
        self.seed
    }

    /// The latest reference speed, if control has started.
    pub fn reference(&self) -> Option<f64> {
        self.reference
    }

    /// The number of samples in the rolling window.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Enters the controlled phase if `step` is the switch step.
    /// Returns `true` exactly once, on the transition.
    pub fn advance_to(&mut self, step: usize) -> bool {
        if self.phase != ReferencePhase::Baseline || step != self.switch_step {
            return false;
        }
        self.phase = ReferencePhase::Controlled;
        self.seed = self.mean();
        match self.seed {
            Some(seed) => info!(
                "Initial reference speed from last {} baseline steps: {:.2} m/s",
                self.history.len(),
                seed
            ),
            None => info!("Control starts at step {} with no baseline speeds", step),
        }
        true
    }

    /// Records the leader's speed at `step` and returns the reference speed
    /// once the controlled phase has started.
    pub fn observe(&mut self, step: usize, leader_speed: f64) -> Option<f64> {
        self.advance_to(step);
        self.push(leader_speed);
        if self.is_controlled() {
            self.reference = self.mean();
        }
        self.reference
    }

    /// Appends a sample, evicting the oldest beyond the window size.
    fn push(&mut self, speed: f64) {
        self.history.push_back(speed);
        if self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
    }

    /// The arithmetic mean of the window.
    fn mean(&self) -> Option<f64> {
        if self.history.is_empty() {
            None
        } else {
            Some(self.history.iter().sum::<f64>() / self.history.len() as f64)
        }
    }
}
