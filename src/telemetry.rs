//! Per-vehicle time series recorded while an experiment runs.

use std::collections::HashMap;
use std::io::Write;

use itertools::Itertools;
use serde::Serialize;
use slotmap::{new_key_type, SlotMap};

use crate::util::natural_cmp;
use crate::Result;

new_key_type! {
    /// Unique key of a [VehicleRecord] within a [Telemetry] arena.
    pub struct RecordKey;
}

/// One step's worth of measurements for a single vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    /// The step index.
    pub step: usize,
    /// The speed in m/s.
    pub speed: f64,
    /// The acceleration in m/s<sup>2</sup>.
    pub acceleration: f64,
    /// The x coordinate in m.
    pub x: f64,
    /// The y coordinate in m.
    pub y: f64,
    /// The gap to the vehicle ahead in m, if there is one.
    pub headway: Option<f64>,
    /// The reference speed used to control the vehicle this step, if it was controlled.
    pub reference: Option<f64>,
}

/// The recorded history of a single vehicle.
///
/// All series have the same length and grow by one element per recorded step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VehicleRecord {
    id: String,
    cf_model: String,
    steps: Vec<usize>,
    speed: Vec<f64>,
    acceleration: Vec<f64>,
    x: Vec<f64>,
    y: Vec<f64>,
    headway: Vec<Option<f64>>,
    reference: Vec<Option<f64>>,
}

impl VehicleRecord {
    fn new(id: &str, cf_model: String) -> Self {
        Self {
            id: id.to_string(),
            cf_model,
            ..Default::default()
        }
    }

    fn push(&mut self, sample: &Sample) {
        self.steps.push(sample.step);
        self.speed.push(sample.speed);
        self.acceleration.push(sample.acceleration);
        self.x.push(sample.x);
        self.y.push(sample.y);
        self.headway.push(sample.headway);
        self.reference.push(sample.reference);
    }

    /// The vehicle's ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The name of the car following model the vehicle's type declares.
    pub fn cf_model(&self) -> &str {
        &self.cf_model
    }

    /// The number of recorded steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The step indices at which the vehicle was recorded.
    pub fn steps(&self) -> &[usize] {
        &self.steps
    }

    pub fn speed(&self) -> &[f64] {
        &self.speed
    }

    pub fn acceleration(&self) -> &[f64] {
        &self.acceleration
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn headway(&self) -> &[Option<f64>] {
        &self.headway
    }

    pub fn reference(&self) -> &[Option<f64>] {
        &self.reference
    }

    /// Gets the `idx`th recorded sample.
    pub fn sample(&self, idx: usize) -> Option<Sample> {
        Some(Sample {
            step: *self.steps.get(idx)?,
            speed: self.speed[idx],
            acceleration: self.acceleration[idx],
            x: self.x[idx],
            y: self.y[idx],
            headway: self.headway[idx],
            reference: self.reference[idx],
        })
    }
}

/// A flattened telemetry row, suitable for writing to CSV.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetryRow {
    pub time_step: usize,
    pub vehicle_id: String,
    pub role: String,
    pub speed_mps: f64,
    pub acceleration: f64,
    pub x: f64,
    pub y: f64,
    pub space_headway: Option<f64>,
    pub ref_vels: Option<f64>,
}

/// An arena of vehicle records keyed by vehicle ID.
#[derive(Clone, Debug, Default)]
pub struct Telemetry {
    records: SlotMap<RecordKey, VehicleRecord>,
    index: HashMap<String, RecordKey>,
    leader: Option<String>,
}

impl Telemetry {
    /// Creates empty telemetry.
    pub fn new() -> Self {
        Default::default()
    }

    /// Marks the vehicle whose rows are labelled `Leader`.
    pub fn set_leader(&mut self, id: &str) {
        self.leader = Some(id.to_string());
    }

    /// The ID of the leader, if one has been marked.
    pub fn leader(&self) -> Option<&str> {
        self.leader.as_deref()
    }

    /// Whether a record exists for the vehicle.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Creates the record for a vehicle, if it doesn't exist yet.
    /// `cf_model` is only evaluated for new records.
    pub fn register(&mut self, id: &str, cf_model: impl FnOnce() -> String) -> RecordKey {
        if let Some(key) = self.index.get(id) {
            return *key;
        }
        let key = self.records.insert(VehicleRecord::new(id, cf_model()));
        self.index.insert(id.to_string(), key);
        key
    }

    /// Appends a sample to a vehicle's record, creating the record if needed.
    pub fn record(&mut self, id: &str, sample: &Sample) {
        let key = self.register(id, || "unknown".to_string());
        self.records[key].push(sample);
    }

    /// Gets a vehicle's record.
    pub fn get(&self, id: &str) -> Option<&VehicleRecord> {
        self.index.get(id).map(|key| &self.records[*key])
    }

    /// The number of vehicles with a record.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no vehicle has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The records, ordered by vehicle ID with numeric suffixes compared numerically.
    pub fn iter(&self) -> impl Iterator<Item = &VehicleRecord> {
        self.records
            .values()
            .sorted_by(|a, b| natural_cmp(&a.id, &b.id))
    }

    /// The car following model declared for each vehicle.
    pub fn cf_models(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().map(|r| (r.id(), r.cf_model()))
    }

    /// Flattens the records into rows ordered by step, then by vehicle.
    /// The leader comes first and is labelled `Leader`; the other vehicles
    /// follow in ID order as `Follower1`, `Follower2`, ...
    pub fn rows(&self) -> Vec<TelemetryRow> {
        let is_leader = |record: &VehicleRecord| self.leader.as_deref() == Some(record.id());
        let (leaders, followers): (Vec<_>, Vec<_>) = self.iter().partition(|r| is_leader(r));
        let roles = |i: usize| match i.checked_sub(leaders.len()) {
            None => "Leader".to_string(),
            Some(i) => format!("Follower{}", i + 1),
        };
        leaders
            .iter()
            .chain(&followers)
            .enumerate()
            .flat_map(|(i, record)| {
                let role = roles(i);
                (0..record.len()).filter_map(move |idx| {
                    let s = record.sample(idx)?;
                    Some(TelemetryRow {
                        time_step: s.step,
                        vehicle_id: record.id.clone(),
                        role: role.clone(),
                        speed_mps: s.speed,
                        acceleration: s.acceleration,
                        x: s.x,
                        y: s.y,
                        space_headway: s.headway,
                        ref_vels: s.reference,
                    })
                })
            })
            .enumerate()
            .sorted_by_key(|(order, row)| (row.time_step, *order))
            .map(|(_, row)| row)
            .collect()
    }

    /// Writes the rows as CSV with a header line. Missing values are left empty.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for row in self.rows() {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes the rows as a JSON array. Missing values become `null`.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, &self.rows())?;
        Ok(())
    }
}
