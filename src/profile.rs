//! Leader speed profiles.
//!
//! A recorded speed trace is cleaned and resampled once onto the control grid,
//! after which the leader's commanded speed is a plain lookup by step.

use std::f64::consts::PI;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::Result;

/// A single raw sample of a recorded speed trace.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TracePoint {
    /// The timestamp in s. Only differences between timestamps matter.
    pub time: f64,
    /// The speed in m/s. NaN marks a missing value.
    pub speed: f64,
}

/// The unit speeds are recorded in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedUnit {
    #[default]
    Kmh,
    Mps,
    Mph,
}

impl SpeedUnit {
    /// Converts a speed in this unit to m/s.
    pub fn to_mps(self, speed: f64) -> f64 {
        match self {
            SpeedUnit::Kmh => speed * (1000.0 / 3600.0),
            SpeedUnit::Mps => speed,
            SpeedUnit::Mph => speed * (1609.344 / 3600.0),
        }
    }
}

/// Which columns of a recording hold the timestamps and speeds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceColumns {
    /// The timestamp column. The first column is used when absent.
    #[serde(default)]
    pub time: Option<String>,
    /// The speed column.
    #[serde(default = "default_speed_column")]
    pub speed: String,
}

fn default_speed_column() -> String {
    "Message".to_string()
}

impl Default for TraceColumns {
    fn default() -> Self {
        Self {
            time: None,
            speed: default_speed_column(),
        }
    }
}

/// Reads a recorded speed trace from a CSV file, converting speeds to m/s.
///
/// Empty or unreadable speed cells become NaN (treated as zero by
/// [SpeedProfile::resample]). Rows with an unreadable timestamp and malformed
/// rows are dropped. If the header or the speed column is missing the trace is
/// empty. Only failing to open the file is an error.
pub fn read_trace(
    path: &Path,
    columns: &TraceColumns,
    unit: SpeedUnit,
) -> Result<Vec<TracePoint>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = match reader.byte_headers() {
        Ok(headers) => headers.clone(),
        Err(err) => {
            warn!(
                "Unreadable header in trace {}: {}; leader profile is empty",
                path.display(),
                err
            );
            return Ok(vec![]);
        }
    };

    let time_idx = match &columns.time {
        Some(name) => headers.iter().position(|h| h == name.as_bytes()),
        None => (!headers.is_empty()).then_some(0),
    };
    let speed_idx = headers.iter().position(|h| h == columns.speed.as_bytes());
    let (Some(time_idx), Some(speed_idx)) = (time_idx, speed_idx) else {
        warn!(
            "Trace {} lacks the timestamp or '{}' column; leader profile is empty",
            path.display(),
            columns.speed
        );
        return Ok(vec![]);
    };

    let mut trace = vec![];
    for (row, record) in reader.byte_records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) if err.is_io_error() => {
                warn!("Stopped reading trace {} at row {}: {}", path.display(), row + 1, err);
                break;
            }
            Err(err) => {
                warn!("Dropping trace row {}: {}", row + 1, err);
                continue;
            }
        };
        let Some(time) = parse_field(&record, time_idx).filter(|t| t.is_finite()) else {
            warn!("Dropping trace row {}: unreadable timestamp", row + 1);
            continue;
        };
        let speed = parse_field(&record, speed_idx).map_or(f64::NAN, |s| unit.to_mps(s));
        trace.push(TracePoint { time, speed });
    }
    debug!("Read {} trace samples from {}", trace.len(), path.display());
    Ok(trace)
}

fn parse_field(record: &csv::ByteRecord, idx: usize) -> Option<f64> {
    let field = std::str::from_utf8(record.get(idx)?).ok()?;
    field.trim().parse().ok()
}

/// A leader speed profile sampled at a fixed control period.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpeedProfile {
    speeds: Vec<f64>,
}

impl SpeedProfile {
    /// Builds a profile from already-sampled speeds in m/s.
    pub fn from_speeds(speeds: Vec<f64>) -> Self {
        Self { speeds }
    }

    /// Builds a profile of `len` steps from a function of the step index.
    pub fn from_fn(len: usize, f: impl FnMut(usize) -> f64) -> Self {
        Self {
            speeds: (0..len).map(f).collect(),
        }
    }

    /// Cleans and resamples a raw trace onto a uniform grid with spacing `period`.
    ///
    /// Missing and negative speeds count as zero. The leading run of non-positive speeds is
    /// dropped and the trace is shifted so that its first remaining sample is at
    /// time zero. The grid holds `floor(last_timestamp / period)` points starting at
    /// zero; values between samples are linearly interpolated. Traces with fewer than two samples give an empty profile.
    pub fn resample(trace: &[TracePoint], period: f64) -> Self {
        if !(period > 0.0) {
            warn!("Non-positive control period {}; leader profile is empty", period);
            return Self::default();
        }

        let points = trace
            .iter()
            .map(|p| TracePoint {
                time: p.time,
                // NaN and negative speeds both become zero.
                speed: p.speed.max(0.0),
            })
            .collect::<Vec<_>>();

        let start = points.iter().position(|p| p.speed > 0.0).unwrap_or(0);
        let points = &points[start..];
        let Some(first) = points.first() else {
            return Self::default();
        };
        let t0 = first.time;
        let last = points[points.len() - 1].time - t0;

        let len = (last / period + 1e-9).floor().max(0.0) as usize;
        let mut cursor = 0;
        let speeds = (0..len)
            .map(|i| {
                let t = i as f64 * period;
                while cursor + 1 < points.len() && points[cursor + 1].time - t0 <= t {
                    cursor += 1;
                }
                interpolate(points, cursor, t0, t)
            })
            .collect();

        Self { speeds }
    }

    /// A sinusoidal stop-and-go profile oscillating between 5 and 25 m/s,
    /// floored at 2 m/s, with a period of 100 steps.
    pub fn stop_and_go(len: usize) -> Self {
        Self::from_fn(len, |k| {
            let speed = 15.0 + 10.0 * (2.0 * PI * k as f64 / 100.0).sin();
            f64::max(2.0, speed)
        })
    }

    /// Cruises at 25 m/s, dropping to 10 m/s for steps 30 to 49.
    pub fn step_change(len: usize) -> Self {
        Self::from_fn(len, |k| if (30..50).contains(&k) { 10.0 } else { 25.0 })
    }

    /// A constant speed profile.
    pub fn constant(len: usize, speed: f64) -> Self {
        Self::from_fn(len, |_| speed)
    }

    /// The speed at the given step, or zero once the profile is exhausted.
    pub fn sample_at(&self, step: usize) -> f64 {
        self.speeds.get(step).copied().unwrap_or(0.0)
    }

    /// The number of steps in the profile.
    pub fn len(&self) -> usize {
        self.speeds.len()
    }

    /// Whether the profile has no samples.
    pub fn is_empty(&self) -> bool {
        self.speeds.is_empty()
    }

    /// The resampled speeds.
    pub fn speeds(&self) -> &[f64] {
        &self.speeds
    }
}

/// Linearly interpolates the trace at relative time `t`, where `points[idx]`
/// is the last sample at or before `t`. Clamps outside the trace.
fn interpolate(points: &[TracePoint], idx: usize, t0: f64, t: f64) -> f64 {
    let a = points[idx];
    let Some(b) = points.get(idx + 1) else {
        return a.speed;
    };
    let (ta, tb) = (a.time - t0, b.time - t0);
    if t <= ta || tb <= ta {
        a.speed
    } else {
        a.speed + (b.speed - a.speed) * (t - ta) / (tb - ta)
    }
}
