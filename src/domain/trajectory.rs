// ============================================================
// Layer 3 — Trajectory Domain Types
// ============================================================
// A TrajectoryRecord is one observed agent ("ego") over a fixed
// time window plus the context around it at the last observed
// step:
//
//   states     [total_steps][input_size]   x y z vx vy vz (+ extra sensor features)
//   neighbors  [n][6]                      other agents' current state
//   map        [m][map_feature_size]       map elements, first 3 values = position
//
// Records are plain data; validation against a concrete
// configuration lives here so the loader and the inference
// preprocessor agree on what "well formed" means.

use serde::{Deserialize, Serialize};

use crate::domain::error::{PipelineError, PipelineResult};

/// Kinematic state width: position (x, y, z) + velocity (vx, vy, vz).
pub const STATE_DIM: usize = 6;

/// Width of the position prefix shared by states, neighbours and map elements.
pub const POSITION_DIM: usize = 3;

/// One future (or past) kinematic state in a fixed coordinate frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateVector {
    pub x:  f32,
    pub y:  f32,
    pub z:  f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
}

impl StateVector {
    pub fn to_array(self) -> [f32; STATE_DIM] {
        [self.x, self.y, self.z, self.vx, self.vy, self.vz]
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// The dimensions a record has to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordShape {
    pub input_size:       usize,
    pub history_steps:    usize,
    pub prediction_steps: usize,
    pub map_feature_size: usize,
}

impl RecordShape {
    pub fn total_steps(&self) -> usize {
        self.history_steps + self.prediction_steps
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    pub id: String,

    /// Time-ordered per-step features, oldest first.
    pub states: Vec<Vec<f32>>,

    #[serde(default)]
    pub neighbors: Vec<Vec<f32>>,

    #[serde(default)]
    pub map: Vec<Vec<f32>>,
}

impl TrajectoryRecord {
    pub fn new(id: impl Into<String>, states: Vec<Vec<f32>>) -> Self {
        Self { id: id.into(), states, neighbors: Vec::new(), map: Vec::new() }
    }

    pub fn with_context(mut self, neighbors: Vec<Vec<f32>>, map: Vec<Vec<f32>>) -> Self {
        self.neighbors = neighbors;
        self.map       = map;
        self
    }

    /// Structural validation: field widths and time-step count.
    /// Numeric sanity (finiteness) is checked later, per batch.
    pub fn validate(&self, shape: &RecordShape) -> PipelineResult<()> {
        if self.states.is_empty() {
            return Err(PipelineError::data(&self.id, "record has no states"));
        }
        if self.states.len() != shape.total_steps() {
            return Err(PipelineError::data(
                &self.id,
                format!(
                    "expected {} time steps ({} history + {} future), found {}",
                    shape.total_steps(), shape.history_steps, shape.prediction_steps, self.states.len()
                ),
            ));
        }
        if let Some((step, row)) = self.states.iter().enumerate().find(|(_, r)| r.len() != shape.input_size) {
            return Err(PipelineError::data(
                &self.id,
                format!("step {step} has {} features, expected {}", row.len(), shape.input_size),
            ));
        }
        if let Some((i, row)) = self.neighbors.iter().enumerate().find(|(_, r)| r.len() != STATE_DIM) {
            return Err(PipelineError::data(
                &self.id,
                format!("neighbor {i} has {} values, expected {STATE_DIM}", row.len()),
            ));
        }
        if let Some((i, row)) = self.map.iter().enumerate().find(|(_, r)| r.len() != shape.map_feature_size) {
            return Err(PipelineError::data(
                &self.id,
                format!("map element {i} has {} values, expected {}", row.len(), shape.map_feature_size),
            ));
        }
        Ok(())
    }

    /// Split into (history_window, future_window); the future is the last
    /// `prediction_steps` states.
    pub fn split(&self, prediction_steps: usize) -> (&[Vec<f32>], &[Vec<f32>]) {
        let at = self.states.len().saturating_sub(prediction_steps);
        self.states.split_at(at)
    }

    /// Position of the ego agent at the last state before `future_start`.
    pub fn anchor_position(&self, prediction_steps: usize) -> [f32; POSITION_DIM] {
        let (history, _) = self.split(prediction_steps);
        history
            .last()
            .map(|row| [row[0], row[1], row[2]])
            .unwrap_or([0.0; POSITION_DIM])
    }

    /// Keep only the `max_neighbors` neighbours and `max_map` map elements
    /// nearest to the ego's last observed position.
    pub fn truncate_context(&mut self, prediction_steps: usize, max_neighbors: usize, max_map: usize) {
        let anchor = self.anchor_position(prediction_steps);
        keep_nearest(&mut self.neighbors, anchor, max_neighbors);
        keep_nearest(&mut self.map, anchor, max_map);
    }
}

fn squared_distance(row: &[f32], anchor: [f32; POSITION_DIM]) -> f32 {
    row.iter()
        .take(POSITION_DIM)
        .zip(anchor.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum()
}

fn keep_nearest(rows: &mut Vec<Vec<f32>>, anchor: [f32; POSITION_DIM], limit: usize) {
    if rows.len() <= limit {
        return;
    }
    rows.sort_by(|a, b| {
        squared_distance(a, anchor)
            .partial_cmp(&squared_distance(b, anchor))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rows.truncate(limit);
}
