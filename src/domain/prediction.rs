// ============================================================
// Layer 3 — Inference Request / Response Types
// ============================================================
// Request: a mapping of named sensor/map tensors
//   "ego_history" [T, input_size]       required
//   "neighbors"   [N, 6]                optional
//   "map"         [M, map_feature_size] optional
//
// Response: the forecast in world coordinates plus the safety
// score that let it through the gate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::trajectory::StateVector;

pub const EGO_HISTORY: &str = "ego_history";
pub const NEIGHBORS:   &str = "neighbors";
pub const MAP:         &str = "map";

/// A dense row-major tensor as it arrives over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTensor {
    pub shape: Vec<usize>,
    pub data:  Vec<f32>,
}

impl NamedTensor {
    pub fn from_rows(rows: &[Vec<f32>]) -> Self {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        Self {
            shape: vec![rows.len(), cols],
            data:  rows.iter().flatten().copied().collect(),
        }
    }

    /// Reinterpret as rows of exactly `cols` values.
    pub fn rows(&self, name: &str, cols: usize) -> PipelineResult<Vec<Vec<f32>>> {
        let [n, c] = self.shape[..] else {
            return Err(PipelineError::data(name, format!("expected a 2-D tensor, got shape {:?}", self.shape)));
        };
        if c != cols {
            return Err(PipelineError::data(name, format!("expected {cols} columns, got {c}")));
        }
        if n.checked_mul(c).filter(|&len| len == self.data.len()).is_none() {
            return Err(PipelineError::data(
                name,
                format!("shape {:?} does not match {} values", self.shape, self.data.len()),
            ));
        }
        if let Some(bad) = self.data.iter().position(|v| !v.is_finite()) {
            return Err(PipelineError::data(name, format!("non-finite value at flat index {bad}")));
        }
        Ok(self.data.chunks(c.max(1)).take(n).map(|r| r.to_vec()).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub tensors: BTreeMap<String, NamedTensor>,
}

impl InferenceRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tensor(mut self, name: impl Into<String>, tensor: NamedTensor) -> Self {
        self.tensors.insert(name.into(), tensor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&NamedTensor> {
        self.tensors.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_trajectory: Vec<StateVector>,
    pub safety_score:         f32,
}
