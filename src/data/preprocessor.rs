// ============================================================
// Layer 4 — Preprocessor
// ============================================================
// Turns raw records (training) and raw request tensors (serving)
// into model-ready samples in one shared coordinate frame.
//
// Frame:
//   origin = ego position at the last observed history step
//   model  = (world - origin) / coordinate_scale     for positions
//            world / coordinate_scale                for velocities
//
// Only the kinematic prefix is rescaled; auxiliary per-step
// features and non-position map attributes pass through.
//
// Training and serving must go through the same code here,
// otherwise the model would see two different input
// distributions.

use crate::config::PipelineConfig;
use crate::data::dataset::TrajectorySample;
use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::prediction::{InferenceRequest, EGO_HISTORY, MAP, NEIGHBORS};
use crate::domain::trajectory::{StateVector, TrajectoryRecord, POSITION_DIM, STATE_DIM};

/// Ego-centred, scaled coordinate frame of one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EgoFrame {
    pub origin: [f32; POSITION_DIM],
    pub scale:  f32,
}

impl EgoFrame {
    /// Map a state-like row (x y z vx vy vz …) into model space.
    pub fn state_to_model(&self, row: &[f32]) -> Vec<f32> {
        row.iter()
            .enumerate()
            .map(|(i, &v)| match i {
                i if i < POSITION_DIM => (v - self.origin[i]) / self.scale,
                i if i < STATE_DIM => v / self.scale,
                _ => v,
            })
            .collect()
    }

    /// Map a map element (x y z attrs…) into model space.
    pub fn map_to_model(&self, row: &[f32]) -> Vec<f32> {
        row.iter()
            .enumerate()
            .map(|(i, &v)| if i < POSITION_DIM { (v - self.origin[i]) / self.scale } else { v })
            .collect()
    }

    /// Inverse of `state_to_model` for a predicted state.
    pub fn state_to_world(&self, s: &[f32]) -> StateVector {
        StateVector {
            x:  s[0] * self.scale + self.origin[0],
            y:  s[1] * self.scale + self.origin[1],
            z:  s[2] * self.scale + self.origin[2],
            vx: s[3] * self.scale,
            vy: s[4] * self.scale,
            vz: s[5] * self.scale,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    input_size:       usize,
    history_steps:    usize,
    prediction_steps: usize,
    max_neighbors:    usize,
    max_map_elements: usize,
    map_feature_size: usize,
    scale:            f32,
}

impl Preprocessor {
    pub fn new(cfg: &PipelineConfig) -> Self {
        Self {
            input_size:       cfg.input_size,
            history_steps:    cfg.history_steps,
            prediction_steps: cfg.prediction_steps,
            max_neighbors:    cfg.max_neighbors,
            max_map_elements: cfg.max_map_elements,
            map_feature_size: cfg.map_feature_size,
            scale:            cfg.coordinate_scale,
        }
    }

    /// Split a validated record into an ego-frame training sample.
    pub fn sample_from_record(&self, record: &TrajectoryRecord) -> TrajectorySample {
        let mut record = record.clone();
        record.truncate_context(self.prediction_steps, self.max_neighbors, self.max_map_elements);

        let frame = EgoFrame { origin: record.anchor_position(self.prediction_steps), scale: self.scale };
        let (history, future) = record.split(self.prediction_steps);

        TrajectorySample {
            id:        record.id.clone(),
            history:   history.iter().map(|r| frame.state_to_model(r)).collect(),
            future:    future.iter().map(|r| frame.state_to_model(&r[..STATE_DIM.min(r.len())])).collect(),
            neighbors: record.neighbors.iter().map(|r| frame.state_to_model(r)).collect(),
            map:       record.map.iter().map(|r| frame.map_to_model(r)).collect(),
            frame,
        }
    }

    /// Build a history-only sample from an inference request.
    /// Any malformed tensor is a DataIntegrity error for this call.
    pub fn sample_from_request(&self, request: &InferenceRequest) -> PipelineResult<TrajectorySample> {
        let history = request
            .get(EGO_HISTORY)
            .ok_or_else(|| PipelineError::data(EGO_HISTORY, "missing required tensor"))?
            .rows(EGO_HISTORY, self.input_size)?;
        if history.len() < self.history_steps {
            return Err(PipelineError::data(
                EGO_HISTORY,
                format!("need at least {} steps of history, got {}", self.history_steps, history.len()),
            ));
        }
        let history = history[history.len() - self.history_steps..].to_vec();

        let neighbors = match request.get(NEIGHBORS) {
            Some(t) => t.rows(NEIGHBORS, STATE_DIM)?,
            None    => Vec::new(),
        };
        let map = match request.get(MAP) {
            Some(t) => t.rows(MAP, self.map_feature_size)?,
            None    => Vec::new(),
        };

        // Reuse the record path: a record whose "future" is empty.
        let mut record = TrajectoryRecord::new("request", history).with_context(neighbors, map);
        record.truncate_context(0, self.max_neighbors, self.max_map_elements);
        let frame = EgoFrame { origin: record.anchor_position(0), scale: self.scale };

        Ok(TrajectorySample {
            id:        record.id.clone(),
            history:   record.states.iter().map(|r| frame.state_to_model(r)).collect(),
            future:    Vec::new(),
            neighbors: record.neighbors.iter().map(|r| frame.state_to_model(r)).collect(),
            map:       record.map.iter().map(|r| frame.map_to_model(r)).collect(),
            frame,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::prediction::NamedTensor;

    fn cfg() -> PipelineConfig {
        PipelineConfig {
            history_steps:    3,
            prediction_steps: 2,
            coordinate_scale: 2.0,
            ..PipelineConfig::default()
        }
    }

    fn record() -> TrajectoryRecord {
        let states = (0..5)
            .map(|t| vec![10.0 + t as f32, 4.0, 1.0, 2.0, 0.0, 0.0])
            .collect();
        TrajectoryRecord::new("r", states)
            .with_context(vec![vec![14.0, 6.0, 1.0, 0.0, 2.0, 0.0]], vec![vec![12.0, 4.0, 1.0, 7.0]])
    }

    #[test]
    fn test_history_is_centred_on_last_observed_position() {
        let sample = Preprocessor::new(&cfg()).sample_from_record(&record());
        assert_eq!(sample.frame.origin, [12.0, 4.0, 1.0]);
        assert_eq!(sample.history.len(), 3);
        assert_eq!(sample.future.len(), 2);
        // last history step sits at the origin; velocity scaled by 1/2
        assert_eq!(sample.history[2], vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        // first future step is one metre ahead → 0.5 model units
        assert_eq!(sample.future[0][0], 0.5);
        assert_eq!(sample.neighbors[0], vec![1.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
        // map attribute (index 3) is not scaled
        assert_eq!(sample.map[0], vec![0.0, 0.0, 0.0, 7.0]);
    }

    #[test]
    fn test_world_conversion_inverts_model_frame() {
        let frame = EgoFrame { origin: [3.0, -1.0, 0.5], scale: 4.0 };
        let world = [7.0, 2.0, 0.5, 1.5, -2.0, 0.0];
        let back  = frame.state_to_world(&frame.state_to_model(&world));
        assert_eq!(back.to_array(), world);
    }

    #[test]
    fn test_request_uses_last_history_steps() {
        let rows: Vec<Vec<f32>> = (0..6).map(|t| vec![t as f32, 0.0, 0.0, 1.0, 0.0, 0.0]).collect();
        let request = InferenceRequest::new().with_tensor(EGO_HISTORY, NamedTensor::from_rows(&rows));
        let sample  = Preprocessor::new(&cfg()).sample_from_request(&request).unwrap();
        assert_eq!(sample.history.len(), 3);
        assert_eq!(sample.frame.origin, [5.0, 0.0, 0.0]);
        assert!(sample.future.is_empty());
    }

    #[test]
    fn test_request_without_history_is_rejected() {
        let err = Preprocessor::new(&cfg()).sample_from_request(&InferenceRequest::new()).unwrap_err();
        assert!(matches!(err, PipelineError::DataIntegrity { .. }));
    }

    #[test]
    fn test_request_with_short_history_is_rejected() {
        let rows = vec![vec![0.0; 6]; 2];
        let request = InferenceRequest::new().with_tensor(EGO_HISTORY, NamedTensor::from_rows(&rows));
        assert!(Preprocessor::new(&cfg()).sample_from_request(&request).is_err());
    }
}
