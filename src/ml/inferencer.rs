// ============================================================
// Layer 5 — Inference Service
// ============================================================
// Serves predictions from one verified checkpoint.
//
//   open()    : read + verify the checkpoint once; a bad file
//               fails here, before any request is accepted
//   predict() : request tensors → Preprocessor → batcher →
//               one forward pass → safety gate → world frame →
//               smoothing
//
// The gate runs on every call. A non-finite output or a score
// below the threshold fails that call with SafetyViolation;
// the service itself stays usable.
//
// predict() takes &self and never touches the parameters.

use std::path::Path;

use burn::prelude::*;

use crate::config::PipelineConfig;
use crate::data::{batcher::TrajectoryBatcher, preprocessor::Preprocessor};
use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::prediction::{InferenceRequest, PredictionResult};
use crate::domain::trajectory::{StateVector, STATE_DIM};
use crate::infra::checkpoint::{CheckpointHeader, VerifiedCheckpoint};
use crate::ml::backend::{default_device, InnerBackend};
use crate::ml::model::TrajectoryModel;

/// Serving-time overrides; `None` keeps the checkpoint's own setting.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServingOptions {
    pub safety_threshold: Option<f64>,
    pub smoothing_window: Option<usize>,
}

pub struct InferenceService {
    model:            TrajectoryModel<InnerBackend>,
    header:           CheckpointHeader,
    preprocessor:     Preprocessor,
    batcher:          TrajectoryBatcher<InnerBackend>,
    safety_threshold: f64,
    smoothing_window: usize,
}

impl InferenceService {
    pub fn open(path: impl AsRef<Path>, options: ServingOptions) -> PipelineResult<Self> {
        let checkpoint = VerifiedCheckpoint::read(path.as_ref())?;
        let device     = default_device();
        let model      = checkpoint.load_model::<InnerBackend>(&device)?;
        tracing::info!(
            "Loaded checkpoint '{}' (epoch {}, provenance '{}')",
            checkpoint.path().display(),
            checkpoint.header().epoch,
            checkpoint.header().provenance
        );
        Self::from_parts(model, checkpoint.header().clone(), options)
    }

    fn from_parts(
        model:   TrajectoryModel<InnerBackend>,
        header:  CheckpointHeader,
        options: ServingOptions,
    ) -> PipelineResult<Self> {
        let cfg: &PipelineConfig = &header.config;
        let safety_threshold = options.safety_threshold.unwrap_or(cfg.safety_threshold);
        if !(0.0..=1.0).contains(&safety_threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "safety_threshold must be in [0, 1], got {safety_threshold}"
            )));
        }
        let smoothing_window = options.smoothing_window.unwrap_or(cfg.smoothing_window).max(1);

        Ok(Self {
            preprocessor: Preprocessor::new(cfg),
            batcher:      TrajectoryBatcher::new(default_device(), cfg),
            model,
            header,
            safety_threshold,
            smoothing_window,
        })
    }

    pub fn header(&self) -> &CheckpointHeader {
        &self.header
    }

    pub fn safety_threshold(&self) -> f64 {
        self.safety_threshold
    }

    pub fn predict(&self, request: &InferenceRequest) -> PipelineResult<PredictionResult> {
        let sample = self.preprocessor.sample_from_request(request)?;
        let input  = self.batcher.input_for(&sample)?;

        let output = self.model.forward(input);
        let trajectory = output
            .trajectory
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PipelineError::Record(format!("{e:?}")))?;
        let score = output
            .safety
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PipelineError::Record(format!("{e:?}")))?
            .first()
            .copied()
            .unwrap_or(f32::NAN);

        if !score.is_finite() || trajectory.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::SafetyViolation {
                score,
                threshold: self.safety_threshold,
                reason:    "model produced non-finite output".to_string(),
            });
        }
        if (score as f64) < self.safety_threshold {
            tracing::warn!("Prediction rejected: safety score {score:.4} < {:.4}", self.safety_threshold);
            return Err(PipelineError::SafetyViolation {
                score,
                threshold: self.safety_threshold,
                reason:    "safety score below threshold".to_string(),
            });
        }

        let mut states: Vec<StateVector> = trajectory
            .chunks_exact(STATE_DIM)
            .map(|s| sample.frame.state_to_world(s))
            .collect();
        smooth_positions(&mut states, self.smoothing_window);

        tracing::debug!("Predicted {} steps, safety score {score:.4}", states.len());
        Ok(PredictionResult { predicted_trajectory: states, safety_score: score })
    }
}

/// Centred moving average over positions. Near the ends the window
/// shrinks symmetrically, so straight-line motion passes through unchanged.
pub fn smooth_positions(states: &mut [StateVector], window: usize) {
    let half = window / 2;
    if half == 0 || states.len() < 3 {
        return;
    }
    let original: Vec<[f32; 3]> = states.iter().map(|s| [s.x, s.y, s.z]).collect();
    let n = original.len();

    for (i, state) in states.iter_mut().enumerate() {
        let k = half.min(i).min(n - 1 - i);
        let span = &original[i - k..=i + k];
        let count = span.len() as f32;
        state.x = span.iter().map(|p| p[0]).sum::<f32>() / count;
        state.y = span.iter().map(|p| p[1]).sum::<f32>() / count;
        state.z = span.iter().map(|p| p[2]).sum::<f32>() / count;
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::prediction::{NamedTensor, EGO_HISTORY, MAP, NEIGHBORS};
    use crate::infra::checkpoint::CheckpointManager;
    use crate::ml::heads::SafetyScorerConfig;

    fn scenario_config() -> PipelineConfig {
        PipelineConfig {
            hidden_size:        16,
            num_heads:          2,
            num_layers:         2,
            num_spatial_layers: 1,
            ff_size:            32,
            history_steps:      20,
            prediction_steps:   20,
            max_neighbors:      4,
            max_map_elements:   4,
            safety_threshold:   0.5,
            ..PipelineConfig::default()
        }
    }

    /// Save a model whose safety head always answers `score`, then open it.
    fn service_with_score(score: f32, dir: &Path) -> InferenceService {
        let cfg    = scenario_config();
        let device = default_device();
        let mut model = cfg.model_config().init::<InnerBackend>(&device);
        model.safety = SafetyScorerConfig::new(cfg.prediction_steps, cfg.hidden_size).init_pinned(score, &device);

        let store = CheckpointManager::new(dir).unwrap();
        let path  = store
            .save(&model, &CheckpointHeader::new(cfg, 1, None, "pinned-score"))
            .unwrap();
        InferenceService::open(path, ServingOptions::default()).unwrap()
    }

    /// 40 steps of straight-line motion; the last 20 are the target the
    /// caller holds back, the first 20 go into the request.
    fn request() -> InferenceRequest {
        let full: Vec<Vec<f32>> = (0..40)
            .map(|t| vec![100.0 + 2.0 * t as f32, -5.0, 0.0, 20.0, 0.0, 0.0])
            .collect();
        let history = &full[..20];
        InferenceRequest::new()
            .with_tensor(EGO_HISTORY, NamedTensor::from_rows(history))
            .with_tensor(NEIGHBORS, NamedTensor::from_rows(&[vec![140.0, -2.0, 0.0, 18.0, 0.0, 0.0]]))
            .with_tensor(MAP, NamedTensor::from_rows(&[vec![145.0, -5.0, 0.0, 1.0]]))
    }

    #[test]
    fn test_low_safety_score_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_score(0.3, dir.path());
        let err = service.predict(&request()).unwrap_err();
        match err {
            PipelineError::SafetyViolation { score, threshold, .. } => {
                assert!((score - 0.3).abs() < 1e-4);
                assert_eq!(threshold, 0.5);
            }
            other => panic!("expected SafetyViolation, got {other:?}"),
        }
    }

    #[test]
    fn test_high_safety_score_returns_full_horizon() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_score(0.9, dir.path());
        let result = service.predict(&request()).unwrap();
        assert_eq!(result.predicted_trajectory.len(), 20);
        assert!((result.safety_score - 0.9).abs() < 1e-4);
        assert!(result.predicted_trajectory.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_threshold_override_applies() {
        let dir = tempfile::tempdir().unwrap();
        let base = service_with_score(0.3, dir.path());
        let path = dir.path().join("checkpoint_epoch_1.tpck");
        assert_eq!(base.safety_threshold(), 0.5);

        let lenient = InferenceService::open(
            &path,
            ServingOptions { safety_threshold: Some(0.2), smoothing_window: None },
        )
        .unwrap();
        assert!(lenient.predict(&request()).is_ok());
    }

    #[test]
    fn test_predict_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_score(0.9, dir.path());
        let a = service.predict(&request()).unwrap();
        let b = service.predict(&request()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_malformed_request_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_score(0.9, dir.path());
        let bad = InferenceRequest::new().with_tensor(EGO_HISTORY, NamedTensor::from_rows(&vec![vec![0.0; 6]; 5]));
        let err = service.predict(&bad).unwrap_err();
        assert!(matches!(err, PipelineError::DataIntegrity { .. }));
    }

    #[test]
    fn test_tampered_checkpoint_fails_at_open() {
        let dir = tempfile::tempdir().unwrap();
        service_with_score(0.9, dir.path());
        let path = dir.path().join("checkpoint_epoch_1.tpck");
        let mut bytes = std::fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x10;
        std::fs::write(&path, bytes).unwrap();
        let err = InferenceService::open(&path, ServingOptions::default()).err().unwrap();
        assert!(matches!(err, PipelineError::CheckpointIntegrity { .. }));
    }

    #[test]
    fn test_smoothing_keeps_straight_lines() {
        let mut states: Vec<StateVector> = (0..6)
            .map(|t| StateVector { x: t as f32, y: 2.0 * t as f32, z: 0.0, vx: 1.0, vy: 2.0, vz: 0.0 })
            .collect();
        let before = states.clone();
        smooth_positions(&mut states, 5);
        for (a, b) in states.iter().zip(before.iter()) {
            assert!((a.x - b.x).abs() < 1e-5 && (a.y - b.y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_smoothing_damps_a_spike() {
        let mut states: Vec<StateVector> = (0..5)
            .map(|t| StateVector { x: t as f32, y: 0.0, z: 0.0, vx: 1.0, vy: 0.0, vz: 0.0 })
            .collect();
        states[2].y = 3.0;
        smooth_positions(&mut states, 3);
        assert!((states[2].y - 1.0).abs() < 1e-6);
        assert!((states[1].y - 1.0).abs() < 1e-6);
        assert_eq!(states[0].y, 0.0);
    }
}
