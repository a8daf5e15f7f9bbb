// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Opens one verified checkpoint and answers inference requests
// read from JSON:
//
//   request  { "tensors": { "ego_history": { "shape": [T, F], "data": [...] }, ... } }
//   response { "predicted_trajectory": [{x,y,z,vx,vy,vz}, ...], "safety_score": s }
//        or  { "error": "safety_violation", "score": s, "threshold": t, "reason": "..." }
//
// A checkpoint directory resolves to its best epoch (falling
// back to the latest).

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde_json::{json, Value};

use crate::domain::error::PipelineError;
use crate::domain::prediction::{InferenceRequest, PredictionResult};
use crate::infra::checkpoint::{CheckpointHeader, CheckpointManager, VerifiedCheckpoint};
use crate::ml::inferencer::{InferenceService, ServingOptions};

pub struct PredictUseCase {
    service: InferenceService,
}

impl PredictUseCase {
    pub fn new(checkpoint: &Path, options: ServingOptions) -> Result<Self> {
        let path = resolve_checkpoint(checkpoint)?;
        let service = InferenceService::open(&path, options)
            .with_context(|| format!("Cannot open checkpoint '{}'", path.display()))?;
        Ok(Self { service })
    }

    pub fn header(&self) -> &CheckpointHeader {
        self.service.header()
    }

    /// Run one request. Safety violations come back as `Err(PipelineError)`
    /// so callers can tell them apart from I/O problems.
    pub fn predict(&self, request: &InferenceRequest) -> std::result::Result<PredictionResult, PipelineError> {
        self.service.predict(request)
    }

    pub fn read_request(path: &Path) -> Result<InferenceRequest> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read request '{}'", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Malformed request JSON in '{}'", path.display()))
    }
}

/// JSON body for a prediction outcome.
pub fn response_json(outcome: &std::result::Result<PredictionResult, PipelineError>) -> Result<Value> {
    Ok(match outcome {
        Ok(result) => serde_json::to_value(result)?,
        Err(PipelineError::SafetyViolation { score, threshold, reason }) => json!({
            "error":     "safety_violation",
            "score":     score,
            "threshold": threshold,
            "reason":    reason,
        }),
        Err(other) => json!({ "error": other.to_string() }),
    })
}

/// Read and verify a checkpoint without building a model.
pub fn verify_checkpoint(path: &Path) -> Result<CheckpointHeader> {
    let path = resolve_checkpoint(path)?;
    let checkpoint = VerifiedCheckpoint::read(&path)?;
    Ok(checkpoint.header().clone())
}

fn resolve_checkpoint(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }
    CheckpointManager::new(path)?
        .preferred_path()?
        .with_context(|| format!("No checkpoints found in '{}'. Have you run 'train' first?", path.display()))
}
