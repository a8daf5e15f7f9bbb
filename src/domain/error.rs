// ============================================================
// Layer 3 — Pipeline Error Taxonomy
// ============================================================
// Every failure the core can surface. Record- and batch-local
// problems are `DataIntegrity`; numerical blow-ups and tampered
// checkpoints are never retried; a `SafetyViolation` only fails
// the one inference call that produced it.
//
// The CLI and use cases wrap these in anyhow::Error, so the
// library keeps a typed enum that tests can match on.

use std::{path::Path, sync::Arc};

use thiserror::Error;

/// Result alias used by the data, ml and infra layers.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Malformed or corrupt trajectory record / request tensor.
    #[error("data integrity error in '{source_id}': {reason}")]
    DataIntegrity { source_id: String, reason: String },

    /// The training loss became NaN or infinite.
    #[error("training diverged at epoch {epoch} after {steps_completed} optimizer steps (loss = {loss})")]
    TrainingDiverged {
        epoch:           usize,
        steps_completed: usize,
        loss:            f64,
    },

    /// Stored and recomputed checkpoint hashes differ, or the file is malformed.
    #[error("checkpoint integrity error in '{path}': {reason}")]
    CheckpointIntegrity { path: String, reason: String },

    /// The prediction did not pass the serving-time safety gate.
    #[error("safety violation: score {score:.4} below threshold {threshold:.4} ({reason})")]
    SafetyViolation {
        score:     f32,
        threshold: f64,
        reason:    String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Sources sit behind `Arc` so batch outcomes stay `Clone`.
    #[error("i/o error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("serialization error: {source}")]
    Serialization {
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// burn recorder failure while encoding or decoding parameters.
    #[error("parameter record error: {0}")]
    Record(String),
}

impl PipelineError {
    pub fn data(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataIntegrity { source_id: source_id.into(), reason: reason.into() }
    }

    pub fn checkpoint(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::CheckpointIntegrity { path: path.as_ref().display().to_string(), reason: reason.into() }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io { path: path.as_ref().display().to_string(), source: Arc::new(source) }
    }

    /// True for errors that stay local to one record or batch.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DataIntegrity { .. })
    }
}

/// For `?` on filesystem calls whose path the caller does not name.
impl From<std::io::Error> for PipelineError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { path: String::from("<unnamed>"), source: Arc::new(source) }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(source: serde_json::Error) -> Self {
        Self::Serialization { source: Arc::new(source) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_data_errors_are_recoverable() {
        assert!(PipelineError::data("rec-1", "empty states").is_recoverable());
        let diverged = PipelineError::TrainingDiverged { epoch: 1, steps_completed: 0, loss: f64::NAN };
        assert!(!diverged.is_recoverable());
        assert!(!PipelineError::checkpoint("a.tpck", "hash mismatch").is_recoverable());
    }

    #[test]
    fn test_io_errors_keep_their_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = PipelineError::io("data/a.jsonl", io);
        assert!(err.to_string().contains("data/a.jsonl"));
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "gone");
    }

    #[test]
    fn test_json_errors_keep_their_source() {
        use std::error::Error as _;

        let bad = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: PipelineError = bad.into();
        assert!(matches!(err, PipelineError::Serialization { .. }));
        assert!(err.source().is_some());
    }
}
