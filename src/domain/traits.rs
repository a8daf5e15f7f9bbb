// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams other layers plug into:
//   - TrajectorySource → where records come from (JSON files, synthetic, …)
//   - Augmenter        → stochastic, physically bounded record perturbation
//
// The metrics sink lives next to its implementations in infra::metrics.

use rand::rngs::StdRng;

use crate::domain::error::PipelineResult;
use crate::domain::trajectory::TrajectoryRecord;

// ─── TrajectorySource ─────────────────────────────────────────────────────────
/// Any component that can produce a fixed collection of validated records.
///
/// Implementations:
///   - JsonTrajectoryLoader → .json / .jsonl files or a directory of them
///   - SyntheticGenerator   → kinematic simulation for demos and tests
pub trait TrajectorySource {
    fn load_all(&self) -> PipelineResult<Vec<TrajectoryRecord>>;
}

// ─── Augmenter ────────────────────────────────────────────────────────────────
/// A stochastic transform applied to every record the dataset hands out
/// while augmentation is enabled. Must keep the record's shape.
pub trait Augmenter: Send + Sync {
    fn augment(&self, record: &TrajectoryRecord, rng: &mut StdRng) -> TrajectoryRecord;

    fn name(&self) -> &'static str;
}
