// ============================================================
// Layer 4 — Trajectory Batcher
// ============================================================
// Implements Burn's Batcher trait to stack TrajectorySamples
// into backend tensors.
//
// Output shapes (B = batch, H = history, P = horizon):
//   history        [B, H, input_size]
//   future         [B, P, 6]
//   neighbors      [B, max_neighbors, 6]            zero padded
//   neighbor_mask  [B, max_neighbors]     Bool      true = padding
//   map            [B, max_map_elements, F]         zero padded
//   map_mask       [B, max_map_elements]  Bool      true = padding
//
// Every sample is checked (widths, lengths, finiteness) before
// any tensor is built. A bad sample fails the whole batch with a
// DataIntegrity error; the trainer logs and skips it instead of
// letting NaNs into the optimizer.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::config::PipelineConfig;
use crate::data::dataset::TrajectorySample;
use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::trajectory::STATE_DIM;
use crate::ml::model::ModelInput;

// ─── TrajectoryBatch ──────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TrajectoryBatch<B: Backend> {
    pub ids:    Vec<String>,
    pub input:  ModelInput<B>,
    /// Ground-truth future states — shape: [batch_size, prediction_steps, 6]
    pub future: Tensor<B, 3>,
}

/// What the DataLoader yields: a batch, or the reason it could not be built.
pub type BatchOutcome<B> = PipelineResult<TrajectoryBatch<B>>;

// ─── TrajectoryBatcher ────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct TrajectoryBatcher<B: Backend> {
    pub device:       B::Device,
    input_size:       usize,
    history_steps:    usize,
    prediction_steps: usize,
    max_neighbors:    usize,
    max_map_elements: usize,
    map_feature_size: usize,
}

impl<B: Backend> TrajectoryBatcher<B> {
    pub fn new(device: B::Device, cfg: &PipelineConfig) -> Self {
        Self {
            device,
            input_size:       cfg.input_size,
            history_steps:    cfg.history_steps,
            prediction_steps: cfg.prediction_steps,
            max_neighbors:    cfg.max_neighbors,
            max_map_elements: cfg.max_map_elements,
            map_feature_size: cfg.map_feature_size,
        }
    }

    /// Stack samples that carry a future window (training / validation).
    pub fn try_batch(&self, items: &[TrajectorySample]) -> BatchOutcome<B> {
        if items.is_empty() {
            return Err(PipelineError::data("batch", "empty batch"));
        }
        for s in items {
            self.check_sample(s, true)?;
        }
        let input = self.build_input(items);

        let future_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.future.iter().flat_map(|row| row.iter().take(STATE_DIM).copied()))
            .collect();
        let future = Tensor::<B, 3>::from_data(
            TensorData::new(future_flat, [items.len(), self.prediction_steps, STATE_DIM]),
            &self.device,
        );

        Ok(TrajectoryBatch {
            ids: items.iter().map(|s| s.id.clone()).collect(),
            input,
            future,
        })
    }

    /// Model input for a single history-only sample (serving path).
    pub fn input_for(&self, sample: &TrajectorySample) -> PipelineResult<ModelInput<B>> {
        self.check_sample(sample, false)?;
        Ok(self.build_input(std::slice::from_ref(sample)))
    }

    fn check_sample(&self, s: &TrajectorySample, with_future: bool) -> PipelineResult<()> {
        let fail = |reason: String| Err(PipelineError::data(&s.id, reason));

        if s.history.len() != self.history_steps {
            return fail(format!("history has {} steps, expected {}", s.history.len(), self.history_steps));
        }
        if s.history.iter().any(|r| r.len() != self.input_size) {
            return fail(format!("history rows must have {} features", self.input_size));
        }
        if with_future {
            if s.future.len() != self.prediction_steps {
                return fail(format!("future has {} steps, expected {}", s.future.len(), self.prediction_steps));
            }
            if s.future.iter().any(|r| r.len() < STATE_DIM) {
                return fail(format!("future rows must have {STATE_DIM} values"));
            }
        }
        if s.neighbors.len() > self.max_neighbors || s.neighbors.iter().any(|r| r.len() != STATE_DIM) {
            return fail(format!("neighbors must be at most {} rows of {STATE_DIM}", self.max_neighbors));
        }
        if s.map.len() > self.max_map_elements || s.map.iter().any(|r| r.len() != self.map_feature_size) {
            return fail(format!(
                "map must be at most {} rows of {}",
                self.max_map_elements, self.map_feature_size
            ));
        }
        if !s.is_finite() {
            return fail("sample contains non-finite values".to_string());
        }
        Ok(())
    }

    fn build_input(&self, items: &[TrajectorySample]) -> ModelInput<B> {
        let batch_size = items.len();

        let history_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.history.iter().flatten().copied())
            .collect();
        let history = Tensor::<B, 3>::from_data(
            TensorData::new(history_flat, [batch_size, self.history_steps, self.input_size]),
            &self.device,
        );

        let (neighbors, neighbor_mask) = self.padded(
            items.iter().map(|s| &s.neighbors),
            batch_size,
            self.max_neighbors,
            STATE_DIM,
        );
        let (map, map_mask) = self.padded(
            items.iter().map(|s| &s.map),
            batch_size,
            self.max_map_elements,
            self.map_feature_size,
        );

        ModelInput { history, neighbors, neighbor_mask, map, map_mask }
    }

    /// Zero-pad variable-length row sets to `[batch, slots, width]`
    /// and return the matching padding mask.
    fn padded<'a>(
        &self,
        sets:       impl Iterator<Item = &'a Vec<Vec<f32>>>,
        batch_size: usize,
        slots:      usize,
        width:      usize,
    ) -> (Tensor<B, 3>, Tensor<B, 2, Bool>) {
        let mut values = vec![0.0f32; batch_size * slots * width];
        let mut pad    = vec![1i64; batch_size * slots];

        for (b, rows) in sets.enumerate() {
            for (n, row) in rows.iter().take(slots).enumerate() {
                let offset = (b * slots + n) * width;
                values[offset..offset + width].copy_from_slice(&row[..width]);
                pad[b * slots + n] = 0;
            }
        }

        let values = Tensor::<B, 3>::from_data(TensorData::new(values, [batch_size, slots, width]), &self.device);
        let mask   = Tensor::<B, 2, Int>::from_data(TensorData::new(pad, [batch_size, slots]), &self.device)
            .equal_elem(1);
        (values, mask)
    }
}

// ─── Burn Batcher Trait Implementation ────────────────────────────────────────
impl<B: Backend> Batcher<TrajectorySample, BatchOutcome<B>> for TrajectoryBatcher<B> {
    fn batch(&self, items: Vec<TrajectorySample>) -> BatchOutcome<B> {
        self.try_batch(&items)
    }
}
