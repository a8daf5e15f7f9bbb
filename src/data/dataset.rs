use std::sync::{Arc, Mutex};

use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, SeedableRng};

use crate::config::PipelineConfig;
use crate::data::augment::GaussianJitter;
use crate::data::preprocessor::{EgoFrame, Preprocessor};
use crate::domain::traits::Augmenter;
use crate::domain::trajectory::TrajectoryRecord;

/// One record split at the prediction horizon, in its own ego frame.
/// history: [history_steps][input_size], future: [prediction_steps][6].
#[derive(Debug, Clone)]
pub struct TrajectorySample {
    pub id:        String,
    pub history:   Vec<Vec<f32>>,
    pub future:    Vec<Vec<f32>>,
    pub neighbors: Vec<Vec<f32>>,
    pub map:       Vec<Vec<f32>>,
    pub frame:     EgoFrame,
}

impl TrajectorySample {
    pub fn total_steps(&self) -> usize {
        self.history.len() + self.future.len()
    }

    pub fn is_finite(&self) -> bool {
        [&self.history, &self.future, &self.neighbors, &self.map]
            .iter()
            .all(|rows| rows.iter().flatten().all(|v| v.is_finite()))
    }
}

pub struct TrajectoryDataset {
    records:      Vec<TrajectoryRecord>,
    preprocessor: Preprocessor,
    augmenter:    Option<Arc<dyn Augmenter>>,
    rng:          Mutex<StdRng>,
}

impl TrajectoryDataset {
    pub fn new(records: Vec<TrajectoryRecord>, cfg: &PipelineConfig) -> Self {
        Self {
            records,
            preprocessor: Preprocessor::new(cfg),
            augmenter:    None,
            rng:          Mutex::new(StdRng::seed_from_u64(cfg.seed)),
        }
    }

    /// Training dataset: augmented with the default jitter when the config asks for it.
    pub fn for_training(records: Vec<TrajectoryRecord>, cfg: &PipelineConfig) -> Self {
        let ds = Self::new(records, cfg);
        if cfg.augmentation_enabled {
            ds.with_augmenter(Arc::new(GaussianJitter::default()))
        } else {
            ds
        }
    }

    pub fn with_augmenter(mut self, augmenter: Arc<dyn Augmenter>) -> Self {
        tracing::debug!("Dataset augmentation enabled: {}", augmenter.name());
        self.augmenter = Some(augmenter);
        self
    }
}

impl Dataset<TrajectorySample> for TrajectoryDataset {
    fn get(&self, index: usize) -> Option<TrajectorySample> {
        let record = self.records.get(index)?;
        let sample = match &self.augmenter {
            Some(aug) => {
                // A poisoned lock only means another worker panicked mid-draw;
                // the generator state is still usable.
                let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
                self.preprocessor.sample_from_record(&aug.augment(record, &mut rng))
            }
            None => self.preprocessor.sample_from_record(record),
        };
        Some(sample)
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PipelineConfig {
        PipelineConfig { history_steps: 6, prediction_steps: 4, ..PipelineConfig::default() }
    }

    fn records(n: usize) -> Vec<TrajectoryRecord> {
        (0..n)
            .map(|i| {
                let states = (0..10).map(|t| vec![t as f32 + i as f32, 1.0, 0.0, 1.0, 0.0, 0.0]).collect();
                TrajectoryRecord::new(format!("r{i}"), states)
            })
            .collect()
    }

    #[test]
    fn test_get_returns_history_future_split() {
        let ds = TrajectoryDataset::new(records(3), &cfg());
        assert_eq!(ds.len(), 3);
        let s = ds.get(1).unwrap();
        assert_eq!(s.history.len(), 6);
        assert_eq!(s.future.len(), 4);
        assert_eq!(s.total_steps(), 10);
        assert!(ds.get(3).is_none());
    }

    #[test]
    fn test_unaugmented_dataset_is_deterministic() {
        let ds = TrajectoryDataset::new(records(1), &cfg());
        assert_eq!(ds.get(0).unwrap().history, ds.get(0).unwrap().history);
    }

    #[test]
    fn test_augmentation_perturbs_each_draw() {
        let mut c = cfg();
        c.augmentation_enabled = true;
        let ds = TrajectoryDataset::for_training(records(1), &c);
        let a = ds.get(0).unwrap();
        let b = ds.get(0).unwrap();
        assert_ne!(a.history, b.history);
        assert_eq!(a.history.len(), b.history.len());
    }

    #[test]
    fn test_finiteness_check() {
        let ds = TrajectoryDataset::new(records(1), &cfg());
        let mut s = ds.get(0).unwrap();
        assert!(s.is_finite());
        s.future[0][4] = f32::NAN;
        assert!(!s.is_finite());
    }
}
