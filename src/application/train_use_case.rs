// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate the config                (config)
//   Step 2: Load + validate records            (Layer 4 - data)
//   Step 3: Seeded train / validation split    (Layer 4 - data)
//   Step 4: Build datasets                     (Layer 4 - data)
//   Step 5: Save the run config                (Layer 6 - infra)
//   Step 6: Run the training loop              (Layer 5 - ml)
//           fresh, or from the latest checkpoint when resuming
//
// Reference: Burn Book §5 (Training)

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::PipelineConfig;
use crate::data::{
    dataset::TrajectoryDataset,
    loader::JsonTrajectoryLoader,
    splitter::split_train_val,
};
use crate::domain::traits::TrajectorySource;
use crate::infra::{checkpoint::CheckpointManager, metrics::CsvMetricsSink};
use crate::ml::trainer::{CancelToken, Trainer, TrainingReport};

/// Everything one training run needs.
#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub data_path:      PathBuf,
    pub checkpoint_dir: PathBuf,
    pub config:         PipelineConfig,
    pub provenance:     String,
    /// Continue from the latest checkpoint in `checkpoint_dir`
    pub resume:         bool,
}

pub struct TrainUseCase {
    request: TrainRequest,
    cancel:  CancelToken,
}

impl TrainUseCase {
    pub fn new(request: TrainRequest) -> Self {
        Self { request, cancel: CancelToken::new() }
    }

    /// Token that stops the run between batches.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn execute(&self) -> Result<TrainingReport> {
        let req = &self.request;
        let cfg = &req.config;
        cfg.validate().context("Invalid training configuration")?;

        tracing::info!("Loading trajectories from '{}'", req.data_path.display());
        let records = JsonTrajectoryLoader::new(&req.data_path, cfg)
            .load_all()
            .with_context(|| format!("Cannot load training data from '{}'", req.data_path.display()))?;

        let (train_records, val_records) =
            split_train_val(records, 1.0 - cfg.validation_fraction, cfg.seed);
        tracing::info!("Split: {} train, {} validation", train_records.len(), val_records.len());

        let train_dataset = TrajectoryDataset::for_training(train_records, cfg);
        let val_dataset   = TrajectoryDataset::new(val_records, cfg);

        let checkpoints = CheckpointManager::new(&req.checkpoint_dir).with_context(|| {
            format!("Cannot create checkpoint directory '{}'", req.checkpoint_dir.display())
        })?;
        let config_path = req.checkpoint_dir.join("pipeline_config.json");
        cfg.save(&config_path)
            .with_context(|| format!("Cannot write config to '{}'", config_path.display()))?;
        let metrics = CsvMetricsSink::new(&req.checkpoint_dir)?;

        let mut trainer = Trainer::new(cfg.clone(), checkpoints, Box::new(metrics))
            .with_cancel_token(self.cancel.clone())
            .with_provenance(req.provenance.clone());

        let report = if req.resume {
            trainer.resume(train_dataset, val_dataset)
        } else {
            trainer.fit(train_dataset, val_dataset)
        }
        .context("Training failed")?;
        Ok(report)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::synth_use_case::SynthUseCase;

    #[test]
    fn test_end_to_end_training_on_synthetic_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            hidden_size:        8,
            num_heads:          2,
            num_layers:         1,
            num_spatial_layers: 1,
            ff_size:            16,
            history_steps:      4,
            prediction_steps:   2,
            max_neighbors:      2,
            max_map_elements:   2,
            batch_size:         4,
            epochs:             1,
            ..PipelineConfig::default()
        };
        let data_path = dir.path().join("synthetic.jsonl");
        SynthUseCase::new(data_path.clone(), 10, config.clone()).execute().unwrap();

        let report = TrainUseCase::new(TrainRequest {
            data_path,
            checkpoint_dir: dir.path().join("ckpt"),
            config,
            provenance: "synthetic".to_string(),
            resume:     false,
        })
        .execute()
        .unwrap();

        assert_eq!(report.epochs_completed, 1);
        assert!(dir.path().join("ckpt/metrics.csv").exists());
        assert!(dir.path().join("ckpt/pipeline_config.json").exists());
        assert!(dir.path().join("ckpt/best_epoch.json").exists());
    }

    #[test]
    fn test_missing_data_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = TrainUseCase::new(TrainRequest {
            data_path:      dir.path().join("nothing.jsonl"),
            checkpoint_dir: dir.path().join("ckpt"),
            config:         PipelineConfig::default(),
            provenance:     String::new(),
            resume:         false,
        })
        .execute()
        .unwrap_err();
        assert!(format!("{err:#}").contains("nothing.jsonl"));
    }

    #[test]
    fn test_resume_extends_a_finished_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            hidden_size:        8,
            num_heads:          2,
            num_layers:         1,
            num_spatial_layers: 1,
            ff_size:            16,
            history_steps:      4,
            prediction_steps:   2,
            max_neighbors:      2,
            max_map_elements:   2,
            batch_size:         4,
            epochs:             1,
            ..PipelineConfig::default()
        };
        let data_path = dir.path().join("synthetic.jsonl");
        SynthUseCase::new(data_path.clone(), 10, config.clone()).execute().unwrap();

        let request = |epochs: usize, resume: bool| TrainRequest {
            data_path:      data_path.clone(),
            checkpoint_dir: dir.path().join("ckpt"),
            config:         PipelineConfig { epochs, ..config.clone() },
            provenance:     "synthetic".to_string(),
            resume,
        };
        TrainUseCase::new(request(1, false)).execute().unwrap();
        let report = TrainUseCase::new(request(3, true)).execute().unwrap();

        assert_eq!(report.epochs_completed, 3);
        assert_eq!(report.history.len(), 2);
        assert!(dir.path().join("ckpt/checkpoint_epoch_3.tpck").exists());
    }
}
