use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainRequest;
use crate::config::PipelineConfig;
use crate::ml::inferencer::ServingOptions;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a model on .json / .jsonl trajectory records
    Train(TrainArgs),

    /// Predict a future trajectory for one JSON request
    Predict(PredictArgs),

    /// Verify a checkpoint's integrity and print its header
    Verify(VerifyArgs),

    /// Write a synthetic trajectory dataset as JSON Lines
    Synth(SynthArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Record file (.json / .jsonl) or a directory of them
    #[arg(long)]
    pub data: PathBuf,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// PipelineConfig JSON; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Free text stored in every checkpoint header
    #[arg(long, default_value = "trajpred-cli")]
    pub provenance: String,

    #[arg(long)]
    pub epochs: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub learning_rate: Option<f64>,

    #[arg(long)]
    pub hidden_size: Option<usize>,

    #[arg(long)]
    pub num_layers: Option<usize>,

    #[arg(long)]
    pub history_steps: Option<usize>,

    #[arg(long)]
    pub prediction_steps: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Turn off training-time augmentation
    #[arg(long)]
    pub no_augmentation: bool,

    /// Skip invalid records instead of failing the load
    #[arg(long)]
    pub lenient: bool,

    /// Continue from the latest checkpoint in --checkpoint-dir
    #[arg(long)]
    pub resume: bool,
}

impl TryFrom<TrainArgs> for TrainRequest {
    type Error = anyhow::Error;

    fn try_from(a: TrainArgs) -> Result<Self> {
        let mut config = load_config(a.config.as_deref())?;
        if let Some(v) = a.epochs           { config.epochs = v; }
        if let Some(v) = a.batch_size       { config.batch_size = v; }
        if let Some(v) = a.learning_rate    { config.learning_rate = v; }
        if let Some(v) = a.hidden_size      { config.hidden_size = v; }
        if let Some(v) = a.num_layers       { config.num_layers = v; }
        if let Some(v) = a.history_steps    { config.history_steps = v; }
        if let Some(v) = a.prediction_steps { config.prediction_steps = v; }
        if let Some(v) = a.seed             { config.seed = v; }
        if a.no_augmentation { config.augmentation_enabled = false; }
        if a.lenient         { config.skip_invalid_records = true; }

        Ok(TrainRequest {
            data_path:      a.data,
            checkpoint_dir: a.checkpoint_dir,
            config,
            provenance:     a.provenance,
            resume:         a.resume,
        })
    }
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Checkpoint file, or a checkpoint directory (uses its best epoch)
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint: PathBuf,

    /// Request JSON: {"tensors": {"ego_history": {"shape": [T, F], "data": [...]}, ...}}
    #[arg(long)]
    pub request: PathBuf,

    /// Minimum safety score; defaults to the checkpoint's config
    #[arg(long)]
    pub safety_threshold: Option<f64>,

    /// Moving-average window over predicted positions
    #[arg(long)]
    pub smoothing_window: Option<usize>,
}

impl From<&PredictArgs> for ServingOptions {
    fn from(a: &PredictArgs) -> Self {
        ServingOptions {
            safety_threshold: a.safety_threshold,
            smoothing_window: a.smoothing_window,
        }
    }
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint: PathBuf,
}

#[derive(Args, Debug)]
pub struct SynthArgs {
    #[arg(long)]
    pub output: PathBuf,

    #[arg(long, default_value_t = 200)]
    pub count: usize,

    /// PipelineConfig JSON deciding record shape (steps, widths)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub seed: Option<u64>,
}

impl SynthArgs {
    pub fn config(&self) -> Result<PipelineConfig> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        Ok(config)
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_file(p)
            .with_context(|| format!("Cannot load config from '{}'", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_flags_override_config() {
        let cli = Cli::try_parse_from([
            "trajpred", "train", "--data", "d.jsonl", "--epochs", "3", "--seed", "9", "--no-augmentation",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let req = TrainRequest::try_from(args).unwrap();
        assert_eq!(req.config.epochs, 3);
        assert_eq!(req.config.seed, 9);
        assert!(!req.config.augmentation_enabled);
        assert!(!req.resume);
        assert_eq!(req.checkpoint_dir, PathBuf::from("checkpoints"));
    }

    #[test]
    fn test_resume_flag_reaches_the_request() {
        let cli = Cli::try_parse_from(["trajpred", "train", "--data", "d.jsonl", "--resume"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        assert!(TrainRequest::try_from(args).unwrap().resume);
    }

    #[test]
    fn test_predict_flags_become_serving_options() {
        let cli = Cli::try_parse_from([
            "trajpred", "predict", "--request", "r.json", "--safety-threshold", "0.7",
        ])
        .unwrap();
        let Commands::Predict(args) = cli.command else { panic!("expected predict") };
        let options = ServingOptions::from(&args);
        assert_eq!(options.safety_threshold, Some(0.7));
        assert_eq!(options.smoothing_window, None);
    }

    #[test]
    fn test_missing_config_file_is_reported() {
        let err = load_config(Some(std::path::Path::new("/no/such/config.json"))).unwrap_err();
        assert!(err.to_string().contains("config.json"));
    }
}
