// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Train + validation loop using Burn's DataLoader and AdamW.
//
// Phases (logged on every transition):
//   Idle → TrainingEpoch(e) → Validating(e) → TrainingEpoch(e+1) … → Done
//
// Per training step:
//   1. forward_loss on Autodiff<InnerBackend>
//   2. a NaN / inf loss aborts the run before backward()
//   3. backward, AdamW step with the WarmupCosine learning rate
//
// Batches the batcher rejected (shape / non-finite values)
// arrive as Err and are skipped with a warning.
//
// Validation runs on model.valid() (InnerBackend, no tape,
// dropout off) and reports loss, ADE / FDE in metres and the
// safety head's MAE.
//
// Each completed epoch writes a checkpoint and one metrics row.
// A cancelled epoch is discarded: the last written checkpoint
// stays the resume point. resume() reloads it and continues at
// the next epoch with the schedule's global step restored. AdamW
// moments are not checkpointed and restart from zero.
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use std::{
    fmt,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use burn::{
    data::{dataloader::{DataLoader, DataLoaderBuilder}, dataset::Dataset},
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
};

use crate::config::PipelineConfig;
use crate::data::{
    batcher::{BatchOutcome, TrajectoryBatcher},
    dataset::TrajectoryDataset,
};
use crate::domain::error::{PipelineError, PipelineResult};
use crate::infra::checkpoint::{CheckpointHeader, CheckpointManager, VerifiedCheckpoint};
use crate::infra::metrics::{EpochMetrics, MetricsSink};
use crate::ml::backend::{backend_name, default_device, Device, InnerBackend, TrainBackend};
use crate::ml::model::{displacement_errors, LossSettings, TrajectoryModel};
use crate::ml::schedule::WarmupCosine;

const GRAD_CLIP_NORM: f32 = 1.0;

// ─── CancelToken ──────────────────────────────────────────────────────────────
/// Cooperative cancellation, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ─── TrainerPhase ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerPhase {
    Idle,
    TrainingEpoch(usize),
    Validating(usize),
    Done,
}

impl fmt::Display for TrainerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle             => write!(f, "idle"),
            Self::TrainingEpoch(e) => write!(f, "training epoch {e}"),
            Self::Validating(e)    => write!(f, "validating epoch {e}"),
            Self::Done             => write!(f, "done"),
        }
    }
}

// ─── TrainingReport ───────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub epochs_completed: usize,
    pub global_steps:     usize,
    pub best_epoch:       Option<usize>,
    pub best_val_loss:    Option<f64>,
    pub best_checkpoint:  Option<PathBuf>,
    pub last_checkpoint:  Option<PathBuf>,
    pub skipped_batches:  usize,
    pub interrupted:      bool,
    pub final_phase:      TrainerPhase,
    pub history:          Vec<EpochMetrics>,
}

/// Model and bookkeeping restored from the latest checkpoint.
struct ResumePoint {
    model:         TrajectoryModel<TrainBackend>,
    epoch:         usize,
    best_epoch:    Option<usize>,
    best_val_loss: Option<f64>,
}

/// Validation aggregates for one epoch.
#[derive(Debug, Clone, Copy, Default)]
struct Evaluation {
    loss:       f64,
    ade:        f64,
    fde:        f64,
    safety_mae: f64,
    batches:    usize,
    skipped:    usize,
}

// ─── Trainer ──────────────────────────────────────────────────────────────────
pub struct Trainer {
    cfg:         PipelineConfig,
    checkpoints: CheckpointManager,
    metrics:     Box<dyn MetricsSink>,
    cancel:      CancelToken,
    provenance:  String,
    phase:       TrainerPhase,
    device:      Device,
}

impl Trainer {
    pub fn new(cfg: PipelineConfig, checkpoints: CheckpointManager, metrics: Box<dyn MetricsSink>) -> Self {
        Self {
            cfg,
            checkpoints,
            metrics,
            cancel:     CancelToken::new(),
            provenance: String::from("trajpred"),
            phase:      TrainerPhase::Idle,
            device:     default_device(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_provenance(mut self, provenance: impl Into<String>) -> Self {
        self.provenance = provenance.into();
        self
    }

    pub fn phase(&self) -> TrainerPhase {
        self.phase
    }

    fn enter(&mut self, phase: TrainerPhase) {
        tracing::info!("Trainer phase: {} → {}", self.phase, phase);
        self.phase = phase;
    }

    fn loss_settings(&self) -> LossSettings {
        LossSettings {
            alpha:            self.cfg.loss_weights.alpha,
            beta:             self.cfg.loss_weights.beta,
            // model space is world / coordinate_scale
            safety_tolerance: self.cfg.safety_tolerance / self.cfg.coordinate_scale as f64,
        }
    }

    /// Train from freshly initialised parameters.
    pub fn fit(&mut self, train: TrajectoryDataset, val: TrajectoryDataset) -> PipelineResult<TrainingReport> {
        self.run(train, val, None)
    }

    /// Continue from the latest epoch checkpoint in the checkpoint directory.
    /// Without one this is the same as `fit`.
    pub fn resume(&mut self, train: TrajectoryDataset, val: TrajectoryDataset) -> PipelineResult<TrainingReport> {
        let Some(epoch) = self.checkpoints.latest_epoch()? else {
            tracing::warn!(
                "No checkpoint in '{}' to resume from; starting fresh",
                self.checkpoints.dir().display()
            );
            return self.run(train, val, None);
        };

        let checkpoint = VerifiedCheckpoint::read(self.checkpoints.epoch_path(epoch))?;
        if !checkpoint.header().config.same_architecture(&self.cfg) {
            return Err(PipelineError::InvalidConfig(format!(
                "checkpoint '{}' was trained with a different architecture",
                checkpoint.path().display()
            )));
        }
        TrainBackend::seed(self.cfg.seed);
        let model = checkpoint.load_model::<TrainBackend>(&self.device)?;

        let (best_epoch, best_val_loss) = match self.checkpoints.best_epoch()? {
            Some(best) => (Some(best), VerifiedCheckpoint::read(self.checkpoints.epoch_path(best))?.header().val_loss),
            None => (None, None),
        };
        tracing::info!("Resuming after epoch {epoch} from '{}'", checkpoint.path().display());

        self.run(train, val, Some(ResumePoint { model, epoch, best_epoch, best_val_loss }))
    }

    fn run(
        &mut self,
        train:  TrajectoryDataset,
        val:    TrajectoryDataset,
        resume: Option<ResumePoint>,
    ) -> PipelineResult<TrainingReport> {
        self.cfg.validate()?;
        if train.is_empty() {
            return Err(PipelineError::data("training set", "no training records"));
        }
        let cfg = self.cfg.clone();
        let settings = self.loss_settings();

        if cfg.mixed_precision_enabled {
            tracing::warn!(
                "mixed_precision_enabled is set but the {} backend trains in full precision",
                backend_name()
            );
        }

        let steps_per_epoch = train.len().div_ceil(cfg.batch_size);
        let schedule = WarmupCosine::new(cfg.learning_rate, cfg.warmup_steps, steps_per_epoch * cfg.epochs);

        let mut report = TrainingReport {
            epochs_completed: 0,
            global_steps:     0,
            best_epoch:       None,
            best_val_loss:    None,
            best_checkpoint:  None,
            last_checkpoint:  None,
            skipped_batches:  0,
            interrupted:      false,
            final_phase:      TrainerPhase::Idle,
            history:          Vec::new(),
        };

        let mut model: TrajectoryModel<TrainBackend> = match resume {
            Some(point) => {
                report.epochs_completed = point.epoch;
                report.global_steps     = point.epoch * steps_per_epoch;
                report.best_epoch       = point.best_epoch;
                report.best_val_loss    = point.best_val_loss;
                report.best_checkpoint  = point.best_epoch.map(|e| self.checkpoints.epoch_path(e));
                report.last_checkpoint  = Some(self.checkpoints.epoch_path(point.epoch));
                point.model
            }
            None => {
                TrainBackend::seed(cfg.seed);
                cfg.model_config().init(&self.device)
            }
        };
        let first_epoch = report.epochs_completed + 1;
        if first_epoch > cfg.epochs {
            tracing::info!("All {} epochs already completed; nothing to train", cfg.epochs);
        }

        tracing::info!(
            "Model ready on {}: {} temporal / {} spatial layers, hidden={}",
            backend_name(),
            cfg.num_layers,
            cfg.num_spatial_layers,
            cfg.hidden_size
        );

        let mut optim = AdamWConfig::new()
            .with_weight_decay(cfg.weight_decay as f32)
            .with_grad_clipping(Some(GradientClippingConfig::Norm(GRAD_CLIP_NORM)))
            .init::<TrainBackend, TrajectoryModel<TrainBackend>>();

        // ── Training loader (AutodiffBackend) ─────────────────────────────────
        let train_loader = DataLoaderBuilder::new(TrajectoryBatcher::<TrainBackend>::new(self.device.clone(), &cfg))
            .batch_size(cfg.batch_size)
            .shuffle(cfg.seed)
            .num_workers(1)
            .build(train);

        // ── Validation loader (InnerBackend, no autodiff overhead) ────────────
        let val_loader = DataLoaderBuilder::new(TrajectoryBatcher::<InnerBackend>::new(self.device.clone(), &cfg))
            .batch_size(cfg.batch_size)
            .num_workers(1)
            .build(val);

        let mut lr = schedule.lr(report.global_steps);

        for epoch in first_epoch..=cfg.epochs {
            // ── Training phase ────────────────────────────────────────────────
            self.enter(TrainerPhase::TrainingEpoch(epoch));
            let mut loss_sum = 0.0f64;
            let mut batches  = 0usize;
            let mut skipped  = 0usize;

            for outcome in train_loader.iter() {
                if self.cancel.is_cancelled() {
                    tracing::warn!("Training cancelled during epoch {epoch}; discarding the partial epoch");
                    report.interrupted = true;
                    break;
                }
                let batch = match outcome {
                    Ok(batch) => batch,
                    Err(e) if e.is_recoverable() => {
                        tracing::warn!("Skipping training batch: {e}");
                        skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        self.enter(TrainerPhase::Done);
                        return Err(e);
                    }
                };

                let out = model.forward_loss(batch.input, batch.future, &settings);
                let loss_val = out.loss.clone().into_scalar().elem::<f64>();
                if !loss_val.is_finite() {
                    tracing::error!("Non-finite loss at epoch {epoch}, step {}", report.global_steps);
                    self.enter(TrainerPhase::Done);
                    return Err(PipelineError::TrainingDiverged {
                        epoch,
                        steps_completed: report.global_steps,
                        loss: loss_val,
                    });
                }

                lr = schedule.lr(report.global_steps);
                let grads = out.loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optim.step(lr, model, grads);

                report.global_steps += 1;
                loss_sum += loss_val;
                batches  += 1;
            }
            report.skipped_batches += skipped;

            if report.interrupted {
                break;
            }
            if batches == 0 {
                self.enter(TrainerPhase::Done);
                return Err(PipelineError::data(
                    format!("epoch {epoch}"),
                    "every training batch was rejected",
                ));
            }
            let train_loss = loss_sum / batches as f64;

            // ── Validation phase ──────────────────────────────────────────────
            self.enter(TrainerPhase::Validating(epoch));
            let model_valid = model.valid();
            let eval = match self.evaluate(&model_valid, &*val_loader, &settings) {
                Ok(eval) => eval,
                Err(e) => {
                    self.enter(TrainerPhase::Done);
                    return Err(e);
                }
            };
            report.skipped_batches += eval.skipped;

            let val_loss = if eval.batches > 0 {
                eval.loss
            } else {
                tracing::warn!("No validation batches in epoch {epoch}; selecting on training loss");
                train_loss
            };
            if !val_loss.is_finite() {
                self.enter(TrainerPhase::Done);
                return Err(PipelineError::TrainingDiverged {
                    epoch,
                    steps_completed: report.global_steps,
                    loss: val_loss,
                });
            }

            let metrics = EpochMetrics {
                epoch,
                global_step:     report.global_steps,
                learning_rate:   lr,
                train_loss,
                val_loss,
                val_ade:         eval.ade,
                val_fde:         eval.fde,
                val_safety_mae:  eval.safety_mae,
                skipped_batches: skipped + eval.skipped,
            };
            tracing::info!(
                "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | ADE={:.3}m | FDE={:.3}m | safety_mae={:.3} | lr={:.2e}",
                epoch, cfg.epochs, train_loss, val_loss, eval.ade, eval.fde, eval.safety_mae, lr,
            );

            let header = CheckpointHeader::new(cfg.clone(), epoch, Some(val_loss), self.provenance.clone());
            let path = self.checkpoints.save(&model_valid, &header)?;
            if metrics.is_improvement(report.best_val_loss) {
                self.checkpoints.mark_best(epoch)?;
                report.best_epoch      = Some(epoch);
                report.best_val_loss   = Some(val_loss);
                report.best_checkpoint = Some(path.clone());
                tracing::info!("New best checkpoint: epoch {epoch} (val_loss={val_loss:.4})");
            }
            report.last_checkpoint = Some(path);

            self.metrics.record(&metrics)?;
            report.history.push(metrics);
            report.epochs_completed = epoch;
        }

        self.enter(TrainerPhase::Done);
        report.final_phase = self.phase;
        tracing::info!(
            "Training finished: {} epochs, {} steps, {} skipped batches{}",
            report.epochs_completed,
            report.global_steps,
            report.skipped_batches,
            if report.interrupted { " (interrupted)" } else { "" }
        );
        Ok(report)
    }

    fn evaluate(
        &self,
        model:    &TrajectoryModel<InnerBackend>,
        loader:   &dyn DataLoader<BatchOutcome<InnerBackend>>,
        settings: &LossSettings,
    ) -> PipelineResult<Evaluation> {
        let scale = self.cfg.coordinate_scale as f64;
        let mut eval    = Evaluation::default();
        let mut samples = 0usize;

        for outcome in loader.iter() {
            let batch = match outcome {
                Ok(batch) => batch,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("Skipping validation batch: {e}");
                    eval.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let n = batch.ids.len();
            let out = model.forward_loss(batch.input, batch.future.clone(), settings);
            let (ade, fde) = displacement_errors(out.output.trajectory, batch.future);
            let safety_err = (out.output.safety - out.safety_target).abs();

            eval.loss       += out.loss.into_scalar().elem::<f64>();
            eval.ade        += ade.sum().into_scalar().elem::<f64>() * scale;
            eval.fde        += fde.sum().into_scalar().elem::<f64>() * scale;
            eval.safety_mae += safety_err.sum().into_scalar().elem::<f64>();
            eval.batches    += 1;
            samples         += n;
        }

        if eval.batches > 0 {
            eval.loss /= eval.batches as f64;
        }
        if samples > 0 {
            eval.ade        /= samples as f64;
            eval.fde        /= samples as f64;
            eval.safety_mae /= samples as f64;
        }
        Ok(eval)
    }
}
