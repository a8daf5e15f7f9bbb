// ============================================================
// Layer 6 — Metrics Sinks
// ============================================================
// Where the trainer sends one row of metrics per completed
// epoch.
//
//   CsvMetricsSink  → appends to <dir>/metrics.csv
//   InMemorySink    → keeps rows in a shared Vec (tests, callers
//                     that want the history programmatically)
//
// Example CSV output:
//   epoch,global_step,learning_rate,train_loss,val_loss,val_ade,val_fde,val_safety_mae,skipped_batches
//   1,12,0.000950,0.842113,0.791220,3.104551,5.920137,0.214400,0
//   2,24,0.000812,0.611734,0.602871,2.455012,4.810243,0.166213,0
//
// ADE / FDE are in metres (world units).

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineResult;

const CSV_HEADER: &str =
    "epoch,global_step,learning_rate,train_loss,val_loss,val_ade,val_fde,val_safety_mae,skipped_batches";

/// One row of metrics for a single completed epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:           usize,
    /// Optimizer steps taken so far, across all epochs
    pub global_step:     usize,
    /// Learning rate of the last step in the epoch
    pub learning_rate:   f64,
    pub train_loss:      f64,
    pub val_loss:        f64,
    /// Average displacement error on the validation set (m)
    pub val_ade:         f64,
    /// Final displacement error on the validation set (m)
    pub val_fde:         f64,
    /// Mean |score - target| of the safety head
    pub val_safety_mae:  f64,
    /// Batches dropped this epoch (train + validation)
    pub skipped_batches: usize,
}

impl EpochMetrics {
    /// Returns true if this epoch improved over the previous best val_loss
    pub fn is_improvement(&self, best_val_loss: Option<f64>) -> bool {
        match best_val_loss {
            _ if !self.val_loss.is_finite() => false,
            Some(best) => self.val_loss < best,
            None => true,
        }
    }

    fn csv_row(&self) -> String {
        format!(
            "{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{}",
            self.epoch,
            self.global_step,
            self.learning_rate,
            self.train_loss,
            self.val_loss,
            self.val_ade,
            self.val_fde,
            self.val_safety_mae,
            self.skipped_batches,
        )
    }
}

pub trait MetricsSink: Send {
    fn record(&mut self, metrics: &EpochMetrics) -> PipelineResult<()>;
}

// ─── CsvMetricsSink ───────────────────────────────────────────────────────────
/// Logs epoch metrics to a CSV file for later analysis.
pub struct CsvMetricsSink {
    csv_path: PathBuf,
}

impl CsvMetricsSink {
    /// Creates the directory and writes the header if the file is new,
    /// so repeated runs append to the same log.
    pub fn new(dir: impl AsRef<Path>) -> PipelineResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{CSV_HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }
        Ok(Self { csv_path })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl MetricsSink for CsvMetricsSink {
    fn record(&mut self, m: &EpochMetrics) -> PipelineResult<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(f, "{}", m.csv_row())?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );
        Ok(())
    }
}

// ─── InMemorySink ─────────────────────────────────────────────────────────────
/// Clones share the same storage, so a caller can keep one handle and
/// give another to the trainer.
#[derive(Debug, Clone, Default)]
pub struct InMemorySink {
    rows: Arc<Mutex<Vec<EpochMetrics>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<EpochMetrics> {
        self.rows.lock().map(|r| r.clone()).unwrap_or_else(|p| p.into_inner().clone())
    }
}

impl MetricsSink for InMemorySink {
    fn record(&mut self, metrics: &EpochMetrics) -> PipelineResult<()> {
        let mut rows = self.rows.lock().unwrap_or_else(|p| p.into_inner());
        rows.push(metrics.clone());
        Ok(())
    }
}
