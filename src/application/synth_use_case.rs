// ============================================================
// Layer 2 — SynthUseCase
// ============================================================
// Generates a synthetic dataset shaped by a PipelineConfig and
// writes it as JSON Lines, ready for `train`.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::PipelineConfig;
use crate::data::{loader::write_jsonl, synthetic::SyntheticGenerator};
use crate::domain::traits::TrajectorySource;

pub struct SynthUseCase {
    output: PathBuf,
    count:  usize,
    config: PipelineConfig,
}

impl SynthUseCase {
    pub fn new(output: PathBuf, count: usize, config: PipelineConfig) -> Self {
        Self { output, count, config }
    }

    /// Returns the number of records written.
    pub fn execute(&self) -> Result<usize> {
        self.config.validate().context("Invalid configuration")?;
        let records = SyntheticGenerator::new(self.count, &self.config).load_all()?;
        write_jsonl(&self.output, &records)
            .with_context(|| format!("Cannot write '{}'", self.output.display()))?;
        tracing::info!("Wrote {} synthetic records to '{}'", records.len(), self.output.display());
        Ok(records.len())
    }
}
