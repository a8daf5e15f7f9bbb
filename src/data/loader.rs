// ============================================================
// Layer 4 — Trajectory Loader
// ============================================================
// Loads TrajectoryRecords from disk. Accepted sources:
//
//   data.json    — a JSON array of records
//   data.jsonl   — one JSON record per line
//   data/        — a directory; every .json / .jsonl inside is read
//                  (sorted by file name so runs are reproducible)
//
// Each record is validated against the configured shape
// (time-step count, row widths). By default the first invalid
// record fails the whole load with a DataIntegrity error; in
// lenient mode invalid records are logged and skipped.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::config::PipelineConfig;
use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::traits::TrajectorySource;
use crate::domain::trajectory::{RecordShape, TrajectoryRecord};

pub struct JsonTrajectoryLoader {
    path:    PathBuf,
    shape:   RecordShape,
    lenient: bool,
}

impl JsonTrajectoryLoader {
    pub fn new(path: impl Into<PathBuf>, cfg: &PipelineConfig) -> Self {
        Self {
            path:    path.into(),
            shape:   cfg.record_shape(),
            lenient: cfg.skip_invalid_records,
        }
    }

    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    fn files(&self) -> PipelineResult<Vec<PathBuf>> {
        if !self.path.exists() {
            return Err(PipelineError::io(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "data path does not exist"),
            ));
        }
        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&self.path)
            .map_err(|e| PipelineError::io(&self.path, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| matches!(extension(p), Some("json") | Some("jsonl")))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Parse one file into (source label, parse result) pairs.
    fn parse_file(&self, path: &Path) -> PipelineResult<Vec<(String, PipelineResult<TrajectoryRecord>)>> {
        let text = fs::read_to_string(path)
            .map_err(|e| PipelineError::io(path, e))?;
        let name = path.display().to_string();

        if extension(path) == Some("jsonl") {
            Ok(text
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(i, line)| {
                    let label = format!("{name}:{}", i + 1);
                    let parsed = serde_json::from_str::<TrajectoryRecord>(line)
                        .map_err(|e| PipelineError::data(&label, format!("malformed record: {e}")));
                    (label, parsed)
                })
                .collect())
        } else {
            let records: Vec<TrajectoryRecord> = serde_json::from_str(&text)
                .map_err(|e| PipelineError::data(&name, format!("malformed record array: {e}")))?;
            Ok(records
                .into_iter()
                .enumerate()
                .map(|(i, r)| (format!("{name}[{i}]"), Ok(r)))
                .collect())
        }
    }
}

impl TrajectorySource for JsonTrajectoryLoader {
    fn load_all(&self) -> PipelineResult<Vec<TrajectoryRecord>> {
        let mut records = Vec::new();
        let mut skipped = 0usize;

        for file in self.files()? {
            for (label, parsed) in self.parse_file(&file)? {
                let checked = parsed.and_then(|r| r.validate(&self.shape).map(|_| r));
                match checked {
                    Ok(record) => records.push(record),
                    Err(e) if self.lenient => {
                        tracing::warn!("Skipping invalid record at {label}: {e}");
                        skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        if records.is_empty() {
            return Err(PipelineError::data(
                self.path.display().to_string(),
                "no valid trajectory records found",
            ));
        }
        tracing::info!(
            "Loaded {} trajectory records from '{}' ({} skipped)",
            records.len(),
            self.path.display(),
            skipped
        );
        Ok(records)
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

/// Write records as JSON Lines.
pub fn write_jsonl(path: impl AsRef<Path>, records: &[TrajectoryRecord]) -> PipelineResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut out = String::new();
    for r in records {
        out.push_str(&serde_json::to_string(r)?);
        out.push('\n');
    }
    fs::write(path, out)?;
    Ok(())
}
