// ============================================================
// Layer 6 — Checkpoint Store
// ============================================================
// Saves and restores trained models as self-describing,
// integrity-checked files.
//
// File layout (*.tpck, all integers little endian):
//
//   magic        8 bytes   b"TRAJCKPT"
//   version      u32
//   hash         32 bytes  BLAKE3(version ‖ header ‖ params)
//   header_len   u64
//   header       JSON      CheckpointHeader (incl. full PipelineConfig)
//   params_len   u64
//   params       bytes     burn BinBytesRecorder, full precision
//
// The header carries the whole config, so a checkpoint alone is
// enough to rebuild the architecture before loading weights.
// Reading is pure data: lengths are bounds-checked against the
// file and the hash must match before anything is decoded.
// Only a VerifiedCheckpoint can produce a model.
//
// Directory convention:
//   checkpoints/
//     checkpoint_epoch_1.tpck
//     checkpoint_epoch_2.tpck
//     latest_epoch.json    ← number of the last completed epoch
//     best_epoch.json      ← epoch with the lowest validation loss
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use burn::{
    prelude::*,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::domain::error::{PipelineError, PipelineResult};
use crate::ml::model::{TrajectoryModel, TrajectoryModelRecord};

pub const MAGIC: &[u8; 8] = b"TRAJCKPT";
pub const FORMAT_VERSION: u32 = 1;
pub const EXTENSION: &str = "tpck";

const HASH_LEN: usize = 32;
/// magic + version + hash + header_len
const PREAMBLE_LEN: usize = 8 + 4 + HASH_LEN + 8;

type ParamRecorder = BinBytesRecorder<FullPrecisionSettings>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointHeader {
    pub format_version:    u32,
    /// Free text naming where the weights came from (run name, data set, …)
    pub provenance:        String,
    pub epoch:             usize,
    pub created_unix_secs: u64,
    pub val_loss:          Option<f64>,
    pub config:            PipelineConfig,
}

impl CheckpointHeader {
    pub fn new(config: PipelineConfig, epoch: usize, val_loss: Option<f64>, provenance: impl Into<String>) -> Self {
        let created_unix_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            format_version: FORMAT_VERSION,
            provenance: provenance.into(),
            epoch,
            created_unix_secs,
            val_loss,
            config,
        }
    }
}

fn integrity_hash(version: u32, header: &[u8], params: &[u8]) -> [u8; HASH_LEN] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&version.to_le_bytes());
    hasher.update(header);
    hasher.update(params);
    *hasher.finalize().as_bytes()
}

/// Serialise a model + header into the checkpoint byte layout.
pub fn encode_checkpoint<B: Backend>(model: &TrajectoryModel<B>, header: &CheckpointHeader) -> PipelineResult<Vec<u8>> {
    let header_bytes = serde_json::to_vec(header)?;
    let params = Recorder::<B>::record(&ParamRecorder::default(), model.clone().into_record(), ())
        .map_err(|e| PipelineError::Record(format!("{e:?}")))?;

    let hash = integrity_hash(FORMAT_VERSION, &header_bytes, &params);

    let mut out = Vec::with_capacity(PREAMBLE_LEN + header_bytes.len() + 8 + params.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&hash);
    out.extend_from_slice(&(header_bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&(params.len() as u64).to_le_bytes());
    out.extend_from_slice(&params);
    Ok(out)
}

// ─── VerifiedCheckpoint ───────────────────────────────────────────────────────
/// A checkpoint whose structure and hash have been checked.
#[derive(Debug, Clone)]
pub struct VerifiedCheckpoint {
    path:   PathBuf,
    header: CheckpointHeader,
    params: Vec<u8>,
}

impl VerifiedCheckpoint {
    pub fn read(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_bytes(path, &bytes)
    }

    pub fn from_bytes(path: impl AsRef<Path>, bytes: &[u8]) -> PipelineResult<Self> {
        let path = path.as_ref();
        let fail = |reason: String| PipelineError::checkpoint(path, reason);

        if bytes.len() < PREAMBLE_LEN {
            return Err(fail(format!("file is {} bytes, shorter than the fixed preamble", bytes.len())));
        }
        let mut cursor = Cursor { bytes, pos: 0 };

        if cursor.take(8).map_err(&fail)? != MAGIC {
            return Err(fail("bad magic, not a trajectory checkpoint".to_string()));
        }
        let version = u32::from_le_bytes(cursor.array::<4>().map_err(&fail)?);
        if version != FORMAT_VERSION {
            return Err(fail(format!("unsupported format version {version} (expected {FORMAT_VERSION})")));
        }
        let stored_hash = cursor.array::<HASH_LEN>().map_err(&fail)?;

        let header_len   = cursor.length().map_err(&fail)?;
        let header_bytes = cursor.take(header_len).map_err(&fail)?;
        let params_len   = cursor.length().map_err(&fail)?;
        let params       = cursor.take(params_len).map_err(&fail)?;
        if cursor.remaining() != 0 {
            return Err(fail(format!("{} trailing bytes after parameters", cursor.remaining())));
        }

        if integrity_hash(version, header_bytes, params) != stored_hash {
            return Err(fail("integrity hash mismatch".to_string()));
        }

        let header: CheckpointHeader = serde_json::from_slice(header_bytes)
            .map_err(|e| fail(format!("malformed header: {e}")))?;
        header
            .config
            .validate()
            .map_err(|e| fail(format!("stored config is invalid: {e}")))?;

        Ok(Self { path: path.to_path_buf(), header, params: params.to_vec() })
    }

    pub fn header(&self) -> &CheckpointHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rebuild the architecture from the stored config and load the weights.
    pub fn load_model<B: Backend>(&self, device: &B::Device) -> PipelineResult<TrajectoryModel<B>> {
        let model: TrajectoryModel<B> = self.header.config.model_config().init(device);
        let record: TrajectoryModelRecord<B> =
            Recorder::<B>::load(&ParamRecorder::default(), self.params.clone(), device)
                .map_err(|e| PipelineError::checkpoint(&self.path, format!("cannot decode parameters: {e:?}")))?;
        Ok(model.load_record(record))
    }
}

/// Bounds-checked reader over the checkpoint bytes.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos:   usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        if n > self.remaining() {
            return Err(format!(
                "truncated: need {n} bytes at offset {}, only {} left",
                self.pos,
                self.remaining()
            ));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], String> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn length(&mut self) -> Result<usize, String> {
        let len = u64::from_le_bytes(self.array::<8>()?);
        usize::try_from(len)
            .ok()
            .filter(|&l| l <= self.remaining())
            .ok_or_else(|| format!("declared length {len} exceeds the {} remaining bytes", self.remaining()))
    }
}

// ─── CheckpointManager ────────────────────────────────────────────────────────
/// Manages the checkpoints of one training run directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> PipelineResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn epoch_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("checkpoint_epoch_{epoch}.{EXTENSION}"))
    }

    /// Write the checkpoint for `header.epoch` and move the latest pointer.
    pub fn save<B: Backend>(&self, model: &TrajectoryModel<B>, header: &CheckpointHeader) -> PipelineResult<PathBuf> {
        let path  = self.epoch_path(header.epoch);
        let bytes = encode_checkpoint(model, header)?;

        // Write-then-rename so a crash never leaves a half-written checkpoint.
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;

        self.write_pointer("latest_epoch.json", header.epoch)?;
        tracing::debug!("Saved checkpoint: epoch {} ({} bytes)", header.epoch, bytes.len());
        Ok(path)
    }

    pub fn mark_best(&self, epoch: usize) -> PipelineResult<()> {
        self.write_pointer("best_epoch.json", epoch)
    }

    pub fn latest_epoch(&self) -> PipelineResult<Option<usize>> {
        self.read_pointer("latest_epoch.json")
    }

    pub fn best_epoch(&self) -> PipelineResult<Option<usize>> {
        self.read_pointer("best_epoch.json")
    }

    /// Path of the best checkpoint, falling back to the latest one.
    pub fn preferred_path(&self) -> PipelineResult<Option<PathBuf>> {
        let epoch = match self.best_epoch()? {
            Some(e) => Some(e),
            None    => self.latest_epoch()?,
        };
        Ok(epoch.map(|e| self.epoch_path(e)))
    }

    fn write_pointer(&self, name: &str, epoch: usize) -> PipelineResult<()> {
        fs::write(self.dir.join(name), serde_json::to_string(&epoch)?)?;
        Ok(())
    }

    fn read_pointer(&self, name: &str) -> PipelineResult<Option<usize>> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
        Ok(Some(serde_json::from_str::<usize>(&s)?))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::ModelInput;
    use burn::tensor::Distribution;

    type TestBackend = burn::backend::NdArray;

    fn tiny_config() -> PipelineConfig {
        PipelineConfig {
            hidden_size:        16,
            num_heads:          2,
            num_layers:         2,
            num_spatial_layers: 1,
            ff_size:            32,
            history_steps:      6,
            prediction_steps:   3,
            max_neighbors:      2,
            max_map_elements:   2,
            ..PipelineConfig::default()
        }
    }

    fn input(device: &<TestBackend as Backend>::Device) -> ModelInput<TestBackend> {
        let no_pad = |n: usize| Tensor::<TestBackend, 2, Int>::zeros([1, n], device).equal_elem(1);
        ModelInput {
            history:       Tensor::random([1, 6, 6], Distribution::Normal(0.0, 1.0), device),
            neighbors:     Tensor::random([1, 2, 6], Distribution::Normal(0.0, 1.0), device),
            neighbor_mask: no_pad(2),
            map:           Tensor::random([1, 2, 4], Distribution::Normal(0.0, 1.0), device),
            map_mask:      no_pad(2),
        }
    }

    fn saved(dir: &Path) -> (TrajectoryModel<TestBackend>, PathBuf) {
        let cfg    = tiny_config();
        let device = Default::default();
        let model  = cfg.model_config().init::<TestBackend>(&device);
        let store  = CheckpointManager::new(dir).unwrap();
        let path   = store.save(&model, &CheckpointHeader::new(cfg, 1, Some(0.5), "unit-test")).unwrap();
        (model, path)
    }

    #[test]
    fn test_round_trip_gives_identical_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let (model, path) = saved(dir.path());
        let device = Default::default();

        let loaded = VerifiedCheckpoint::read(&path).unwrap();
        assert_eq!(loaded.header().epoch, 1);
        assert_eq!(loaded.header().provenance, "unit-test");
        let restored = loaded.load_model::<TestBackend>(&device).unwrap();

        let x = input(&device);
        let a = model.forward(x.clone()).trajectory.into_data().to_vec::<f32>().unwrap();
        let b = restored.forward(x).trajectory.into_data().to_vec::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_flipped_parameter_byte_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_, path) = saved(dir.path());
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let err = VerifiedCheckpoint::from_bytes(&path, &bytes).unwrap_err();
        assert!(matches!(err, PipelineError::CheckpointIntegrity { ref reason, .. } if reason.contains("hash")));
    }

    #[test]
    fn test_tampered_stored_hash_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_, path) = saved(dir.path());
        let mut bytes = fs::read(&path).unwrap();
        bytes[12] ^= 0xff;
        assert!(VerifiedCheckpoint::from_bytes(&path, &bytes).is_err());
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_, path) = saved(dir.path());
        let bytes = fs::read(&path).unwrap();
        for cut in [4, PREAMBLE_LEN + 3, bytes.len() - 10] {
            let err = VerifiedCheckpoint::from_bytes(&path, &bytes[..cut]).unwrap_err();
            assert!(matches!(err, PipelineError::CheckpointIntegrity { .. }));
        }
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_, path) = saved(dir.path());
        let mut bytes = fs::read(&path).unwrap();
        bytes[..8].copy_from_slice(b"NOTACKPT");
        let err = VerifiedCheckpoint::from_bytes(&path, &bytes).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_missing_file_is_io_not_integrity() {
        let dir = tempfile::tempdir().unwrap();
        let err = VerifiedCheckpoint::read(dir.path().join("checkpoint_epoch_9.tpck")).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[test]
    fn test_pointers_track_latest_and_best() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointManager::new(dir.path()).unwrap();
        assert_eq!(store.latest_epoch().unwrap(), None);
        assert_eq!(store.preferred_path().unwrap(), None);

        let cfg   = tiny_config();
        let model = cfg.model_config().init::<TestBackend>(&Default::default());
        store.save(&model, &CheckpointHeader::new(cfg.clone(), 1, Some(0.4), "run")).unwrap();
        store.mark_best(1).unwrap();
        store.save(&model, &CheckpointHeader::new(cfg, 2, Some(0.6), "run")).unwrap();

        assert_eq!(store.latest_epoch().unwrap(), Some(2));
        assert_eq!(store.best_epoch().unwrap(), Some(1));
        assert_eq!(store.preferred_path().unwrap(), Some(store.epoch_path(1)));
    }
}
