// ============================================================
// Pipeline Configuration
// ============================================================
// One explicit struct carries every knob of a run. It is built
// from defaults, an optional JSON file and CLI overrides, then
// validated once and passed by reference into the Trainer and
// the InferenceService. A copy is embedded in every checkpoint
// so serving rebuilds exactly the architecture that was trained.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::trajectory::{RecordShape, POSITION_DIM, STATE_DIM};
use crate::ml::model::TrajectoryModelConfig;

/// How raw per-step features are mapped into the model width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    /// Pass-through; requires `input_size == hidden_size`.
    Identity,
    /// Linear → GELU → LayerNorm.
    Learned,
}

/// Weights of the multi-objective loss: `alpha * trajectory + beta * safety`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossWeights {
    pub alpha: f64,
    pub beta:  f64,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self { alpha: 1.0, beta: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // ── model ────────────────────────────────────────────────
    pub input_size:         usize,
    pub hidden_size:        usize,
    pub num_heads:          usize,
    /// Depth of the temporal attention stack.
    pub num_layers:         usize,
    pub num_spatial_layers: usize,
    pub ff_size:            usize,
    pub history_steps:      usize,
    pub prediction_steps:   usize,
    pub max_neighbors:      usize,
    pub max_map_elements:   usize,
    pub map_feature_size:   usize,
    pub encoder:            EncoderKind,
    pub dropout:            f64,

    // ── training ─────────────────────────────────────────────
    pub batch_size:              usize,
    pub epochs:                  usize,
    pub learning_rate:           f64,
    pub weight_decay:            f64,
    pub warmup_steps:            usize,
    pub mixed_precision_enabled: bool,
    pub augmentation_enabled:    bool,
    pub loss_weights:            LossWeights,
    /// Displacement error (metres) at which the safety target falls to 1/e.
    pub safety_tolerance:        f64,
    pub validation_fraction:     f64,
    pub seed:                    u64,
    /// Positions and velocities are divided by this before entering the model.
    pub coordinate_scale:        f32,
    pub skip_invalid_records:    bool,

    // ── serving ──────────────────────────────────────────────
    pub safety_threshold: f64,
    pub smoothing_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_size:         STATE_DIM,
            hidden_size:        64,
            num_heads:          4,
            num_layers:         4,
            num_spatial_layers: 2,
            ff_size:            128,
            history_steps:      20,
            prediction_steps:   20,
            max_neighbors:      8,
            max_map_elements:   16,
            map_feature_size:   4,
            encoder:            EncoderKind::Learned,
            dropout:            0.1,

            batch_size:              16,
            epochs:                  10,
            learning_rate:           1e-3,
            weight_decay:            1e-4,
            warmup_steps:            50,
            mixed_precision_enabled: false,
            augmentation_enabled:    true,
            loss_weights:            LossWeights::default(),
            safety_tolerance:        2.0,
            validation_fraction:     0.2,
            seed:                    42,
            coordinate_scale:        10.0,
            skip_invalid_records:    false,

            safety_threshold: 0.5,
            smoothing_window: 3,
        }
    }
}

impl PipelineConfig {
    /// Read a (possibly partial) JSON config; missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| PipelineError::io(path, e))?;
        let cfg: Self = serde_json::from_str(&json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> PipelineResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }

    pub fn validate(&self) -> PipelineResult<()> {
        let fail = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if self.input_size < STATE_DIM {
            return fail(format!("input_size must be at least {STATE_DIM} (x, y, z, vx, vy, vz), got {}", self.input_size));
        }
        if self.map_feature_size < POSITION_DIM {
            return fail(format!("map_feature_size must be at least {POSITION_DIM}, got {}", self.map_feature_size));
        }
        for (name, value) in [
            ("hidden_size", self.hidden_size),
            ("num_heads", self.num_heads),
            ("num_layers", self.num_layers),
            ("ff_size", self.ff_size),
            ("history_steps", self.history_steps),
            ("prediction_steps", self.prediction_steps),
            ("max_neighbors", self.max_neighbors),
            ("max_map_elements", self.max_map_elements),
            ("batch_size", self.batch_size),
            ("smoothing_window", self.smoothing_window),
        ] {
            if value == 0 {
                return fail(format!("{name} must be greater than zero"));
            }
        }
        if self.hidden_size % self.num_heads != 0 {
            return fail(format!(
                "hidden_size ({}) must be divisible by num_heads ({})",
                self.hidden_size, self.num_heads
            ));
        }
        if self.encoder == EncoderKind::Identity && self.input_size != self.hidden_size {
            return fail(format!(
                "identity encoder needs input_size == hidden_size ({} != {})",
                self.input_size, self.hidden_size
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return fail(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        let LossWeights { alpha, beta } = self.loss_weights;
        if !(alpha >= 0.0 && beta >= 0.0) || !alpha.is_finite() || !beta.is_finite() {
            return fail(format!("loss weights must be finite and non-negative, got alpha={alpha} beta={beta}"));
        }
        if alpha + beta == 0.0 {
            return fail("at least one loss weight must be positive".to_string());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return fail(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if !(self.weight_decay >= 0.0) {
            return fail(format!("weight_decay must be non-negative, got {}", self.weight_decay));
        }
        if !(self.safety_tolerance > 0.0) {
            return fail(format!("safety_tolerance must be positive, got {}", self.safety_tolerance));
        }
        if !(0.0..=1.0).contains(&self.safety_threshold) {
            return fail(format!("safety_threshold must be in [0, 1], got {}", self.safety_threshold));
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return fail(format!("validation_fraction must be in [0, 1), got {}", self.validation_fraction));
        }
        if !(self.coordinate_scale > 0.0 && self.coordinate_scale.is_finite()) {
            return fail(format!("coordinate_scale must be positive, got {}", self.coordinate_scale));
        }
        Ok(())
    }

    pub fn record_shape(&self) -> RecordShape {
        RecordShape {
            input_size:       self.input_size,
            history_steps:    self.history_steps,
            prediction_steps: self.prediction_steps,
            map_feature_size: self.map_feature_size,
        }
    }

    /// True when both configs build parameter-compatible models.
    pub fn same_architecture(&self, other: &Self) -> bool {
        self.input_size == other.input_size
            && self.hidden_size == other.hidden_size
            && self.num_heads == other.num_heads
            && self.num_layers == other.num_layers
            && self.num_spatial_layers == other.num_spatial_layers
            && self.ff_size == other.ff_size
            && self.history_steps == other.history_steps
            && self.prediction_steps == other.prediction_steps
            && self.map_feature_size == other.map_feature_size
            && self.encoder == other.encoder
    }

    /// The architecture part of the config, in burn's Config form.
    pub fn model_config(&self) -> TrajectoryModelConfig {
        TrajectoryModelConfig::new(
            self.input_size,
            self.hidden_size,
            self.num_heads,
            self.num_layers,
            self.num_spatial_layers,
            self.ff_size,
            self.history_steps,
            self.prediction_steps,
            self.map_feature_size,
        )
        .with_learned_encoder(self.encoder == EncoderKind::Learned)
        .with_dropout(self.dropout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_training_settings_do_not_change_architecture() {
        let base = PipelineConfig::default();
        let longer = PipelineConfig { epochs: base.epochs * 2, learning_rate: 1e-4, ..base.clone() };
        assert!(base.same_architecture(&longer));
        let wider = PipelineConfig { hidden_size: base.hidden_size * 2, ..base.clone() };
        assert!(!base.same_architecture(&wider));
    }

    #[test]
    fn test_negative_loss_weight_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.loss_weights = LossWeights { alpha: 1.0, beta: -0.1 };
        assert!(matches!(cfg.validate(), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_loss_weights_need_not_sum_to_one() {
        let mut cfg = PipelineConfig::default();
        cfg.loss_weights = LossWeights { alpha: 3.0, beta: 2.0 };
        cfg.validate().unwrap();
        cfg.loss_weights = LossWeights { alpha: 0.0, beta: 0.0 };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_identity_encoder_requires_matching_width() {
        let mut cfg = PipelineConfig::default();
        cfg.encoder = EncoderKind::Identity;
        assert!(cfg.validate().is_err());
        cfg.hidden_size = cfg.input_size;
        cfg.num_heads   = 2;
        cfg.validate().unwrap();
    }

    #[test]
    fn test_heads_must_divide_hidden_size() {
        let mut cfg = PipelineConfig::default();
        cfg.num_heads = 5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, r#"{ "epochs": 3, "loss_weights": { "alpha": 2.0, "beta": 1.0 } }"#).unwrap();
        let cfg = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.loss_weights.alpha, 2.0);
        assert_eq!(cfg.hidden_size, PipelineConfig::default().hidden_size);
    }
}
