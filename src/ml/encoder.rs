// ============================================================
// Layer 5 — Feature Encoder
// ============================================================
// Lifts per-step input features into the hidden space.
//
//   identity : passthrough, only valid when input_size == hidden_size
//   learned  : Linear(input → hidden) → GELU → LayerNorm
//
// Either way the sequence length is unchanged.

use burn::{
    nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::gelu,
};

#[derive(Config, Debug)]
pub struct FeatureEncoderConfig {
    pub input_size:  usize,
    pub hidden_size: usize,
    #[config(default = true)]
    pub learned:     bool,
}

impl FeatureEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FeatureEncoder<B> {
        let learned = self.learned || self.input_size != self.hidden_size;
        if learned && !self.learned {
            tracing::warn!(
                "Identity encoder needs input_size == hidden_size ({} != {}); using a learned projection",
                self.input_size,
                self.hidden_size
            );
        }
        if !learned {
            return FeatureEncoder { projection: None, norm: None };
        }
        FeatureEncoder {
            projection: Some(LinearConfig::new(self.input_size, self.hidden_size).init(device)),
            norm:       Some(LayerNormConfig::new(self.hidden_size).init(device)),
        }
    }
}

#[derive(Module, Debug)]
pub struct FeatureEncoder<B: Backend> {
    pub projection: Option<Linear<B>>,
    pub norm:       Option<LayerNorm<B>>,
}

impl<B: Backend> FeatureEncoder<B> {
    /// x: [batch, steps, input_size] → [batch, steps, hidden_size]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        match (&self.projection, &self.norm) {
            (Some(projection), Some(norm)) => norm.forward(gelu(projection.forward(x))),
            _ => x,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.projection.is_none()
    }
}
