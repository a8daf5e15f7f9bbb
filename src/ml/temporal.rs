// ============================================================
// Layer 5 — Temporal Module
// ============================================================
// Summarises the encoded ego history into one vector.
//
// Stack of `num_layers` attention blocks under a causal mask
// (step t only sees steps ≤ t). Each block adds its own learned
// timestep embedding to its input, since attention by itself
// has no notion of order.
//
// Every block's output is kept; the depth average of those
// outputs is taken, and its final time step (the most recent
// observation, which has seen the whole window) is
// layer-normalised into the summary:
//
//   [batch, history_steps, hidden] → [batch, hidden]
//
// The output shape is the same for any num_layers ≥ 1.

use burn::{
    nn::{
        attention::generate_autoregressive_mask,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
    },
    prelude::*,
};

use crate::ml::attention::{AttentionBlock, AttentionBlockConfig};

#[derive(Config, Debug)]
pub struct TemporalModuleConfig {
    pub hidden_size:   usize,
    pub num_heads:     usize,
    pub num_layers:    usize,
    pub ff_size:       usize,
    pub history_steps: usize,
    #[config(default = 0.1)]
    pub dropout:       f64,
}

impl TemporalModuleConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TemporalModule<B> {
        let depth = self.num_layers.max(1);
        let block = AttentionBlockConfig::new(self.hidden_size, self.num_heads, self.ff_size)
            .with_dropout(self.dropout);
        TemporalModule {
            blocks:          (0..depth).map(|_| block.init(device)).collect(),
            step_embeddings: (0..depth)
                .map(|_| EmbeddingConfig::new(self.history_steps, self.hidden_size).init(device))
                .collect(),
            norm:            LayerNormConfig::new(self.hidden_size).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct TemporalModule<B: Backend> {
    pub blocks:          Vec<AttentionBlock<B>>,
    pub step_embeddings: Vec<Embedding<B>>,
    pub norm:            LayerNorm<B>,
}

impl<B: Backend> TemporalModule<B> {
    /// x: [batch, steps, hidden] → [batch, hidden]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch_size, steps, hidden] = x.dims();
        let device = x.device();

        let causal = generate_autoregressive_mask::<B>(batch_size, steps, &device);
        let step_ids = Tensor::<B, 1, Int>::arange(0..steps as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, steps]);

        let mut depth_sum = x.zeros_like();
        let mut h = x;
        for (block, embedding) in self.blocks.iter().zip(self.step_embeddings.iter()) {
            let input = h + embedding.forward(step_ids.clone());
            h = block.forward(input, None, Some(causal.clone()));
            depth_sum = depth_sum + h.clone();
        }
        let depth_avg = depth_sum / self.blocks.len().max(1) as f64;

        let last = depth_avg
            .slice([0..batch_size, steps - 1..steps, 0..hidden])
            .reshape([batch_size, hidden]);
        self.norm.forward(last)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_summary_shape_is_independent_of_depth() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::random([3, 6, 16], Distribution::Normal(0.0, 1.0), &device);
        for layers in [1, 2, 4] {
            let module = TemporalModuleConfig::new(16, 2, layers, 32, 6).init::<TestBackend>(&device);
            assert_eq!(module.blocks.len(), layers);
            assert_eq!(module.forward(x.clone()).dims(), [3, 16]);
        }
    }

    #[test]
    fn test_summary_is_finite() {
        let device = Default::default();
        let module = TemporalModuleConfig::new(8, 2, 2, 16, 4).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 3>::random([2, 4, 8], Distribution::Normal(0.0, 1.0), &device);
        let values = module.forward(x).into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }
}
