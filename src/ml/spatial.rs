// ============================================================
// Layer 5 — Spatial Module
// ============================================================
// Graph attention over the scene around the ego agent.
//
// Nodes (one fully connected graph per sample):
//   [ ego | neighbour_1 … neighbour_N | map_1 … map_M ]
//
//   ego node        = temporal summary
//   neighbour nodes = Linear(6 → hidden) of each neighbour state
//   map nodes       = Linear(map_feature_size → hidden)
//
// Padded neighbour / map slots are masked out of attention; the
// ego node is never masked. Non-ego nodes get no positional
// signal, so the ego node's output is invariant to the order in
// which neighbours and map elements arrive.
//
//   → [batch, hidden] (the ego node after the last block)

use burn::{
    nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig},
    prelude::*,
};

use crate::domain::trajectory::STATE_DIM;
use crate::ml::attention::{AttentionBlock, AttentionBlockConfig};

#[derive(Config, Debug)]
pub struct SpatialModuleConfig {
    pub hidden_size:      usize,
    pub num_heads:        usize,
    pub num_layers:       usize,
    pub ff_size:          usize,
    pub map_feature_size: usize,
    #[config(default = 0.1)]
    pub dropout:          f64,
}

impl SpatialModuleConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SpatialModule<B> {
        let block = AttentionBlockConfig::new(self.hidden_size, self.num_heads, self.ff_size)
            .with_dropout(self.dropout);
        SpatialModule {
            neighbor_proj: LinearConfig::new(STATE_DIM, self.hidden_size).init(device),
            map_proj:      LinearConfig::new(self.map_feature_size, self.hidden_size).init(device),
            blocks:        (0..self.num_layers).map(|_| block.init(device)).collect(),
            norm:          LayerNormConfig::new(self.hidden_size).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct SpatialModule<B: Backend> {
    pub neighbor_proj: Linear<B>,
    pub map_proj:      Linear<B>,
    pub blocks:        Vec<AttentionBlock<B>>,
    pub norm:          LayerNorm<B>,
}

impl<B: Backend> SpatialModule<B> {
    /// ego: [B, hidden], neighbors: [B, N, 6], map: [B, M, F],
    /// masks: [B, N] / [B, M] with true = padding.
    pub fn forward(
        &self,
        ego:           Tensor<B, 2>,
        neighbors:     Tensor<B, 3>,
        neighbor_mask: Tensor<B, 2, Bool>,
        map:           Tensor<B, 3>,
        map_mask:      Tensor<B, 2, Bool>,
    ) -> Tensor<B, 2> {
        let [batch_size, hidden] = ego.dims();
        let device = ego.device();

        let nodes = Tensor::cat(
            vec![
                ego.unsqueeze_dim::<3>(1),
                self.neighbor_proj.forward(neighbors),
                self.map_proj.forward(map),
            ],
            1,
        );
        let ego_mask = Tensor::<B, 2, Int>::zeros([batch_size, 1], &device).equal_elem(1);
        let pad_mask = Tensor::cat(vec![ego_mask, neighbor_mask, map_mask], 1);

        let mut x = nodes;
        for block in &self.blocks {
            x = block.forward(x, Some(pad_mask.clone()), None);
        }

        let ego_out = x.slice([0..batch_size, 0..1, 0..hidden]).reshape([batch_size, hidden]);
        self.norm.forward(ego_out)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Distribution, TensorData};

    type TestBackend = burn::backend::NdArray;

    fn mask(pad: Vec<i64>, shape: [usize; 2]) -> Tensor<TestBackend, 2, Bool> {
        Tensor::<TestBackend, 2, Int>::from_data(TensorData::new(pad, shape), &Default::default()).equal_elem(1)
    }

    #[test]
    fn test_output_is_invariant_to_neighbour_order() {
        let device = Default::default();
        let module = SpatialModuleConfig::new(16, 2, 2, 32, 4).init::<TestBackend>(&device);

        let ego = Tensor::<TestBackend, 2>::random([1, 16], Distribution::Normal(0.0, 1.0), &device);
        let rows: Vec<f32> = (0..18).map(|i| (i as f32 * 0.37).sin()).collect();
        let neighbors = Tensor::<TestBackend, 3>::from_data(TensorData::new(rows.clone(), [1, 3, 6]), &device);

        // same three neighbours, reversed
        let mut reversed = Vec::new();
        for n in (0..3).rev() {
            reversed.extend_from_slice(&rows[n * 6..n * 6 + 6]);
        }
        let neighbors_rev = Tensor::<TestBackend, 3>::from_data(TensorData::new(reversed, [1, 3, 6]), &device);

        let map = Tensor::<TestBackend, 3>::random([1, 2, 4], Distribution::Normal(0.0, 1.0), &device);

        let a = module.forward(ego.clone(), neighbors, mask(vec![0; 3], [1, 3]), map.clone(), mask(vec![0; 2], [1, 2]));
        let b = module.forward(ego, neighbors_rev, mask(vec![0; 3], [1, 3]), map, mask(vec![0; 2], [1, 2]));
        let diff = (a - b).abs().max().into_scalar().elem::<f32>();
        assert!(diff < 1e-4, "ego output changed with neighbour order: {diff}");
    }

    #[test]
    fn test_padded_slots_do_not_affect_output() {
        let device = Default::default();
        let module = SpatialModuleConfig::new(8, 2, 1, 16, 4).init::<TestBackend>(&device);
        let ego = Tensor::<TestBackend, 2>::random([1, 8], Distribution::Normal(0.0, 1.0), &device);
        let map = Tensor::<TestBackend, 3>::zeros([1, 1, 4], &device);

        let real = vec![0.5f32, -0.2, 0.0, 0.1, 0.3, 0.0];
        let mut padded_a = real.clone();
        padded_a.extend(vec![0.0; 6]);
        let mut padded_b = real.clone();
        padded_b.extend(vec![9.0; 6]);

        let run = |values: Vec<f32>| {
            module.forward(
                ego.clone(),
                Tensor::from_data(TensorData::new(values, [1, 2, 6]), &device),
                mask(vec![0, 1], [1, 2]),
                map.clone(),
                mask(vec![1], [1, 1]),
            )
        };
        let diff = (run(padded_a) - run(padded_b)).abs().max().into_scalar().elem::<f32>();
        assert!(diff < 1e-4);
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let module = SpatialModuleConfig::new(8, 2, 1, 16, 5).init::<TestBackend>(&device);
        let out = module.forward(
            Tensor::zeros([4, 8], &device),
            Tensor::zeros([4, 3, 6], &device),
            mask(vec![0; 12], [4, 3]),
            Tensor::zeros([4, 2, 5], &device),
            mask(vec![0; 8], [4, 2]),
        );
        assert_eq!(out.dims(), [4, 8]);
    }
}
