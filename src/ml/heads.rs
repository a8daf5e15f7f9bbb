// ============================================================
// Layer 5 — Output Heads
// ============================================================
// PredictorHead : (temporal, spatial) summaries → future states
// SafetyScorer  : predicted trajectory        → score in [0, 1]
//
// The predictor works in the ego-centred, scaled frame; the
// inference service maps its output back to world coordinates.
// The scorer sees the trajectory with gradients detached, so
// its loss never pushes the predictor around.

use burn::{
    nn::{Dropout, DropoutConfig, Initializer, Linear, LinearConfig},
    prelude::*,
    tensor::activation::{gelu, sigmoid},
};

use crate::domain::trajectory::STATE_DIM;

// ─── PredictorHead ────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct PredictorHeadConfig {
    pub hidden_size:      usize,
    pub prediction_steps: usize,
    #[config(default = 0.1)]
    pub dropout:          f64,
}

impl PredictorHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> PredictorHead<B> {
        PredictorHead {
            fuse:             LinearConfig::new(2 * self.hidden_size, self.hidden_size).init(device),
            out:              LinearConfig::new(self.hidden_size, self.prediction_steps * STATE_DIM).init(device),
            dropout:          DropoutConfig::new(self.dropout).init(),
            prediction_steps: self.prediction_steps,
        }
    }
}

#[derive(Module, Debug)]
pub struct PredictorHead<B: Backend> {
    pub fuse:             Linear<B>,
    pub out:              Linear<B>,
    pub dropout:          Dropout,
    pub prediction_steps: usize,
}

impl<B: Backend> PredictorHead<B> {
    /// temporal, spatial: [B, hidden] → [B, prediction_steps, 6]
    pub fn forward(&self, temporal: Tensor<B, 2>, spatial: Tensor<B, 2>) -> Tensor<B, 3> {
        let [batch_size, _] = temporal.dims();
        let fused = Tensor::cat(vec![temporal, spatial], 1);
        let h = self.dropout.forward(gelu(self.fuse.forward(fused)));
        self.out
            .forward(h)
            .reshape([batch_size, self.prediction_steps, STATE_DIM])
    }
}

// ─── SafetyScorer ─────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct SafetyScorerConfig {
    pub prediction_steps: usize,
    pub hidden_size:      usize,
}

impl SafetyScorerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SafetyScorer<B> {
        SafetyScorer {
            hidden: LinearConfig::new(self.prediction_steps * STATE_DIM, self.hidden_size).init(device),
            out:    LinearConfig::new(self.hidden_size, 1).init(device),
        }
    }

    /// A scorer that returns `score` for every input.
    ///
    /// The hidden layer is all zeros (GELU(0) = 0), so the output is the
    /// bias alone, set to logit(score). Used to exercise the safety gate
    /// with a known score.
    pub fn init_pinned<B: Backend>(&self, score: f32, device: &B::Device) -> SafetyScorer<B> {
        let p = score.clamp(1e-6, 1.0 - 1e-6) as f64;
        let logit = (p / (1.0 - p)).ln();
        SafetyScorer {
            hidden: LinearConfig::new(self.prediction_steps * STATE_DIM, self.hidden_size)
                .with_initializer(Initializer::Zeros)
                .init(device),
            out:    LinearConfig::new(self.hidden_size, 1)
                .with_initializer(Initializer::Constant { value: logit })
                .init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct SafetyScorer<B: Backend> {
    pub hidden: Linear<B>,
    pub out:    Linear<B>,
}

impl<B: Backend> SafetyScorer<B> {
    /// trajectory: [B, P, 6] → [B]
    pub fn forward(&self, trajectory: Tensor<B, 3>) -> Tensor<B, 1> {
        let [batch_size, steps, width] = trajectory.dims();
        let flat = trajectory.reshape([batch_size, steps * width]);
        let logits = self.out.forward(gelu(self.hidden.forward(flat)));
        sigmoid(logits).reshape([batch_size])
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_predictor_output_shape() {
        let device = Default::default();
        let head = PredictorHeadConfig::new(8, 5).init::<TestBackend>(&device);
        let t = Tensor::<TestBackend, 2>::random([3, 8], Distribution::Default, &device);
        let s = Tensor::<TestBackend, 2>::random([3, 8], Distribution::Default, &device);
        assert_eq!(head.forward(t, s).dims(), [3, 5, STATE_DIM]);
    }

    #[test]
    fn test_scores_are_probabilities() {
        let device = Default::default();
        let scorer = SafetyScorerConfig::new(4, 8).init::<TestBackend>(&device);
        let traj = Tensor::<TestBackend, 3>::random([6, 4, STATE_DIM], Distribution::Normal(0.0, 10.0), &device);
        let scores = scorer.forward(traj).into_data().to_vec::<f32>().unwrap();
        assert_eq!(scores.len(), 6);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_pinned_scorer_returns_the_pinned_score() {
        let device = Default::default();
        let scorer = SafetyScorerConfig::new(4, 8).init_pinned::<TestBackend>(0.3, &device);
        let traj = Tensor::<TestBackend, 3>::random([2, 4, STATE_DIM], Distribution::Normal(0.0, 3.0), &device);
        for s in scorer.forward(traj).into_data().to_vec::<f32>().unwrap() {
            assert!((s - 0.3).abs() < 1e-5);
        }
    }
}
