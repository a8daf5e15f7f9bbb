use burn::{
    nn::loss::{MseLoss, Reduction},
    prelude::*,
};

use crate::domain::trajectory::POSITION_DIM;
use crate::ml::encoder::{FeatureEncoder, FeatureEncoderConfig};
use crate::ml::heads::{PredictorHead, PredictorHeadConfig, SafetyScorer, SafetyScorerConfig};
use crate::ml::spatial::{SpatialModule, SpatialModuleConfig};
use crate::ml::temporal::{TemporalModule, TemporalModuleConfig};

// Full architecture: encoder → temporal → spatial → predictor, plus the
// safety scorer on the detached prediction. #[derive(Config)] brings
// Clone + serde with it, so they are not derived again here.
#[derive(Config, Debug)]
pub struct TrajectoryModelConfig {
    pub input_size:         usize,
    pub hidden_size:        usize,
    pub num_heads:          usize,
    pub num_layers:         usize,
    pub num_spatial_layers: usize,
    pub ff_size:            usize,
    pub history_steps:      usize,
    pub prediction_steps:   usize,
    pub map_feature_size:   usize,
    #[config(default = true)]
    pub learned_encoder:    bool,
    #[config(default = 0.1)]
    pub dropout:            f64,
}

impl TrajectoryModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TrajectoryModel<B> {
        TrajectoryModel {
            encoder: FeatureEncoderConfig::new(self.input_size, self.hidden_size)
                .with_learned(self.learned_encoder)
                .init(device),
            temporal: TemporalModuleConfig::new(
                self.hidden_size, self.num_heads, self.num_layers, self.ff_size, self.history_steps,
            )
            .with_dropout(self.dropout)
            .init(device),
            spatial: SpatialModuleConfig::new(
                self.hidden_size, self.num_heads, self.num_spatial_layers, self.ff_size, self.map_feature_size,
            )
            .with_dropout(self.dropout)
            .init(device),
            predictor: PredictorHeadConfig::new(self.hidden_size, self.prediction_steps)
                .with_dropout(self.dropout)
                .init(device),
            safety: SafetyScorerConfig::new(self.prediction_steps, self.hidden_size).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct TrajectoryModel<B: Backend> {
    pub encoder:   FeatureEncoder<B>,
    pub temporal:  TemporalModule<B>,
    pub spatial:   SpatialModule<B>,
    pub predictor: PredictorHead<B>,
    pub safety:    SafetyScorer<B>,
}

/// Model-ready tensors for one batch (all in the ego frame).
#[derive(Debug, Clone)]
pub struct ModelInput<B: Backend> {
    /// [batch, history_steps, input_size]
    pub history:       Tensor<B, 3>,
    /// [batch, max_neighbors, 6]
    pub neighbors:     Tensor<B, 3>,
    /// [batch, max_neighbors], true = padding
    pub neighbor_mask: Tensor<B, 2, Bool>,
    /// [batch, max_map_elements, map_feature_size]
    pub map:           Tensor<B, 3>,
    /// [batch, max_map_elements], true = padding
    pub map_mask:      Tensor<B, 2, Bool>,
}

pub struct ModelOutput<B: Backend> {
    /// [batch, prediction_steps, 6]
    pub trajectory: Tensor<B, 3>,
    /// [batch]
    pub safety:     Tensor<B, 1>,
}

/// Weights of the two objectives plus the error scale of the safety target.
#[derive(Debug, Clone, Copy)]
pub struct LossSettings {
    pub alpha:            f64,
    pub beta:             f64,
    /// ADE (model units) at which the safety target drops to 1/e.
    pub safety_tolerance: f64,
}

pub struct LossOutput<B: Backend> {
    pub loss:            Tensor<B, 1>,
    pub trajectory_loss: Tensor<B, 1>,
    pub safety_loss:     Tensor<B, 1>,
    /// Per-sample safety target, exp(-ADE / tolerance).
    pub safety_target:   Tensor<B, 1>,
    pub output:          ModelOutput<B>,
}

impl<B: Backend> TrajectoryModel<B> {
    pub fn forward(&self, input: ModelInput<B>) -> ModelOutput<B> {
        let encoded  = self.encoder.forward(input.history);
        let temporal = self.temporal.forward(encoded);
        let spatial  = self.spatial.forward(
            temporal.clone(),
            input.neighbors,
            input.neighbor_mask,
            input.map,
            input.map_mask,
        );
        let trajectory = self.predictor.forward(temporal, spatial);
        let safety     = self.safety.forward(trajectory.clone().detach());
        ModelOutput { trajectory, safety }
    }

    /// Loss = α · MSE(trajectory, future) + β · MSE(safety, exp(-ADE / tolerance))
    ///
    /// The safety target comes from the detached prediction error, so it is
    /// a constant as far as gradients are concerned.
    pub fn forward_loss(
        &self,
        input:    ModelInput<B>,
        future:   Tensor<B, 3>,
        settings: &LossSettings,
    ) -> LossOutput<B> {
        let output = self.forward(input);
        let mse = MseLoss::new();

        let trajectory_loss = mse.forward(output.trajectory.clone(), future.clone(), Reduction::Mean);

        let (ade, _) = displacement_errors(output.trajectory.clone().detach(), future);
        let safety_target = (ade.neg() / settings.safety_tolerance).exp();
        let safety_loss = mse.forward(output.safety.clone(), safety_target.clone(), Reduction::Mean);

        let loss = trajectory_loss.clone() * settings.alpha + safety_loss.clone() * settings.beta;
        LossOutput { loss, trajectory_loss, safety_loss, safety_target, output }
    }
}

/// Per-sample (ADE, FDE) over the position components.
/// predicted, future: [B, P, 6] → ([B], [B])
pub fn displacement_errors<B: Backend>(
    predicted: Tensor<B, 3>,
    future:    Tensor<B, 3>,
) -> (Tensor<B, 1>, Tensor<B, 1>) {
    let [batch_size, steps, _] = predicted.dims();
    let diff = (predicted - future).slice([0..batch_size, 0..steps, 0..POSITION_DIM]);
    let dist = diff.powf_scalar(2.0).sum_dim(2).sqrt(); // [B, P, 1]

    let ade = dist.clone().mean_dim(1).reshape([batch_size]);
    let fde = dist.slice([0..batch_size, steps - 1..steps, 0..1]).reshape([batch_size]);
    (ade, fde)
}
