// ============================================================
// Layer 5 — Attention Block
// ============================================================
// The transformer block shared by the temporal and spatial
// modules:
//
//   x = LayerNorm(x + Dropout(MHA(x, x, x)))
//   x = LayerNorm(x + Dropout(W2 · GELU(W1 · x)))
//
// Post-norm residuals. The caller decides the masking:
//   - pad mask  [B, S]     true = this key is padding (spatial)
//   - attn mask [B, S, S]  true = position may not be attended (causal)
//
// Reference: Vaswani et al. (2017) Attention Is All You Need

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::gelu,
};

#[derive(Config, Debug)]
pub struct AttentionBlockConfig {
    pub hidden_size: usize,
    pub num_heads:   usize,
    pub ff_size:     usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
}

impl AttentionBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionBlock<B> {
        AttentionBlock {
            self_attn: MultiHeadAttentionConfig::new(self.hidden_size, self.num_heads)
                .with_dropout(self.dropout)
                .init(device),
            ff_in:     LinearConfig::new(self.hidden_size, self.ff_size).init(device),
            ff_out:    LinearConfig::new(self.ff_size, self.hidden_size).init(device),
            norm_attn: LayerNormConfig::new(self.hidden_size).init(device),
            norm_ff:   LayerNormConfig::new(self.hidden_size).init(device),
            dropout:   DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct AttentionBlock<B: Backend> {
    pub self_attn: MultiHeadAttention<B>,
    pub ff_in:     Linear<B>,
    pub ff_out:    Linear<B>,
    pub norm_attn: LayerNorm<B>,
    pub norm_ff:   LayerNorm<B>,
    pub dropout:   Dropout,
}

impl<B: Backend> AttentionBlock<B> {
    /// x: [batch, seq, hidden] → [batch, seq, hidden]
    pub fn forward(
        &self,
        x:         Tensor<B, 3>,
        pad_mask:  Option<Tensor<B, 2, Bool>>,
        attn_mask: Option<Tensor<B, 3, Bool>>,
    ) -> Tensor<B, 3> {
        let mut input = MhaInput::self_attn(x.clone());
        if let Some(mask) = pad_mask {
            input = input.mask_pad(mask);
        }
        if let Some(mask) = attn_mask {
            input = input.mask_attn(mask);
        }
        let attended = self.self_attn.forward(input).context;
        let x = self.norm_attn.forward(x + self.dropout.forward(attended));

        let ff = self.ff_out.forward(gelu(self.ff_in.forward(x.clone())));
        self.norm_ff.forward(x + self.dropout.forward(ff))
    }
}
