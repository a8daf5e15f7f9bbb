// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All architecture, training and serving code built on Burn.
//
//   encoder.rs    — identity or learned per-step feature lift
//   attention.rs  — shared transformer block (MHA + GELU FFN)
//   temporal.rs   — causal attention over the ego history
//   spatial.rs    — graph attention over neighbours + map
//   heads.rs      — trajectory predictor and safety scorer
//   model.rs      — full model + multi-objective loss
//   schedule.rs   — warmup + cosine learning-rate schedule
//   trainer.rs    — epoch loop, validation, checkpointing
//   inferencer.rs — verified-checkpoint serving with safety gate
//   backend.rs    — ndarray (default) / wgpu backend aliases
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need

pub mod backend;

pub mod attention;

/// Per-step feature encoder
pub mod encoder;

/// Causal temporal attention stack
pub mod temporal;

/// Ego-centred graph attention over scene context
pub mod spatial;

/// Trajectory predictor and safety scorer heads
pub mod heads;

/// Full trajectory model architecture
pub mod model;

pub mod schedule;

/// Full training loop with validation and checkpointing
pub mod trainer;

/// Inference service: loads a checkpoint and serves gated predictions
pub mod inferencer;
