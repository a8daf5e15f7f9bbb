// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between raw trajectory files and backend tensor
// batches.
//
//   .json / .jsonl records  (or SyntheticGenerator)
//       │
//       ▼
//   JsonTrajectoryLoader  → parses + validates records
//       │
//       ▼
//   split_train_val       → seeded train / validation split
//       │
//       ▼
//   TrajectoryDataset     → Burn Dataset; augments, then
//       │                   Preprocessor → ego frame sample
//       ▼
//   TrajectoryBatcher     → pads, masks and stacks tensors
//       │
//       ▼
//   DataLoader            → feeds batches to the trainer
//
// The serving path reuses Preprocessor + TrajectoryBatcher so
// requests see exactly the transform training used.

/// Reads .json / .jsonl trajectory files
pub mod loader;

/// Seeded kinematic generator for demos and tests
pub mod synthetic;

/// Stochastic record augmentation
pub mod augment;

/// Ego-frame normalisation shared by training and serving
pub mod preprocessor;

/// Implements Burn's Dataset trait for trajectory samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
