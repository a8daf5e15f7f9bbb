// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Persistence concerns used by more than one layer:
//
//   checkpoint.rs — integrity-checked model checkpoints
//                   (BLAKE3 hash, JSON header with the full
//                   config, burn binary record) plus the
//                   latest / best epoch pointers
//
//   metrics.rs    — per-epoch metrics sinks (CSV file,
//                   in-memory)
//
// Reference: Burn Book §5 (Checkpointing)

/// Model checkpoint saving, verification and loading
pub mod checkpoint;

/// Training metrics sinks
pub mod metrics;
