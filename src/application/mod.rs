// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: each use case wires the data,
// ml and infra layers together for one command. No model math
// and no printing here; errors are wrapped in anyhow with the
// context a user needs (which file, which directory).
//
// Reference: Clean Architecture pattern

/// Load → split → train → checkpoint
pub mod train_use_case;

/// Open a verified checkpoint and serve one request
pub mod predict_use_case;

/// Write a synthetic JSONL dataset
pub mod synth_use_case;
