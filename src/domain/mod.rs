// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing what the system
// works with: trajectory records, inference requests/results, the
// error taxonomy, and the abstractions other layers implement.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only data, validation and traits

pub mod error;

// Trajectory records and kinematic state vectors
pub mod trajectory;

// Inference request / response types
pub mod prediction;

// Core abstractions (traits) that other layers implement
pub mod traits;
