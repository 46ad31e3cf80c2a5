// ── Jarvis Atoms Layer ─────────────────────────────────────────────────────
// Pure constants, data types and the error enum - zero side effects, no I/O.
// Dependency rule: atoms may only depend on std and external pure crates.
// Nothing here may import from engine/.

pub mod constants;
pub mod error;
pub mod types;
