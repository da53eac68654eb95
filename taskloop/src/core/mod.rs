//! Pure, deterministic core logic.
//!
//! Everything here is side-effect free: task transitions, selection, progress
//! derivation, validation, and iteration scheduling.

pub mod failures;
pub mod invariants;
pub mod progress;
pub mod scheduler;
pub mod selector;
pub mod state;
pub mod types;
