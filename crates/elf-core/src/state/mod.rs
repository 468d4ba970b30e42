//! Architectural CPU state model primitives.

/// Register file and flag storage.
pub mod registers;
/// Host-observable machine states.
pub mod run_state;

pub use registers::{RegisterFile, GENERAL_REGISTER_COUNT};
pub use run_state::RunState;
