//! Repository contracts — the seam between the engine and persistence.

pub mod repositories;

pub use repositories::*;
