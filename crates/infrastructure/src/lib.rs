//! Postgres-backed implementations of the repository traits defined in
//! `reconciler-core`.

pub mod database;
pub mod error;
pub mod repositories;

pub use database::*;
pub use error::*;
pub use repositories::*;
