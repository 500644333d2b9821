//! Core domain models and business logic for the collection reconciler.
//!
//! This crate contains the entities, repository contracts, and the two
//! pure algorithms (filter evaluation, status classification) shared by
//! every higher-level component.

pub mod classification;
pub mod domain;
pub mod error;
pub mod filter;
pub mod models;

pub use error::{ReconcileError, Result};
pub use models::*;
