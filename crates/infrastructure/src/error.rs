//! Infrastructure-level errors, converted into `ReconcileError` at the
//! repository boundary so the engine never sees `sqlx`/`serde_json` types.

use reconciler_core::ReconcileError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<InfrastructureError> for ReconcileError {
    fn from(err: InfrastructureError) -> Self {
        match err {
            InfrastructureError::Database(sqlx_err) => ReconcileError::Fatal {
                message: sqlx_err.to_string(),
            },
            InfrastructureError::Pool(msg) => ReconcileError::Fatal { message: msg },
            InfrastructureError::Migration(msg) => ReconcileError::Fatal { message: msg },
            InfrastructureError::Serialization(err) => ReconcileError::ContractViolation {
                source: "json_data".to_string(),
                message: err.to_string(),
            },
        }
    }
}
