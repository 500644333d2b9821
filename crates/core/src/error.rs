//! Error kinds for the reconciliation engine.
//!
//! Variants map onto the policy table of the error-handling design: each
//! kind carries exactly the context a caller needs to decide whether to
//! skip an item, abort a batch, or bubble up to the task runner.

use thiserror::Error;

#[cfg(feature = "postgres")]
use sqlx;

#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Network timeout or 5xx from TMDb/Emby/the downloader. Callers fail
    /// the single item and continue inside a batch; outside a batch the
    /// task runner records a terminal `-1` progress value.
    #[error("transient external error calling {service}: {message}")]
    TransientExternal { service: String, message: String },

    /// Unparseable RSS, malformed TMDb response, or a missing required
    /// field. The offending item is dropped; the task continues.
    #[error("contract violation from {source}: {message}")]
    ContractViolation { source: String, message: String },

    /// A required configuration value (e.g. a TMDb API key) is absent.
    /// The task aborts before any mutation.
    #[error("missing configuration: {field}")]
    ConfigMissing { field: String },

    /// Cooperative cancellation requested by the caller. Work already
    /// committed before the checkpoint stays committed.
    #[error("task cancelled")]
    Cancelled,

    /// The database (or another indispensable dependency) is unavailable.
    /// Always bubbles up; the task fails.
    #[error("fatal error: {message}")]
    Fatal { message: String },
}

impl ReconcileError {
    pub fn transient(service: impl Into<String>, message: impl ToString) -> Self {
        Self::TransientExternal {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn contract_violation(source: impl Into<String>, message: impl ToString) -> Self {
        Self::ContractViolation {
            source: source.into(),
            message: message.to_string(),
        }
    }

    pub fn config_missing(field: impl Into<String>) -> Self {
        Self::ConfigMissing {
            field: field.into(),
        }
    }

    /// True for error kinds whose policy is "log and keep going" rather
    /// than aborting the enclosing task.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TransientExternal { .. } | Self::ContractViolation { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for ReconcileError {
    fn from(err: sqlx::Error) -> Self {
        ReconcileError::Fatal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ReconcileError {
    fn from(err: serde_json::Error) -> Self {
        ReconcileError::ContractViolation {
            source: "json_data".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ReconcileError {
    fn from(err: reqwest::Error) -> Self {
        let service = err
            .url()
            .map(|u| u.host_str().unwrap_or("unknown").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        ReconcileError::TransientExternal {
            service,
            message: err.to_string(),
        }
    }
}
