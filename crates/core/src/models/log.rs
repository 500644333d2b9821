//! `ProcessedLog` / `FailedLog` — operational logs keyed by item id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedLogEntry {
    pub item_id: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedLogEntry {
    pub item_id: String,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}
