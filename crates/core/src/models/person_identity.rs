//! `PersonIdentityMap` — canonical identity across Emby/TMDb/IMDb/Douban.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonIdentity {
    pub map_id: i64,
    pub primary_name: String,
    pub emby_person_id: Option<String>,
    pub tmdb_person_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub douban_id: Option<String>,
    pub last_updated_at: DateTime<Utc>,
}

/// The subset of identifying fields a caller supplies to `upsert_person`.
/// Any field left `None` is simply not matched on or written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonIdentityFields {
    pub primary_name: Option<String>,
    pub emby_person_id: Option<String>,
    pub tmdb_person_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub douban_id: Option<String>,
}

impl PersonIdentityFields {
    /// Non-null `(column, value)` pairs, used to probe for an existing
    /// row by any available identifier.
    pub fn id_columns(&self) -> Vec<(&'static str, String)> {
        let mut cols = Vec::new();
        if let Some(v) = &self.emby_person_id {
            cols.push(("emby_person_id", v.clone()));
        }
        if let Some(v) = &self.tmdb_person_id {
            cols.push(("tmdb_person_id", v.to_string()));
        }
        if let Some(v) = &self.imdb_id {
            cols.push(("imdb_id", v.clone()));
        }
        if let Some(v) = &self.douban_id {
            cols.push(("douban_id", v.clone()));
        }
        cols
    }
}

/// Outcome of an `upsert_person` call, distinguishing a clean merge from
/// the same-name-different-person guard rejecting it.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertPersonOutcome {
    /// `map_id` was created or updated in place with the supplied fields.
    Merged { map_id: i64 },
    /// An ID column would have collided with a different existing row;
    /// a new row was created instead and its id returned.
    ConflictCreatedNew { map_id: i64, conflicting_map_id: i64 },
}

impl UpsertPersonOutcome {
    pub fn map_id(&self) -> i64 {
        match self {
            Self::Merged { map_id } | Self::ConflictCreatedNew { map_id, .. } => *map_id,
        }
    }
}
