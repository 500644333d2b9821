//! `MediaMetadata` — the local cache of a single library item.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::status::ItemType;

/// A credited person (actor or director), as embedded in `MediaMetadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Option<i64>,
    pub name: String,
    pub original_name: Option<String>,
}

impl Person {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            original_name: None,
        }
    }
}

/// Local cache of a single library item, keyed by `(tmdb_id, item_type)`.
///
/// Mutated only by the Library Indexer; `last_synced_at` advances
/// monotonically on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub tmdb_id: String,
    pub item_type: ItemType,
    pub title: String,
    pub original_title: Option<String>,
    pub release_year: Option<i32>,
    pub release_date: Option<NaiveDate>,
    pub date_added: Option<DateTime<Utc>>,
    pub rating: Option<f64>,
    pub genres: Vec<String>,
    pub actors: Vec<Person>,
    pub directors: Vec<Person>,
    pub studios: Vec<String>,
    pub countries: Vec<String>,
    pub tags: Vec<String>,
    pub last_synced_at: DateTime<Utc>,
}

impl MediaMetadata {
    /// Key used everywhere the one-row-per-item invariant is enforced.
    pub fn key(&self) -> (String, ItemType) {
        (self.tmdb_id.clone(), self.item_type)
    }

    pub fn actor_names(&self) -> Vec<&str> {
        self.actors.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn director_names(&self) -> Vec<&str> {
        self.directors.iter().map(|p| p.name.as_str()).collect()
    }
}
