//! The status value used throughout every persisted snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification assigned to a single candidate item during a reconcile
/// pass. Ordered by precedence rank: a lower rank wins when more than one
/// condition could apply (see `classification::classify`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaStatus {
    InLibrary,
    Subscribed,
    PendingRelease,
    Missing,
}

impl MediaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InLibrary => "in_library",
            Self::Subscribed => "subscribed",
            Self::PendingRelease => "pending_release",
            Self::Missing => "missing",
        }
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_library" => Ok(Self::InLibrary),
            "subscribed" => Ok(Self::Subscribed),
            "pending_release" => Ok(Self::PendingRelease),
            "missing" => Ok(Self::Missing),
            other => Err(format!("unknown media status: {other}")),
        }
    }
}

/// `Movie` or `Series`, the two item types the engine ever tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ItemType {
    Movie,
    Series,
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie => write!(f, "Movie"),
            Self::Series => write!(f, "Series"),
        }
    }
}

impl std::str::FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Movie" | "movie" => Ok(Self::Movie),
            "Series" | "series" | "tv" | "TV" => Ok(Self::Series),
            other => Err(format!("unknown item type: {other}")),
        }
    }
}

/// One entry in a `generated_media_info` / `missing_movies` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub tmdb_id: String,
    pub item_type: ItemType,
    pub title: String,
    pub release_date: Option<chrono::NaiveDate>,
    pub poster_path: Option<String>,
    pub status: MediaStatus,
}

impl SnapshotItem {
    /// The `"{type}-{id}"` dedup key used by the List Importer and by
    /// session-scoped dedup in the actor reconciler.
    pub fn dedup_key(item_type: ItemType, tmdb_id: &str) -> String {
        format!("{item_type}-{tmdb_id}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    HasMissing,
}

impl HealthStatus {
    pub fn from_missing_count(missing_count: i64) -> Self {
        if missing_count > 0 {
            Self::HasMissing
        } else {
            Self::Ok
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::HasMissing => write!(f, "has_missing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_matches_missing_count() {
        assert_eq!(HealthStatus::from_missing_count(0), HealthStatus::Ok);
        assert_eq!(
            HealthStatus::from_missing_count(3),
            HealthStatus::HasMissing
        );
    }

    #[test]
    fn dedup_key_matches_type_and_id() {
        assert_eq!(
            SnapshotItem::dedup_key(ItemType::Movie, "603"),
            "Movie-603"
        );
    }

    #[test]
    fn media_status_round_trips_through_str() {
        for status in [
            MediaStatus::InLibrary,
            MediaStatus::Subscribed,
            MediaStatus::PendingRelease,
            MediaStatus::Missing,
        ] {
            let parsed: MediaStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
