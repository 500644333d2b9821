//! `Watchlist` — tracked series and their missing seasons.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum WatchlistStatus {
    Watching,
    Paused,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingSeason {
    pub season_number: i32,
    pub air_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watchlist {
    pub item_id: String,
    pub tmdb_id: String,
    pub status: WatchlistStatus,
    pub force_ended: bool,
    pub paused_until: Option<DateTime<Utc>>,
    pub missing_seasons: Vec<MissingSeason>,
}

impl Watchlist {
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            WatchlistStatus::Watching | WatchlistStatus::Paused
        ) && !self.force_ended
    }
}
