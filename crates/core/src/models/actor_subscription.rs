//! `ActorSubscription` and its child `TrackedActorMedia`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{ItemType, MediaStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorSubscriptionStatus {
    Active,
    Idle,
}

/// Per-actor filter config (§4.6). `min_rating` gates on TMDb's
/// `vote_average`, bypassed for releases inside the grace window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorFilterConfig {
    pub start_year: Option<i32>,
    pub media_types: Vec<ItemType>,
    pub genres_include: Vec<String>,
    pub genres_exclude: Vec<String>,
    pub min_rating: Option<f64>,
}

impl Default for ActorFilterConfig {
    fn default() -> Self {
        Self {
            start_year: None,
            media_types: vec![ItemType::Movie, ItemType::Series],
            genres_include: Vec::new(),
            genres_exclude: Vec::new(),
            min_rating: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorSubscription {
    pub id: i64,
    pub tmdb_person_id: i64,
    pub display_name: String,
    pub status: ActorSubscriptionStatus,
    pub filter_config: ActorFilterConfig,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl ActorSubscription {
    pub fn is_active(&self) -> bool {
        self.status == ActorSubscriptionStatus::Active
    }
}

/// A single tracked work in an actor's filmography.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedActorMedia {
    pub subscription_id: i64,
    pub tmdb_media_id: String,
    pub item_type: ItemType,
    pub title: String,
    pub release_date: Option<chrono::NaiveDate>,
    pub status: MediaStatus,
}
