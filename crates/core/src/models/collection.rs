//! `CustomCollection` and `NativeCollection` — the two snapshot hosts
//! driven by the Collection Reconciler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{HealthStatus, ItemType, SnapshotItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    List,
    Filter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Active,
    Paused,
}

/// A single `{field, operator, value}` rule as it appears on the wire,
/// before being compiled into a `crate::filter::FieldRule`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRule {
    pub field: String,
    pub operator: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleLogic {
    And,
    Or,
}

/// `type = filter` collection definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    pub item_type: Vec<ItemType>,
    pub logic: RuleLogic,
    pub rules: Vec<RawRule>,
}

/// `type = list` collection definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListDefinition {
    pub item_type: Vec<ItemType>,
    pub url: String,
    pub limit: Option<usize>,
}

/// The opaque definition blob, tagged by `CustomCollection::collection_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CollectionDefinition {
    Filter(FilterDefinition),
    List(ListDefinition),
}

impl CollectionDefinition {
    pub fn item_types(&self) -> &[ItemType] {
        match self {
            Self::Filter(d) => &d.item_type,
            Self::List(d) => &d.item_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCollection {
    pub id: i64,
    pub name: String,
    pub collection_type: CollectionType,
    pub definition: CollectionDefinition,
    pub status: CollectionStatus,
    pub sort_order: i32,
    pub emby_collection_id: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub in_library_count: i64,
    pub missing_count: i64,
    pub health_status: HealthStatus,
    pub generated_media_info: Vec<SnapshotItem>,
}

impl CustomCollection {
    pub fn is_active(&self) -> bool {
        self.status == CollectionStatus::Active
    }

    /// Previously `SUBSCRIBED` tmdb ids, used by the classifier's
    /// sticky-status rule.
    pub fn previously_subscribed_ids(&self) -> std::collections::HashSet<&str> {
        self.generated_media_info
            .iter()
            .filter(|item| item.status == super::status::MediaStatus::Subscribed)
            .map(|item| item.tmdb_id.as_str())
            .collect()
    }
}

/// Shadow of a native TMDb-franchise collection discovered on the server.
/// Movies only; `missing_movies` uses the same snapshot shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeCollection {
    pub emby_collection_id: String,
    pub tmdb_collection_id: i64,
    pub in_library_count: i64,
    pub has_missing: bool,
    pub missing_movies: Vec<SnapshotItem>,
}
