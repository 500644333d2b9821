//! Repository traits for every persisted entity family (§4.1, §6).
//!
//! Each trait is implemented against Postgres in `reconciler-infrastructure`;
//! every other component depends on the trait object, never the concrete
//! pool, so tests substitute in-memory fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

/// Typed access to `media_metadata`. Exclusively owned by the Library
/// Indexer for writes; read by every other component.
#[async_trait]
pub trait MediaMetadataRepository: Send + Sync {
    async fn find(&self, tmdb_id: &str, item_type: ItemType) -> Result<Option<MediaMetadata>>;

    async fn find_many(&self, item_types: &[ItemType]) -> Result<Vec<MediaMetadata>>;

    /// All `(tmdb_id, item_type)` keys for the given item types, used by
    /// the indexer's diff computation.
    async fn all_keys(&self, item_types: &[ItemType]) -> Result<Vec<(String, ItemType)>>;

    /// INSERT … ON CONFLICT DO UPDATE for a whole batch, one transaction.
    async fn upsert_batch(&self, batch: &[MediaMetadata]) -> Result<()>;

    /// Deletes in chunks of at most 500 ids, as required by §4.2.
    async fn delete_batch(&self, keys: &[(String, ItemType)]) -> Result<()>;
}

/// Typed access to `person_identity_map`.
#[async_trait]
pub trait PersonIdentityRepository: Send + Sync {
    async fn upsert_person(&self, fields: &PersonIdentityFields) -> Result<UpsertPersonOutcome>;

    async fn find_by_any_id(
        &self,
        fields: &PersonIdentityFields,
    ) -> Result<Option<PersonIdentity>>;
}

/// Typed access to `translation_cache`, implementing the merge-priority
/// and self-purge-on-read rules of §3/§4.1.
#[async_trait]
pub trait TranslationCacheRepository: Send + Sync {
    async fn save_translation(
        &self,
        original: &str,
        translated: &str,
        engine: TranslationEngine,
    ) -> Result<()>;

    /// Returns `None` both on a genuine cache miss and after purging an
    /// entry that fails the target-script check.
    async fn get_translation(&self, original: &str) -> Result<Option<TranslationCacheEntry>>;
}

/// Typed access to `custom_collections` and `collections_info`.
#[async_trait]
pub trait CollectionRepository: Send + Sync {
    async fn list_active(&self) -> Result<Vec<CustomCollection>>;

    async fn get(&self, id: i64) -> Result<Option<CustomCollection>>;

    /// Atomically replaces the snapshot and health fields for a collection.
    async fn persist_snapshot(
        &self,
        id: i64,
        emby_collection_id: Option<&str>,
        snapshot: &[SnapshotItem],
    ) -> Result<()>;

    async fn list_native_collections(&self) -> Result<Vec<NativeCollection>>;

    async fn persist_native_snapshot(
        &self,
        emby_collection_id: &str,
        snapshot: &[SnapshotItem],
    ) -> Result<()>;

    /// Scans active `list`-type collections, flips the snapshot row whose
    /// `tmdb_id` matches to `IN_LIBRARY`, recomputes health, and returns
    /// the affected `(emby_collection_id, name)` pairs. One transaction.
    async fn match_and_update_list_collections_on_item_add(
        &self,
        tmdb_id: &str,
        item_type: ItemType,
    ) -> Result<Vec<(String, String)>>;

    /// Bulk `missing -> subscribed` flip inside native collection
    /// snapshots, without contacting the downloader.
    async fn batch_mark_movies_as_subscribed_in_collections(
        &self,
        tmdb_ids: &[String],
    ) -> Result<()>;
}

/// Typed access to `watchlist`.
#[async_trait]
pub trait WatchlistRepository: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Watchlist>>;

    async fn find_by_tmdb_id(&self, tmdb_id: &str) -> Result<Option<Watchlist>>;

    async fn upsert(&self, entry: &Watchlist) -> Result<()>;

    async fn persist_missing_seasons(
        &self,
        item_id: &str,
        missing_seasons: &[MissingSeason],
    ) -> Result<()>;
}

/// Typed access to `actor_subscriptions` and `tracked_actor_media`.
#[async_trait]
pub trait ActorSubscriptionRepository: Send + Sync {
    async fn list_active(&self) -> Result<Vec<ActorSubscription>>;

    async fn tracked_media(&self, subscription_id: i64) -> Result<Vec<TrackedActorMedia>>;

    /// Applies inserts/updates/deletes for one subscription's filmography
    /// diff in a single transaction, then marks the subscription idle.
    async fn apply_diff(
        &self,
        subscription_id: i64,
        insert: &[TrackedActorMedia],
        update: &[TrackedActorMedia],
        delete: &[String],
    ) -> Result<()>;
}
