//! PostgreSQL implementation of `CollectionRepository`.
//!
//! `custom_collections` stores one row per `CustomCollection`, including its
//! computed snapshot (`generated_media_info` jsonb) and health fields, so a
//! read or write never needs a join. `native_collections` mirrors
//! `NativeCollection` the same way. Snapshot mutation for the two scan
//! operations (`match_and_update_list_collections_on_item_add`,
//! `batch_mark_movies_as_subscribed_in_collections`) is done by reading the
//! jsonb blob, mutating it in Rust, and writing it back inside one
//! transaction per affected row — collection counts are small enough that
//! hand-rolled jsonb SQL surgery isn't worth the complexity.

use async_trait::async_trait;
use chrono::Utc;
use reconciler_core::{
    domain::repositories::CollectionRepository,
    models::{
        CollectionDefinition, CollectionStatus, CollectionType, CustomCollection, HealthStatus,
        ItemType, MediaStatus, NativeCollection, SnapshotItem,
    },
    ReconcileError, Result,
};
use sqlx::Row;

use crate::database::DatabasePool;

const COLLECTION_COLUMNS: &str = "id, name, collection_type, definition, status, sort_order,
                                  emby_collection_id, last_synced_at, in_library_count,
                                  missing_count, health_status, generated_media_info";

pub struct PostgresCollectionRepository {
    pool: DatabasePool,
}

impl PostgresCollectionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> Result<CustomCollection> {
        let collection_type: String = row.try_get("collection_type")?;
        let status: String = row.try_get("status")?;
        let health_status: String = row.try_get("health_status")?;
        let definition: serde_json::Value = row.try_get("definition")?;
        let generated_media_info: serde_json::Value = row.try_get("generated_media_info")?;

        Ok(CustomCollection {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            collection_type: parse_collection_type(&collection_type)?,
            definition: serde_json::from_value::<CollectionDefinition>(definition)?,
            status: parse_collection_status(&status)?,
            sort_order: row.try_get("sort_order")?,
            emby_collection_id: row.try_get("emby_collection_id")?,
            last_synced_at: row.try_get("last_synced_at")?,
            in_library_count: row.try_get("in_library_count")?,
            missing_count: row.try_get("missing_count")?,
            health_status: parse_health_status(&health_status)?,
            generated_media_info: serde_json::from_value::<Vec<SnapshotItem>>(
                generated_media_info,
            )?,
        })
    }

    fn parse_native_row(row: &sqlx::postgres::PgRow) -> Result<NativeCollection> {
        let missing_movies: serde_json::Value = row.try_get("missing_movies")?;
        Ok(NativeCollection {
            emby_collection_id: row.try_get("emby_collection_id")?,
            tmdb_collection_id: row.try_get("tmdb_collection_id")?,
            in_library_count: row.try_get("in_library_count")?,
            has_missing: row.try_get("has_missing")?,
            missing_movies: serde_json::from_value::<Vec<SnapshotItem>>(missing_movies)?,
        })
    }
}

fn parse_collection_type(s: &str) -> Result<CollectionType> {
    match s {
        "list" => Ok(CollectionType::List),
        "filter" => Ok(CollectionType::Filter),
        other => Err(ReconcileError::contract_violation(
            "custom_collections.collection_type",
            format!("unknown type: {other}"),
        )),
    }
}

fn parse_collection_status(s: &str) -> Result<CollectionStatus> {
    match s {
        "active" => Ok(CollectionStatus::Active),
        "paused" => Ok(CollectionStatus::Paused),
        other => Err(ReconcileError::contract_violation(
            "custom_collections.status",
            format!("unknown status: {other}"),
        )),
    }
}

fn parse_health_status(s: &str) -> Result<HealthStatus> {
    match s {
        "ok" => Ok(HealthStatus::Ok),
        "has_missing" => Ok(HealthStatus::HasMissing),
        other => Err(ReconcileError::contract_violation(
            "custom_collections.health_status",
            format!("unknown health status: {other}"),
        )),
    }
}

fn snapshot_counts(snapshot: &[SnapshotItem]) -> (i64, i64, HealthStatus) {
    let in_library = snapshot
        .iter()
        .filter(|i| i.status == MediaStatus::InLibrary)
        .count() as i64;
    let missing = snapshot
        .iter()
        .filter(|i| i.status == MediaStatus::Missing)
        .count() as i64;
    (in_library, missing, HealthStatus::from_missing_count(missing))
}

#[async_trait]
impl CollectionRepository for PostgresCollectionRepository {
    async fn list_active(&self) -> Result<Vec<CustomCollection>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM custom_collections
             WHERE status = 'active' ORDER BY sort_order ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn get(&self, id: i64) -> Result<Option<CustomCollection>> {
        let row = sqlx::query(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM custom_collections WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn persist_snapshot(
        &self,
        id: i64,
        emby_collection_id: Option<&str>,
        snapshot: &[SnapshotItem],
    ) -> Result<()> {
        let (in_library_count, missing_count, health_status) = snapshot_counts(snapshot);
        let snapshot_json = serde_json::to_value(snapshot)?;

        sqlx::query(
            "UPDATE custom_collections SET
                 emby_collection_id = COALESCE($2, emby_collection_id),
                 generated_media_info = $3,
                 in_library_count = $4,
                 missing_count = $5,
                 health_status = $6,
                 last_synced_at = $7
             WHERE id = $1",
        )
        .bind(id)
        .bind(emby_collection_id)
        .bind(&snapshot_json)
        .bind(in_library_count)
        .bind(missing_count)
        .bind(health_status.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_native_collections(&self) -> Result<Vec<NativeCollection>> {
        let rows = sqlx::query(
            "SELECT emby_collection_id, tmdb_collection_id, in_library_count, has_missing, missing_movies
             FROM native_collections",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_native_row).collect()
    }

    async fn persist_native_snapshot(
        &self,
        emby_collection_id: &str,
        snapshot: &[SnapshotItem],
    ) -> Result<()> {
        let in_library_count = snapshot
            .iter()
            .filter(|i| i.status == MediaStatus::InLibrary)
            .count() as i64;
        let missing_movies: Vec<&SnapshotItem> = snapshot
            .iter()
            .filter(|i| i.status == MediaStatus::Missing)
            .collect();
        let has_missing = !missing_movies.is_empty();
        let missing_movies_json = serde_json::to_value(&missing_movies)?;

        sqlx::query(
            "UPDATE native_collections SET
                 in_library_count = $2,
                 has_missing = $3,
                 missing_movies = $4
             WHERE emby_collection_id = $1",
        )
        .bind(emby_collection_id)
        .bind(in_library_count)
        .bind(has_missing)
        .bind(&missing_movies_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn match_and_update_list_collections_on_item_add(
        &self,
        tmdb_id: &str,
        item_type: ItemType,
    ) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM custom_collections
             WHERE status = 'active' AND collection_type = 'list'"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut affected = Vec::new();
        for row in &rows {
            let mut collection = Self::parse_row(row)?;
            let Some(emby_collection_id) = collection.emby_collection_id.clone() else {
                continue;
            };

            let mut changed = false;
            for item in collection.generated_media_info.iter_mut() {
                if item.tmdb_id == tmdb_id
                    && item.item_type == item_type
                    && item.status != MediaStatus::InLibrary
                {
                    item.status = MediaStatus::InLibrary;
                    changed = true;
                }
            }

            if changed {
                self.persist_snapshot(
                    collection.id,
                    Some(&emby_collection_id),
                    &collection.generated_media_info,
                )
                .await?;
                affected.push((emby_collection_id, collection.name));
            }
        }

        Ok(affected)
    }

    async fn batch_mark_movies_as_subscribed_in_collections(
        &self,
        tmdb_ids: &[String],
    ) -> Result<()> {
        if tmdb_ids.is_empty() {
            return Ok(());
        }

        let rows = sqlx::query(
            "SELECT emby_collection_id, tmdb_collection_id, in_library_count, has_missing, missing_movies
             FROM native_collections",
        )
        .fetch_all(&self.pool)
        .await?;

        for row in &rows {
            let native = Self::parse_native_row(row)?;
            let mut missing_movies = native.missing_movies.clone();
            let mut changed = false;
            for item in missing_movies.iter_mut() {
                if tmdb_ids.iter().any(|id| id == &item.tmdb_id)
                    && item.status == MediaStatus::Missing
                {
                    item.status = MediaStatus::Subscribed;
                    changed = true;
                }
            }

            if changed {
                let has_missing = missing_movies
                    .iter()
                    .any(|i| i.status == MediaStatus::Missing);
                let missing_movies_json = serde_json::to_value(&missing_movies)?;

                sqlx::query(
                    "UPDATE native_collections SET has_missing = $2, missing_movies = $3
                     WHERE emby_collection_id = $1",
                )
                .bind(&native.emby_collection_id)
                .bind(has_missing)
                .bind(&missing_movies_json)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }
}
