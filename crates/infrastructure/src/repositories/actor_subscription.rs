//! PostgreSQL implementation of `ActorSubscriptionRepository`.

use async_trait::async_trait;
use chrono::Utc;
use reconciler_core::{
    domain::repositories::ActorSubscriptionRepository,
    models::{
        ActorFilterConfig, ActorSubscription, ActorSubscriptionStatus, ItemType, MediaStatus,
        TrackedActorMedia,
    },
    ReconcileError, Result,
};
use sqlx::Row;

use crate::database::DatabasePool;

const SUBSCRIPTION_COLUMNS: &str =
    "id, tmdb_person_id, display_name, status, filter_config, last_checked_at";
const TRACKED_COLUMNS: &str = "subscription_id, tmdb_media_id, item_type, title, release_date, status";

pub struct PostgresActorSubscriptionRepository {
    pool: DatabasePool,
}

impl PostgresActorSubscriptionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn parse_subscription_row(row: &sqlx::postgres::PgRow) -> Result<ActorSubscription> {
        let status: String = row.try_get("status")?;
        let filter_config: serde_json::Value = row.try_get("filter_config")?;
        Ok(ActorSubscription {
            id: row.try_get("id")?,
            tmdb_person_id: row.try_get("tmdb_person_id")?,
            display_name: row.try_get("display_name")?,
            status: parse_subscription_status(&status)?,
            filter_config: serde_json::from_value::<ActorFilterConfig>(filter_config)?,
            last_checked_at: row.try_get("last_checked_at")?,
        })
    }

    fn parse_tracked_row(row: &sqlx::postgres::PgRow) -> Result<TrackedActorMedia> {
        let item_type: String = row.try_get("item_type")?;
        let status: String = row.try_get("status")?;
        Ok(TrackedActorMedia {
            subscription_id: row.try_get("subscription_id")?,
            tmdb_media_id: row.try_get("tmdb_media_id")?,
            item_type: item_type
                .parse::<ItemType>()
                .map_err(|e| ReconcileError::contract_violation("tracked_actor_media.item_type", e))?,
            title: row.try_get("title")?,
            release_date: row.try_get("release_date")?,
            status: status
                .parse::<MediaStatus>()
                .map_err(|e| ReconcileError::contract_violation("tracked_actor_media.status", e))?,
        })
    }
}

fn parse_subscription_status(s: &str) -> Result<ActorSubscriptionStatus> {
    match s {
        "active" => Ok(ActorSubscriptionStatus::Active),
        "idle" => Ok(ActorSubscriptionStatus::Idle),
        other => Err(ReconcileError::contract_violation(
            "actor_subscriptions.status",
            format!("unknown status: {other}"),
        )),
    }
}

#[async_trait]
impl ActorSubscriptionRepository for PostgresActorSubscriptionRepository {
    async fn list_active(&self) -> Result<Vec<ActorSubscription>> {
        let rows = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM actor_subscriptions WHERE status = 'active'"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_subscription_row).collect()
    }

    async fn tracked_media(&self, subscription_id: i64) -> Result<Vec<TrackedActorMedia>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRACKED_COLUMNS} FROM tracked_actor_media WHERE subscription_id = $1"
        ))
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_tracked_row).collect()
    }

    async fn apply_diff(
        &self,
        subscription_id: i64,
        insert: &[TrackedActorMedia],
        update: &[TrackedActorMedia],
        delete: &[String],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for item in insert {
            sqlx::query(
                "INSERT INTO tracked_actor_media
                     (subscription_id, tmdb_media_id, item_type, title, release_date, status)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(subscription_id)
            .bind(&item.tmdb_media_id)
            .bind(item.item_type.to_string())
            .bind(&item.title)
            .bind(item.release_date)
            .bind(item.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        for item in update {
            sqlx::query(
                "UPDATE tracked_actor_media SET title = $3, release_date = $4, status = $5
                 WHERE subscription_id = $1 AND tmdb_media_id = $2",
            )
            .bind(subscription_id)
            .bind(&item.tmdb_media_id)
            .bind(&item.title)
            .bind(item.release_date)
            .bind(item.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        if !delete.is_empty() {
            sqlx::query(
                "DELETE FROM tracked_actor_media WHERE subscription_id = $1 AND tmdb_media_id = ANY($2)",
            )
            .bind(subscription_id)
            .bind(delete)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE actor_subscriptions SET status = 'idle', last_checked_at = $2 WHERE id = $1",
        )
        .bind(subscription_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
