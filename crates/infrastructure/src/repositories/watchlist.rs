//! PostgreSQL implementation of `WatchlistRepository`.

use async_trait::async_trait;
use reconciler_core::{
    domain::repositories::WatchlistRepository,
    models::{MissingSeason, Watchlist, WatchlistStatus},
    ReconcileError, Result,
};
use sqlx::Row;

use crate::database::DatabasePool;

const WATCHLIST_COLUMNS: &str =
    "item_id, tmdb_id, status, force_ended, paused_until, missing_seasons";

pub struct PostgresWatchlistRepository {
    pool: DatabasePool,
}

impl PostgresWatchlistRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> Result<Watchlist> {
        let status: String = row.try_get("status")?;
        let missing_seasons: serde_json::Value = row.try_get("missing_seasons")?;
        Ok(Watchlist {
            item_id: row.try_get("item_id")?,
            tmdb_id: row.try_get("tmdb_id")?,
            status: parse_status(&status)?,
            force_ended: row.try_get("force_ended")?,
            paused_until: row.try_get("paused_until")?,
            missing_seasons: serde_json::from_value::<Vec<MissingSeason>>(missing_seasons)?,
        })
    }
}

fn parse_status(s: &str) -> Result<WatchlistStatus> {
    match s {
        "Watching" => Ok(WatchlistStatus::Watching),
        "Paused" => Ok(WatchlistStatus::Paused),
        "Completed" => Ok(WatchlistStatus::Completed),
        other => Err(ReconcileError::contract_violation(
            "watchlist.status",
            format!("unknown status: {other}"),
        )),
    }
}

fn status_str(status: WatchlistStatus) -> &'static str {
    match status {
        WatchlistStatus::Watching => "Watching",
        WatchlistStatus::Paused => "Paused",
        WatchlistStatus::Completed => "Completed",
    }
}

#[async_trait]
impl WatchlistRepository for PostgresWatchlistRepository {
    async fn list_active(&self) -> Result<Vec<Watchlist>> {
        let rows = sqlx::query(&format!(
            "SELECT {WATCHLIST_COLUMNS} FROM watchlist
             WHERE force_ended = false AND status IN ('Watching', 'Paused')"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn find_by_tmdb_id(&self, tmdb_id: &str) -> Result<Option<Watchlist>> {
        let row = sqlx::query(&format!(
            "SELECT {WATCHLIST_COLUMNS} FROM watchlist WHERE tmdb_id = $1"
        ))
        .bind(tmdb_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn upsert(&self, entry: &Watchlist) -> Result<()> {
        let missing_seasons_json = serde_json::to_value(&entry.missing_seasons)?;

        sqlx::query(
            "INSERT INTO watchlist (item_id, tmdb_id, status, force_ended, paused_until, missing_seasons)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (item_id) DO UPDATE SET
                 tmdb_id = EXCLUDED.tmdb_id,
                 status = EXCLUDED.status,
                 force_ended = EXCLUDED.force_ended,
                 paused_until = EXCLUDED.paused_until,
                 missing_seasons = EXCLUDED.missing_seasons",
        )
        .bind(&entry.item_id)
        .bind(&entry.tmdb_id)
        .bind(status_str(entry.status))
        .bind(entry.force_ended)
        .bind(entry.paused_until)
        .bind(&missing_seasons_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn persist_missing_seasons(
        &self,
        item_id: &str,
        missing_seasons: &[MissingSeason],
    ) -> Result<()> {
        let json = serde_json::to_value(missing_seasons)?;
        sqlx::query("UPDATE watchlist SET missing_seasons = $2 WHERE item_id = $1")
            .bind(item_id)
            .bind(&json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
