//! PostgreSQL implementation of `MediaMetadataRepository`.
//!
//! `actors`/`directors` are stored as `jsonb` (they carry an optional TMDb
//! person id alongside the name); `genres`/`studios`/`countries`/`tags`
//! are plain `text[]` columns, bulk-loaded with `UNNEST` the same way the
//! teacher's movie repository batches inserts.

use async_trait::async_trait;
use reconciler_core::{
    domain::repositories::MediaMetadataRepository,
    models::{ItemType, MediaMetadata, Person},
    ReconcileError, Result,
};
use sqlx::Row;

use crate::database::DatabasePool;

const MEDIA_COLUMNS: &str = "tmdb_id, item_type, title, original_title, release_year,
                             release_date, date_added, rating, genres, actors, directors,
                             studios, countries, tags, last_synced_at";

pub struct PostgresMediaMetadataRepository {
    pool: DatabasePool,
}

impl PostgresMediaMetadataRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> Result<MediaMetadata> {
        let item_type: String = row.try_get("item_type")?;
        let actors: serde_json::Value = row.try_get("actors")?;
        let directors: serde_json::Value = row.try_get("directors")?;

        Ok(MediaMetadata {
            tmdb_id: row.try_get("tmdb_id")?,
            item_type: item_type
                .parse()
                .map_err(|e| ReconcileError::contract_violation("media_metadata.item_type", e))?,
            title: row.try_get("title")?,
            original_title: row.try_get("original_title")?,
            release_year: row.try_get("release_year")?,
            release_date: row.try_get("release_date")?,
            date_added: row.try_get("date_added")?,
            rating: row.try_get("rating")?,
            genres: row.try_get("genres")?,
            actors: serde_json::from_value::<Vec<Person>>(actors)
                .map_err(|e| ReconcileError::contract_violation("media_metadata.actors", e))?,
            directors: serde_json::from_value::<Vec<Person>>(directors)
                .map_err(|e| ReconcileError::contract_violation("media_metadata.directors", e))?,
            studios: row.try_get("studios")?,
            countries: row.try_get("countries")?,
            tags: row.try_get("tags")?,
            last_synced_at: row.try_get("last_synced_at")?,
        })
    }
}

#[async_trait]
impl MediaMetadataRepository for PostgresMediaMetadataRepository {
    async fn find(&self, tmdb_id: &str, item_type: ItemType) -> Result<Option<MediaMetadata>> {
        let row = sqlx::query(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media_metadata WHERE tmdb_id = $1 AND item_type = $2"
        ))
        .bind(tmdb_id)
        .bind(item_type.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn find_many(&self, item_types: &[ItemType]) -> Result<Vec<MediaMetadata>> {
        let types: Vec<String> = item_types.iter().map(|t| t.to_string()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media_metadata WHERE item_type = ANY($1)"
        ))
        .bind(&types)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn all_keys(&self, item_types: &[ItemType]) -> Result<Vec<(String, ItemType)>> {
        let types: Vec<String> = item_types.iter().map(|t| t.to_string()).collect();
        let rows = sqlx::query(
            "SELECT tmdb_id, item_type FROM media_metadata WHERE item_type = ANY($1)",
        )
        .bind(&types)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let tmdb_id: String = row.try_get("tmdb_id")?;
                let item_type: String = row.try_get("item_type")?;
                let item_type = item_type.parse().map_err(|e| {
                    ReconcileError::contract_violation("media_metadata.item_type", e)
                })?;
                Ok((tmdb_id, item_type))
            })
            .collect()
    }

    async fn upsert_batch(&self, batch: &[MediaMetadata]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tmdb_ids = Vec::with_capacity(batch.len());
        let mut item_types = Vec::with_capacity(batch.len());
        let mut titles = Vec::with_capacity(batch.len());
        let mut original_titles = Vec::with_capacity(batch.len());
        let mut release_years = Vec::with_capacity(batch.len());
        let mut release_dates = Vec::with_capacity(batch.len());
        let mut date_addeds = Vec::with_capacity(batch.len());
        let mut ratings = Vec::with_capacity(batch.len());
        let mut genres = Vec::with_capacity(batch.len());
        let mut actors = Vec::with_capacity(batch.len());
        let mut directors = Vec::with_capacity(batch.len());
        let mut studios = Vec::with_capacity(batch.len());
        let mut countries = Vec::with_capacity(batch.len());
        let mut tags = Vec::with_capacity(batch.len());
        let mut last_synced_ats = Vec::with_capacity(batch.len());

        for item in batch {
            tmdb_ids.push(item.tmdb_id.clone());
            item_types.push(item.item_type.to_string());
            titles.push(item.title.clone());
            original_titles.push(item.original_title.clone());
            release_years.push(item.release_year);
            release_dates.push(item.release_date);
            date_addeds.push(item.date_added);
            ratings.push(item.rating);
            genres.push(item.genres.clone());
            actors.push(serde_json::to_value(&item.actors)?);
            directors.push(serde_json::to_value(&item.directors)?);
            studios.push(item.studios.clone());
            countries.push(item.countries.clone());
            tags.push(item.tags.clone());
            last_synced_ats.push(item.last_synced_at);
        }

        sqlx::query(
            "INSERT INTO media_metadata (tmdb_id, item_type, title, original_title,
                 release_year, release_date, date_added, rating, genres, actors,
                 directors, studios, countries, tags, last_synced_at)
             SELECT * FROM UNNEST(
                 $1::text[], $2::text[], $3::text[], $4::text[], $5::int[], $6::date[],
                 $7::timestamptz[], $8::float8[], $9::text[][], $10::jsonb[], $11::jsonb[],
                 $12::text[][], $13::text[][], $14::text[][], $15::timestamptz[])
             ON CONFLICT (tmdb_id, item_type) DO UPDATE SET
                 title = EXCLUDED.title,
                 original_title = EXCLUDED.original_title,
                 release_year = EXCLUDED.release_year,
                 release_date = EXCLUDED.release_date,
                 date_added = EXCLUDED.date_added,
                 rating = EXCLUDED.rating,
                 genres = EXCLUDED.genres,
                 actors = EXCLUDED.actors,
                 directors = EXCLUDED.directors,
                 studios = EXCLUDED.studios,
                 countries = EXCLUDED.countries,
                 tags = EXCLUDED.tags,
                 last_synced_at = EXCLUDED.last_synced_at",
        )
        .bind(&tmdb_ids)
        .bind(&item_types)
        .bind(&titles)
        .bind(&original_titles)
        .bind(&release_years)
        .bind(&release_dates)
        .bind(&date_addeds)
        .bind(&ratings)
        .bind(&genres)
        .bind(&actors)
        .bind(&directors)
        .bind(&studios)
        .bind(&countries)
        .bind(&tags)
        .bind(&last_synced_ats)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_batch(&self, keys: &[(String, ItemType)]) -> Result<()> {
        for chunk in keys.chunks(500) {
            let ids: Vec<&str> = chunk.iter().map(|(id, _)| id.as_str()).collect();
            let types: Vec<String> = chunk.iter().map(|(_, t)| t.to_string()).collect();

            sqlx::query(
                "DELETE FROM media_metadata
                 WHERE (tmdb_id, item_type) IN (
                     SELECT * FROM UNNEST($1::text[], $2::text[])
                 )",
            )
            .bind(&ids)
            .bind(&types)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}
