//! Library Indexer (§4.2): reconciles `media_metadata` against the media
//! server in *quick* or *deep* mode.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Datelike, Utc};
use reconciler_core::{
    domain::repositories::{MediaMetadataRepository, PersonIdentityRepository},
    models::{ItemType, MediaMetadata, Person, PersonIdentityFields},
    Result,
};
use reconciler_facades::{fan_out, EmbyFacade, EmbyItem, TmdbFacade, DEFAULT_WORKER_CAP};
use tracing::{info, warn};

const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Quick,
    Deep,
}

pub struct LibraryIndexer {
    emby: Arc<dyn EmbyFacade>,
    tmdb: Arc<dyn TmdbFacade>,
    media_repo: Arc<dyn MediaMetadataRepository>,
    person_repo: Arc<dyn PersonIdentityRepository>,
    batch_size: usize,
}

impl LibraryIndexer {
    pub fn new(
        emby: Arc<dyn EmbyFacade>,
        tmdb: Arc<dyn TmdbFacade>,
        media_repo: Arc<dyn MediaMetadataRepository>,
        person_repo: Arc<dyn PersonIdentityRepository>,
    ) -> Self {
        Self {
            emby,
            tmdb,
            media_repo,
            person_repo,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Reconciles the given libraries. Returns the count of (added+updated,
    /// deleted) items, so the orchestrator can report progress.
    pub async fn run(
        &self,
        library_ids: &[String],
        mode: IndexMode,
        mut is_cancelled: impl FnMut() -> bool,
    ) -> Result<(usize, usize)> {
        let emby_items = self.emby.get_items(library_ids, None).await?;
        let mut emby_by_tmdb: HashMap<(String, ItemType), EmbyItem> = HashMap::new();
        for item in emby_items {
            let Some(tmdb_id) = item.tmdb_id().map(|s| s.to_string()) else {
                continue;
            };
            let item_type = match item.item_type.as_deref() {
                Some("Movie") => ItemType::Movie,
                Some("Series") => ItemType::Series,
                _ => continue,
            };
            emby_by_tmdb.insert((tmdb_id, item_type), item);
        }

        let db_keys: HashSet<(String, ItemType)> = self
            .media_repo
            .all_keys(&[ItemType::Movie, ItemType::Series])
            .await?
            .into_iter()
            .collect();
        let emby_keys: HashSet<(String, ItemType)> = emby_by_tmdb.keys().cloned().collect();

        let to_delete: Vec<(String, ItemType)> =
            db_keys.difference(&emby_keys).cloned().collect();
        let to_add: Vec<(String, ItemType)> = emby_keys.difference(&db_keys).cloned().collect();

        let common: Vec<(String, ItemType)> = if mode == IndexMode::Deep {
            emby_keys.intersection(&db_keys).cloned().collect()
        } else {
            let mut scheduled = Vec::new();
            for key in emby_keys.intersection(&db_keys) {
                let emby_item = &emby_by_tmdb[key];
                let existing = self.media_repo.find(&key.0, key.1).await?;
                let needs_update = match (&existing, emby_item.date_modified) {
                    (Some(existing), Some(modified)) => modified > existing.last_synced_at,
                    // Missing/unparseable timestamps: update conservatively.
                    _ => true,
                };
                if needs_update {
                    scheduled.push(key.clone());
                }
            }
            scheduled
        };

        self.media_repo.delete_batch(&to_delete).await?;

        let to_process: Vec<(String, ItemType)> =
            to_add.into_iter().chain(common).collect();
        let mut processed = 0;

        for chunk in to_process.chunks(self.batch_size) {
            if is_cancelled() {
                break;
            }

            let items: Vec<EmbyItem> = chunk
                .iter()
                .filter_map(|key| emby_by_tmdb.get(key).cloned())
                .collect();

            let enriched = fan_out(items, DEFAULT_WORKER_CAP, {
                let tmdb = self.tmdb.clone();
                move |item| {
                    let tmdb = tmdb.clone();
                    async move { build_metadata(tmdb.as_ref(), &item).await }
                }
            })
            .await;

            let mut batch = Vec::new();
            for result in enriched {
                match result {
                    Ok(mut metadata) => {
                        metadata.actors = self.resolve_actor_identities(metadata.actors).await;
                        batch.push(metadata);
                    }
                    Err(e) => warn!("library indexer: skipping item, enrichment failed: {e}"),
                }
            }

            processed += batch.len();
            self.media_repo.upsert_batch(&batch).await?;
        }

        info!(
            "library indexer: {} added/updated, {} deleted",
            processed,
            to_delete.len()
        );

        Ok((processed, to_delete.len()))
    }

    /// Resolves each actor to the canonical person via `PersonIdentityMap`,
    /// using any available id before falling back to name alone.
    async fn resolve_actor_identities(&self, actors: Vec<Person>) -> Vec<Person> {
        resolve_actor_identities(self.person_repo.as_ref(), actors).await
    }
}

pub(crate) async fn resolve_actor_identities(
    person_repo: &dyn PersonIdentityRepository,
    actors: Vec<Person>,
) -> Vec<Person> {
    let mut resolved = Vec::with_capacity(actors.len());
    for actor in actors {
        let fields = PersonIdentityFields {
            primary_name: Some(actor.name.clone()),
            tmdb_person_id: actor.id,
            ..Default::default()
        };
        match person_repo.upsert_person(&fields).await {
            Ok(outcome) => resolved.push(Person {
                id: Some(outcome.map_id()),
                name: actor.name,
                original_name: actor.original_name,
            }),
            Err(_) => resolved.push(actor),
        }
    }
    resolved
}

/// Builds and actor-resolves metadata for a single item, used by the
/// webhook propagator's single-item refresh path (§4.8 step 3).
pub async fn build_single_item_metadata(
    tmdb: &dyn TmdbFacade,
    person_repo: &dyn PersonIdentityRepository,
    item: &EmbyItem,
) -> Result<MediaMetadata> {
    let mut metadata = build_metadata(tmdb, item).await?;
    metadata.actors = resolve_actor_identities(person_repo, metadata.actors).await;
    Ok(metadata)
}

async fn build_metadata(tmdb: &dyn TmdbFacade, item: &EmbyItem) -> Result<MediaMetadata> {
    let Some(tmdb_id) = item.tmdb_id() else {
        return Err(reconciler_core::ReconcileError::contract_violation(
            "emby.item",
            "missing Tmdb provider id",
        ));
    };

    match item.item_type.as_deref() {
        Some("Movie") => {
            let details = tmdb.get_movie_details(tmdb_id).await?;
            let credits = details.credits.unwrap_or_default();
            let directors: Vec<Person> = credits
                .crew
                .iter()
                .filter(|c| c.job.as_deref() == Some("Director"))
                .map(|c| Person {
                    id: Some(c.id),
                    name: c.name.clone(),
                    original_name: None,
                })
                .collect();
            let actors: Vec<Person> = credits
                .cast
                .iter()
                .map(|c| Person {
                    id: Some(c.id),
                    name: c.name.clone(),
                    original_name: None,
                })
                .collect();

            Ok(MediaMetadata {
                tmdb_id: tmdb_id.to_string(),
                item_type: ItemType::Movie,
                title: details.title,
                original_title: None,
                release_year: details.release_date.map(|d| d.year()),
                release_date: details.release_date,
                date_added: item.date_created,
                rating: details.vote_average,
                genres: details.genres.into_iter().map(|g| g.name).collect(),
                actors,
                directors,
                studios: item.studios.iter().map(|s| s.name.clone()).collect(),
                countries: details
                    .production_countries
                    .into_iter()
                    .map(|c| c.iso_3166_1)
                    .collect(),
                tags: item.tags.clone(),
                last_synced_at: Utc::now(),
            })
        }
        _ => {
            let details = tmdb.get_tv_details(tmdb_id).await?;
            let credits = details.credits.unwrap_or_default();
            let mut directors: Vec<Person> = credits
                .crew
                .iter()
                .filter(|c| c.job.as_deref() == Some("Director"))
                .map(|c| Person {
                    id: Some(c.id),
                    name: c.name.clone(),
                    original_name: None,
                })
                .collect();
            if directors.is_empty() {
                directors = details
                    .created_by
                    .iter()
                    .map(|c| Person {
                        id: c.id,
                        name: c.name.clone(),
                        original_name: None,
                    })
                    .collect();
            }
            let actors: Vec<Person> = credits
                .cast
                .iter()
                .map(|c| Person {
                    id: Some(c.id),
                    name: c.name.clone(),
                    original_name: None,
                })
                .collect();

            Ok(MediaMetadata {
                tmdb_id: tmdb_id.to_string(),
                item_type: ItemType::Series,
                title: details.name,
                original_title: None,
                release_year: details.first_air_date.map(|d| d.year()),
                release_date: details.first_air_date,
                date_added: item.date_created,
                rating: details.vote_average,
                genres: details.genres.into_iter().map(|g| g.name).collect(),
                actors,
                directors,
                studios: item.studios.iter().map(|s| s.name.clone()).collect(),
                countries: details.origin_country,
                tags: item.tags.clone(),
                last_synced_at: Utc::now(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use reconciler_core::models::{PersonIdentity, PersonIdentityFields, UpsertPersonOutcome};
    use reconciler_facades::{CreditPerson, Credits, NamedRef, TvDetails};

    mock! {
        PersonRepo {}
        #[async_trait]
        impl PersonIdentityRepository for PersonRepo {
            async fn upsert_person(&self, fields: &PersonIdentityFields) -> Result<UpsertPersonOutcome>;
            async fn find_by_any_id(&self, fields: &PersonIdentityFields) -> Result<Option<PersonIdentity>>;
        }
    }

    mock! {
        Tmdb {}
        #[async_trait]
        impl TmdbFacade for Tmdb {
            async fn get_movie_details(&self, tmdb_id: &str) -> Result<reconciler_facades::MovieDetails>;
            async fn get_tv_details(&self, tmdb_id: &str) -> Result<TvDetails>;
            async fn get_collection_details(&self, tmdb_collection_id: i64) -> Result<reconciler_facades::CollectionDetails>;
            async fn search_media(&self, title: &str, item_type: ItemType) -> Result<Vec<reconciler_facades::SearchResult>>;
            async fn resolve_imdb_to_tmdb(&self, imdb_id: &str, item_type: ItemType) -> Result<Option<String>>;
            async fn get_person_combined_credits(&self, person_id: i64) -> Result<Vec<reconciler_facades::PersonCredit>>;
        }
    }

    // Resolution substitutes the canonical person-map id for the actor's
    // raw TMDb id, and falls back to the original entry on repo failure.
    #[tokio::test]
    async fn resolve_actor_identities_maps_to_canonical_id_and_falls_back_on_error() {
        let mut repo = MockPersonRepo::new();
        repo.expect_upsert_person()
            .withf(|fields| fields.primary_name.as_deref() == Some("Keanu Reeves"))
            .returning(|_| Ok(UpsertPersonOutcome::Merged { map_id: 99 }));
        repo.expect_upsert_person()
            .withf(|fields| fields.primary_name.as_deref() == Some("Broken Actor"))
            .returning(|_| Err(reconciler_core::ReconcileError::transient("person_repo", "db down")));

        let actors = vec![
            Person {
                id: Some(6384),
                name: "Keanu Reeves".to_string(),
                original_name: None,
            },
            Person {
                id: Some(1),
                name: "Broken Actor".to_string(),
                original_name: None,
            },
        ];

        let resolved = resolve_actor_identities(&repo, actors).await;
        assert_eq!(resolved[0].id, Some(99));
        assert_eq!(resolved[1].id, Some(1), "repo failure keeps the original entry untouched");
    }

    fn tv_item() -> EmbyItem {
        let mut provider_ids = std::collections::HashMap::new();
        provider_ids.insert("Tmdb".to_string(), "1399".to_string());
        EmbyItem {
            id: "emby-9".to_string(),
            name: "Game of Thrones".to_string(),
            item_type: Some("Series".to_string()),
            provider_ids: Some(provider_ids),
            ..Default::default()
        }
    }

    // When TMDb's `credits.crew` names no Director, a series falls back to
    // `created_by` rather than reporting no directors at all.
    #[tokio::test]
    async fn tv_metadata_falls_back_to_created_by_when_no_crew_director() {
        let mut tmdb = MockTmdb::new();
        tmdb.expect_get_tv_details().times(1).returning(|_| {
            Ok(TvDetails {
                id: 1399,
                name: "Game of Thrones".to_string(),
                first_air_date: None,
                poster_path: None,
                vote_average: None,
                vote_count: None,
                genres: vec![NamedRef { id: None, name: "Drama".to_string() }],
                origin_country: vec!["US".to_string()],
                created_by: vec![NamedRef {
                    id: Some(9),
                    name: "David Benioff".to_string(),
                }],
                seasons: vec![],
                credits: Some(Credits {
                    cast: vec![CreditPerson {
                        id: 1,
                        name: "Emilia Clarke".to_string(),
                        job: None,
                        department: None,
                    }],
                    crew: vec![],
                }),
            })
        });

        let metadata = build_metadata(&tmdb, &tv_item()).await.unwrap();
        assert_eq!(metadata.directors.len(), 1);
        assert_eq!(metadata.directors[0].name, "David Benioff");
        assert_eq!(metadata.actors.len(), 1);
    }
}
