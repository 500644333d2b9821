//! Collection Reconciler (§4.5) — the engine's core reconcile pass,
//! covering both `type = filter` and `type = list` collections plus the
//! native-collection variant.

use std::sync::Arc;

use chrono::Utc;
use reconciler_core::{
    classification::{classify_collection_item, classify_native_item},
    domain::repositories::{CollectionRepository, MediaMetadataRepository},
    filter::evaluate_rules,
    models::{
        CollectionDefinition, CustomCollection, ItemType, MediaStatus, NativeCollection,
        SnapshotItem,
    },
    Result,
};
use reconciler_facades::{fan_out, EmbyFacade, TmdbFacade, DEFAULT_WORKER_CAP};
use reconciler_list_importer::ListImporter;
use tracing::warn;

pub struct CollectionOutcome {
    pub collection_id: i64,
    pub name: String,
    pub in_library_count: i64,
    pub missing_count: i64,
}

pub struct CollectionReconciler {
    emby: Arc<dyn EmbyFacade>,
    tmdb: Arc<dyn TmdbFacade>,
    media_repo: Arc<dyn MediaMetadataRepository>,
    collection_repo: Arc<dyn CollectionRepository>,
    list_importer: Arc<ListImporter>,
    library_ids: Vec<String>,
}

struct CandidateDetail {
    release_date: Option<chrono::NaiveDate>,
    title: String,
    poster_path: Option<String>,
}

impl CollectionReconciler {
    pub fn new(
        emby: Arc<dyn EmbyFacade>,
        tmdb: Arc<dyn TmdbFacade>,
        media_repo: Arc<dyn MediaMetadataRepository>,
        collection_repo: Arc<dyn CollectionRepository>,
        list_importer: Arc<ListImporter>,
        library_ids: Vec<String>,
    ) -> Self {
        Self {
            emby,
            tmdb,
            media_repo,
            collection_repo,
            list_importer,
            library_ids,
        }
    }

    pub async fn run_all(&self) -> Vec<Result<CollectionOutcome>> {
        let collections = match self.collection_repo.list_active().await {
            Ok(collections) => collections,
            Err(e) => return vec![Err(e)],
        };

        let mut outcomes = Vec::with_capacity(collections.len());
        for collection in collections {
            outcomes.push(self.reconcile_one(&collection).await);
        }
        outcomes
    }

    /// Reconciles a single collection by id, for the orchestrator's
    /// `process-single-custom-collection(id)` task.
    pub async fn reconcile_by_id(&self, collection_id: i64) -> Result<()> {
        let Some(collection) = self.collection_repo.get(collection_id).await? else {
            return Err(reconciler_core::ReconcileError::contract_violation(
                "custom_collections",
                format!("no collection with id {collection_id}"),
            ));
        };
        self.reconcile_one(&collection).await?;
        Ok(())
    }

    async fn reconcile_one(&self, collection: &CustomCollection) -> Result<CollectionOutcome> {
        let candidates = self.generate_candidates(collection).await?;

        if candidates.is_empty() {
            self.collection_repo
                .persist_snapshot(collection.id, None, &[])
                .await?;
            return Ok(CollectionOutcome {
                collection_id: collection.id,
                name: collection.name.clone(),
                in_library_count: 0,
                missing_count: 0,
            });
        }

        let tmdb_ids: Vec<String> = candidates.iter().map(|(id, _)| id.clone()).collect();
        let item_types: Vec<String> = collection
            .definition
            .item_types()
            .iter()
            .map(|t| t.to_string())
            .collect();

        let create_result = self
            .emby
            .create_or_update_collection(&collection.name, &tmdb_ids, &self.library_ids, &item_types)
            .await?;

        let details = fan_out(candidates.clone(), DEFAULT_WORKER_CAP, {
            let tmdb = self.tmdb.clone();
            move |(tmdb_id, item_type)| {
                let tmdb = tmdb.clone();
                async move {
                    let detail = fetch_candidate_detail(tmdb.as_ref(), &tmdb_id, item_type).await;
                    (tmdb_id, item_type, detail)
                }
            }
        })
        .await;

        let today = Utc::now().date_naive();
        let previously_subscribed = collection.previously_subscribed_ids();

        let mut snapshot = Vec::with_capacity(details.len());
        for (tmdb_id, item_type, detail) in details {
            let Ok(detail) = detail else {
                warn!(
                    "collection reconciler: skipping {tmdb_id} in '{}' — TMDb lookup failed",
                    collection.name
                );
                continue;
            };

            let in_library = create_result.tmdb_ids_present.contains(&tmdb_id);
            let status = classify_collection_item(
                in_library,
                previously_subscribed.contains(tmdb_id.as_str()),
                detail.release_date,
                today,
            );

            snapshot.push(SnapshotItem {
                tmdb_id,
                item_type,
                title: detail.title,
                release_date: detail.release_date,
                poster_path: detail.poster_path,
                status,
            });
        }

        let in_library_count = snapshot
            .iter()
            .filter(|i| i.status == MediaStatus::InLibrary)
            .count() as i64;
        let missing_count = snapshot
            .iter()
            .filter(|i| i.status == MediaStatus::Missing)
            .count() as i64;

        self.collection_repo
            .persist_snapshot(
                collection.id,
                Some(create_result.collection_id.as_str()),
                &snapshot,
            )
            .await?;

        Ok(CollectionOutcome {
            collection_id: collection.id,
            name: collection.name.clone(),
            in_library_count,
            missing_count,
        })
    }

    async fn generate_candidates(
        &self,
        collection: &CustomCollection,
    ) -> Result<Vec<(String, ItemType)>> {
        match &collection.definition {
            CollectionDefinition::Filter(def) => {
                let rows = self.media_repo.find_many(&def.item_type).await?;
                Ok(rows
                    .into_iter()
                    .filter(|row| evaluate_rules(&def.rules, def.logic, row))
                    .map(|row| (row.tmdb_id, row.item_type))
                    .collect())
            }
            CollectionDefinition::List(def) => {
                let resolved = self.list_importer.resolve(def).await;
                Ok(resolved
                    .into_iter()
                    .map(|item| (item.tmdb_id, item.item_type))
                    .collect())
            }
        }
    }

    /// Reconciles every native (TMDb-franchise) collection already
    /// discovered on the server. Unlike custom collections, candidates come
    /// straight from TMDb's collection membership rather than a filter or
    /// list definition.
    pub async fn run_native_all(&self) -> Vec<Result<()>> {
        let natives = match self.collection_repo.list_native_collections().await {
            Ok(natives) => natives,
            Err(e) => return vec![Err(e)],
        };

        let mut outcomes = Vec::with_capacity(natives.len());
        for native in natives {
            outcomes.push(self.reconcile_native_one(&native).await);
        }
        outcomes
    }

    async fn reconcile_native_one(&self, native: &NativeCollection) -> Result<()> {
        let details = self
            .tmdb
            .get_collection_details(native.tmdb_collection_id)
            .await?;

        let previous_status: std::collections::HashMap<&str, MediaStatus> = native
            .missing_movies
            .iter()
            .map(|item| (item.tmdb_id.as_str(), item.status))
            .collect();

        let today = Utc::now().date_naive();
        let in_library_ids = self
            .emby
            .get_items(&self.library_ids, Some("Movie"))
            .await?
            .into_iter()
            .filter_map(|item| item.tmdb_id().map(|s| s.to_string()))
            .collect::<std::collections::HashSet<_>>();

        let mut snapshot = Vec::with_capacity(details.parts.len());
        for part in details.parts {
            let tmdb_id = part.id.to_string();
            let in_library = in_library_ids.contains(&tmdb_id);
            let prev = previous_status
                .get(tmdb_id.as_str())
                .copied()
                .unwrap_or(MediaStatus::Missing);
            let status = classify_native_item(
                in_library,
                prev == MediaStatus::Subscribed,
                part.release_date,
                prev,
                today,
            );

            snapshot.push(SnapshotItem {
                tmdb_id,
                item_type: ItemType::Movie,
                title: part.title,
                release_date: part.release_date,
                poster_path: part.poster_path,
                status,
            });
        }

        self.collection_repo
            .persist_native_snapshot(&native.emby_collection_id, &snapshot)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use reconciler_core::models::{
        CollectionDefinition, CollectionStatus, CollectionType, FilterDefinition, HealthStatus,
        ItemType, MediaMetadata, Person, RuleLogic,
    };
    use reconciler_facades::{
        CreateOrUpdateCollectionResult, EmbyItem, EmbyLibrary, MovieDetails, TvDetails,
    };

    mock! {
        Emby {}
        #[async_trait]
        impl EmbyFacade for Emby {
            async fn get_libraries(&self) -> Result<Vec<EmbyLibrary>>;
            async fn get_items(&self, library_ids: &[String], media_type_filter: Option<&str>) -> Result<Vec<EmbyItem>>;
            async fn get_item(&self, id: &str) -> Result<EmbyItem>;
            async fn get_item_count(&self, parent_id: &str, item_type: &str) -> Result<i64>;
            async fn create_or_update_collection(
                &self,
                name: &str,
                tmdb_ids: &[String],
                library_ids: &[String],
                item_types: &[String],
            ) -> Result<CreateOrUpdateCollectionResult>;
            async fn append_item_to_collection(&self, collection_id: &str, item_id: &str) -> Result<()>;
            async fn update_person(&self, person_id: &str, name: &str) -> Result<()>;
            async fn get_library_root_for_item(&self, item_id: &str) -> Result<String>;
        }
    }

    mock! {
        Tmdb {}
        #[async_trait]
        impl TmdbFacade for Tmdb {
            async fn get_movie_details(&self, tmdb_id: &str) -> Result<MovieDetails>;
            async fn get_tv_details(&self, tmdb_id: &str) -> Result<TvDetails>;
            async fn get_collection_details(&self, tmdb_collection_id: i64) -> Result<reconciler_facades::CollectionDetails>;
            async fn search_media(&self, title: &str, item_type: ItemType) -> Result<Vec<reconciler_facades::SearchResult>>;
            async fn resolve_imdb_to_tmdb(&self, imdb_id: &str, item_type: ItemType) -> Result<Option<String>>;
            async fn get_person_combined_credits(&self, person_id: i64) -> Result<Vec<reconciler_facades::PersonCredit>>;
        }
    }

    mock! {
        MediaRepo {}
        #[async_trait]
        impl MediaMetadataRepository for MediaRepo {
            async fn find(&self, tmdb_id: &str, item_type: ItemType) -> Result<Option<MediaMetadata>>;
            async fn find_many(&self, item_types: &[ItemType]) -> Result<Vec<MediaMetadata>>;
            async fn all_keys(&self, item_types: &[ItemType]) -> Result<Vec<(String, ItemType)>>;
            async fn upsert_batch(&self, batch: &[MediaMetadata]) -> Result<()>;
            async fn delete_batch(&self, keys: &[(String, ItemType)]) -> Result<()>;
        }
    }

    mock! {
        Collections {}
        #[async_trait]
        impl CollectionRepository for Collections {
            async fn list_active(&self) -> Result<Vec<CustomCollection>>;
            async fn get(&self, id: i64) -> Result<Option<CustomCollection>>;
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
            async fn match_and_update_list_collections_on_item_add(
                &self,
                tmdb_id: &str,
                item_type: ItemType,
            ) -> Result<Vec<(String, String)>>;
            async fn batch_mark_movies_as_subscribed_in_collections(
                &self,
                tmdb_ids: &[String],
            ) -> Result<()>;
        }
    }

    fn matrix_row() -> MediaMetadata {
        MediaMetadata {
            tmdb_id: "603".into(),
            item_type: ItemType::Movie,
            title: "The Matrix".into(),
            original_title: None,
            release_year: Some(1999),
            release_date: Some("1999-03-31".parse().unwrap()),
            date_added: Some(Utc::now()),
            rating: Some(8.2),
            genres: vec!["Action".into()],
            actors: vec![Person::named("Keanu Reeves")],
            directors: vec![],
            studios: vec![],
            countries: vec![],
            tags: vec![],
            last_synced_at: Utc::now(),
        }
    }

    fn filter_collection() -> CustomCollection {
        CustomCollection {
            id: 1,
            name: "Action Picks".into(),
            collection_type: CollectionType::Filter,
            definition: CollectionDefinition::Filter(FilterDefinition {
                item_type: vec![ItemType::Movie],
                logic: RuleLogic::And,
                rules: vec![],
            }),
            status: CollectionStatus::Active,
            sort_order: 0,
            emby_collection_id: None,
            last_synced_at: None,
            in_library_count: 0,
            missing_count: 0,
            health_status: HealthStatus::Ok,
            generated_media_info: vec![],
        }
    }

    fn list_importer(tmdb: Arc<dyn TmdbFacade>) -> Arc<ListImporter> {
        Arc::new(ListImporter::new(tmdb, std::path::PathBuf::from("/tmp/reconciler-test-cache")))
    }

    // §8 scenario S1: a filter collection whose only candidate just
    // landed in the library classifies to IN_LIBRARY.
    #[tokio::test]
    async fn newly_arrived_movie_classifies_in_library() {
        let mut emby = MockEmby::new();
        emby.expect_create_or_update_collection()
            .times(1)
            .returning(|_, _, _, _| {
                Ok(CreateOrUpdateCollectionResult {
                    collection_id: "emby-col-1".to_string(),
                    tmdb_ids_present: vec!["603".to_string()],
                })
            });

        let mut tmdb = MockTmdb::new();
        tmdb.expect_get_movie_details().times(1).returning(|_| {
            Ok(MovieDetails {
                id: 603,
                title: "The Matrix".to_string(),
                release_date: Some("1999-03-31".parse().unwrap()),
                poster_path: None,
                vote_average: None,
                vote_count: None,
                genres: vec![],
                production_countries: vec![],
                credits: None,
                belongs_to_collection: None,
            })
        });

        let mut media_repo = MockMediaRepo::new();
        media_repo
            .expect_find_many()
            .times(1)
            .returning(|_| Ok(vec![matrix_row()]));

        let mut collections = MockCollections::new();
        collections
            .expect_list_active()
            .times(1)
            .returning(|| Ok(vec![filter_collection()]));
        collections
            .expect_persist_snapshot()
            .times(1)
            .withf(|id, _, snapshot| {
                *id == 1 && snapshot.len() == 1 && snapshot[0].status == MediaStatus::InLibrary
            })
            .returning(|_, _, _| Ok(()));

        let tmdb: Arc<dyn TmdbFacade> = Arc::new(tmdb);
        let reconciler = CollectionReconciler::new(
            Arc::new(emby),
            tmdb.clone(),
            Arc::new(media_repo),
            Arc::new(collections),
            list_importer(tmdb),
            vec!["lib-1".to_string()],
        );

        let outcomes = reconciler.run_all().await;
        assert_eq!(outcomes.len(), 1);
        let outcome = outcomes.into_iter().next().unwrap().unwrap();
        assert_eq!(outcome.in_library_count, 1);
        assert_eq!(outcome.missing_count, 0);
    }

    // An empty candidate set persists an empty snapshot rather than
    // calling Emby at all.
    #[tokio::test]
    async fn empty_candidate_set_persists_empty_snapshot() {
        let emby = MockEmby::new();
        let tmdb = MockTmdb::new();

        let mut media_repo = MockMediaRepo::new();
        media_repo.expect_find_many().times(1).returning(|_| Ok(vec![]));

        let mut collections = MockCollections::new();
        collections
            .expect_list_active()
            .times(1)
            .returning(|| Ok(vec![filter_collection()]));
        collections
            .expect_persist_snapshot()
            .times(1)
            .withf(|id, emby_id, snapshot| *id == 1 && emby_id.is_none() && snapshot.is_empty())
            .returning(|_, _, _| Ok(()));

        let tmdb: Arc<dyn TmdbFacade> = Arc::new(tmdb);
        let reconciler = CollectionReconciler::new(
            Arc::new(emby),
            tmdb.clone(),
            Arc::new(media_repo),
            Arc::new(collections),
            list_importer(tmdb),
            vec!["lib-1".to_string()],
        );

        let outcomes = reconciler.run_all().await;
        assert_eq!(outcomes.len(), 1);
        let outcome = outcomes.into_iter().next().unwrap().unwrap();
        assert_eq!(outcome.in_library_count, 0);
        assert_eq!(outcome.missing_count, 0);
    }
}

async fn fetch_candidate_detail(
    tmdb: &dyn TmdbFacade,
    tmdb_id: &str,
    item_type: ItemType,
) -> Result<CandidateDetail> {
    match item_type {
        ItemType::Movie => {
            let details = tmdb.get_movie_details(tmdb_id).await?;
            Ok(CandidateDetail {
                release_date: details.release_date,
                title: details.title,
                poster_path: details.poster_path,
            })
        }
        ItemType::Series => {
            let details = tmdb.get_tv_details(tmdb_id).await?;
            Ok(CandidateDetail {
                release_date: details.first_air_date,
                title: details.name,
                poster_path: details.poster_path,
            })
        }
    }
}
