//! Webhook Propagator (§4.8): reacts to a single "item added" event,
//! refreshing the local index and flipping any matching collection
//! snapshot to `IN_LIBRARY` without waiting for the next full reconcile.

use std::sync::Arc;

use reconciler_core::{
    domain::repositories::{
        CollectionRepository, MediaMetadataRepository, PersonIdentityRepository,
        WatchlistRepository,
    },
    filter::evaluate_rules,
    models::{CollectionDefinition, ItemType, Watchlist, WatchlistStatus},
    Result,
};
use reconciler_facades::{EmbyFacade, EmbyItem, TmdbFacade};
use tracing::{info, warn};

use crate::library_indexer::build_single_item_metadata;

pub struct WebhookPropagator {
    emby: Arc<dyn EmbyFacade>,
    tmdb: Arc<dyn TmdbFacade>,
    media_repo: Arc<dyn MediaMetadataRepository>,
    person_repo: Arc<dyn PersonIdentityRepository>,
    collection_repo: Arc<dyn CollectionRepository>,
    watchlist_repo: Arc<dyn WatchlistRepository>,
}

impl WebhookPropagator {
    pub fn new(
        emby: Arc<dyn EmbyFacade>,
        tmdb: Arc<dyn TmdbFacade>,
        media_repo: Arc<dyn MediaMetadataRepository>,
        person_repo: Arc<dyn PersonIdentityRepository>,
        collection_repo: Arc<dyn CollectionRepository>,
        watchlist_repo: Arc<dyn WatchlistRepository>,
    ) -> Self {
        Self {
            emby,
            tmdb,
            media_repo,
            person_repo,
            collection_repo,
            watchlist_repo,
        }
    }

    pub async fn handle_item_added(&self, emby_item_id: &str) -> Result<()> {
        let item = self.emby.get_item(emby_item_id).await?;
        let Some(tmdb_id) = item.tmdb_id().map(|s| s.to_string()) else {
            warn!("webhook propagator: item {emby_item_id} has no Tmdb provider id, skipping");
            return Ok(());
        };
        let item_type = match item.item_type.as_deref() {
            Some("Movie") => ItemType::Movie,
            Some("Series") => ItemType::Series,
            _ => {
                warn!("webhook propagator: item {emby_item_id} has unrecognized type, skipping");
                return Ok(());
            }
        };

        self.maybe_add_to_watchlist(&item, &tmdb_id, item_type).await?;

        let metadata =
            build_single_item_metadata(self.tmdb.as_ref(), self.person_repo.as_ref(), &item).await?;
        self.media_repo.upsert_batch(std::slice::from_ref(&metadata)).await?;

        self.append_to_matching_filter_collections(&tmdb_id, item_type, emby_item_id)
            .await?;

        let affected = self
            .collection_repo
            .match_and_update_list_collections_on_item_add(&tmdb_id, item_type)
            .await?;
        for (collection_id, name) in affected {
            if let Err(e) = self.emby.append_item_to_collection(&collection_id, emby_item_id).await {
                warn!("webhook propagator: failed appending to list collection '{name}': {e}");
            }
        }

        Ok(())
    }

    async fn maybe_add_to_watchlist(
        &self,
        item: &EmbyItem,
        tmdb_id: &str,
        item_type: ItemType,
    ) -> Result<()> {
        if item_type != ItemType::Series {
            return Ok(());
        }
        if self.watchlist_repo.find_by_tmdb_id(tmdb_id).await?.is_some() {
            return Ok(());
        }

        self.watchlist_repo
            .upsert(&Watchlist {
                item_id: item.id.clone(),
                tmdb_id: tmdb_id.to_string(),
                status: WatchlistStatus::Watching,
                force_ended: false,
                paused_until: None,
                missing_seasons: Vec::new(),
            })
            .await
    }

    async fn append_to_matching_filter_collections(
        &self,
        tmdb_id: &str,
        item_type: ItemType,
        emby_item_id: &str,
    ) -> Result<()> {
        let collections = self.collection_repo.list_active().await?;
        let Some(row) = self.media_repo.find(tmdb_id, item_type).await? else {
            return Ok(());
        };

        for collection in collections {
            let CollectionDefinition::Filter(def) = &collection.definition else {
                continue;
            };
            if !def.item_type.contains(&item_type) {
                continue;
            }
            if !evaluate_rules(&def.rules, def.logic, &row) {
                continue;
            }
            let Some(emby_collection_id) = &collection.emby_collection_id else {
                continue;
            };

            if let Err(e) = self
                .emby
                .append_item_to_collection(emby_collection_id, emby_item_id)
                .await
            {
                warn!(
                    "webhook propagator: failed appending to filter collection '{}': {e}",
                    collection.name
                );
            } else {
                info!(
                    "webhook propagator: appended '{}' to filter collection '{}'",
                    row.title, collection.name
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use reconciler_core::models::{MediaMetadata, PersonIdentityFields, UpsertPersonOutcome};
    use reconciler_facades::{
        CreateOrUpdateCollectionResult, EmbyLibrary, MovieDetails, TvDetails,
    };
    use std::collections::HashMap;

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
        PersonRepo {}
        #[async_trait]
        impl PersonIdentityRepository for PersonRepo {
            async fn upsert_person(&self, fields: &PersonIdentityFields) -> Result<UpsertPersonOutcome>;
            async fn find_by_any_id(
                &self,
                fields: &PersonIdentityFields,
            ) -> Result<Option<reconciler_core::models::PersonIdentity>>;
        }
    }

    mock! {
        Collections {}
        #[async_trait]
        impl CollectionRepository for Collections {
            async fn list_active(&self) -> Result<Vec<reconciler_core::models::CustomCollection>>;
            async fn get(&self, id: i64) -> Result<Option<reconciler_core::models::CustomCollection>>;
            async fn persist_snapshot(
                &self,
                id: i64,
                emby_collection_id: Option<&str>,
                snapshot: &[reconciler_core::models::SnapshotItem],
            ) -> Result<()>;
            async fn list_native_collections(&self) -> Result<Vec<reconciler_core::models::NativeCollection>>;
            async fn persist_native_snapshot(
                &self,
                emby_collection_id: &str,
                snapshot: &[reconciler_core::models::SnapshotItem],
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

    mock! {
        Watchlists {}
        #[async_trait]
        impl WatchlistRepository for Watchlists {
            async fn list_active(&self) -> Result<Vec<Watchlist>>;
            async fn find_by_tmdb_id(&self, tmdb_id: &str) -> Result<Option<Watchlist>>;
            async fn upsert(&self, entry: &Watchlist) -> Result<()>;
            async fn persist_missing_seasons(
                &self,
                item_id: &str,
                missing_seasons: &[reconciler_core::models::MissingSeason],
            ) -> Result<()>;
        }
    }

    fn movie_item() -> EmbyItem {
        let mut provider_ids = HashMap::new();
        provider_ids.insert("Tmdb".to_string(), "603".to_string());
        EmbyItem {
            id: "emby-1".to_string(),
            name: "The Matrix".to_string(),
            item_type: Some("Movie".to_string()),
            provider_ids: Some(provider_ids),
            ..Default::default()
        }
    }

    // §8 scenario S4: a webhook add re-indexes the item and checks it
    // against list collections, without touching the watchlist for movies.
    #[tokio::test]
    async fn item_added_reindexes_and_checks_list_collections() {
        let mut emby = MockEmby::new();
        emby.expect_get_item()
            .times(1)
            .withf(|id| id == "emby-1")
            .returning(|_| Ok(movie_item()));

        let mut tmdb = MockTmdb::new();
        tmdb.expect_get_movie_details().times(1).returning(|_| {
            Ok(MovieDetails {
                id: 603,
                title: "The Matrix".to_string(),
                release_date: None,
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
        media_repo.expect_upsert_batch().times(1).returning(|_| Ok(()));
        media_repo.expect_find().times(1).returning(|_, _| Ok(None));

        let person_repo = MockPersonRepo::new();

        let mut collections = MockCollections::new();
        collections.expect_list_active().times(1).returning(|| Ok(vec![]));
        collections
            .expect_match_and_update_list_collections_on_item_add()
            .times(1)
            .withf(|tmdb_id, item_type| tmdb_id == "603" && *item_type == ItemType::Movie)
            .returning(|_, _| Ok(vec![]));

        let watchlists = MockWatchlists::new();

        let propagator = WebhookPropagator::new(
            Arc::new(emby),
            Arc::new(tmdb),
            Arc::new(media_repo),
            Arc::new(person_repo),
            Arc::new(collections),
            Arc::new(watchlists),
        );

        propagator.handle_item_added("emby-1").await.unwrap();
    }

    #[tokio::test]
    async fn item_with_no_tmdb_id_is_skipped() {
        let mut emby = MockEmby::new();
        emby.expect_get_item().times(1).returning(|_| {
            Ok(EmbyItem {
                id: "emby-2".to_string(),
                item_type: Some("Movie".to_string()),
                ..Default::default()
            })
        });

        let tmdb = MockTmdb::new();
        let media_repo = MockMediaRepo::new();
        let person_repo = MockPersonRepo::new();
        let collections = MockCollections::new();
        let watchlists = MockWatchlists::new();

        let propagator = WebhookPropagator::new(
            Arc::new(emby),
            Arc::new(tmdb),
            Arc::new(media_repo),
            Arc::new(person_repo),
            Arc::new(collections),
            Arc::new(watchlists),
        );

        propagator.handle_item_added("emby-2").await.unwrap();
    }
}
