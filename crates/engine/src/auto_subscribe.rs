//! Auto-Subscribe Gate (§4.7): scans the three snapshot hosts for `MISSING`
//! items whose `release_date` has passed and dispatches them to the
//! downloader, independent of the collection/actor reconcile passes.

use std::sync::Arc;

use chrono::Utc;
use reconciler_core::{
    domain::repositories::{CollectionRepository, WatchlistRepository},
    models::{CollectionType, ItemType, MediaStatus},
    Result,
};
use reconciler_facades::DownloaderFacade;
use tracing::{info, warn};

pub struct AutoSubscribeSummary {
    pub subscribed: usize,
    pub failed: usize,
}

pub struct AutoSubscribeGate {
    downloader: Arc<dyn DownloaderFacade>,
    collection_repo: Arc<dyn CollectionRepository>,
    watchlist_repo: Arc<dyn WatchlistRepository>,
}

impl AutoSubscribeGate {
    pub fn new(
        downloader: Arc<dyn DownloaderFacade>,
        collection_repo: Arc<dyn CollectionRepository>,
        watchlist_repo: Arc<dyn WatchlistRepository>,
    ) -> Self {
        Self {
            downloader,
            collection_repo,
            watchlist_repo,
        }
    }

    pub async fn run(&self) -> Result<AutoSubscribeSummary> {
        let today = Utc::now().date_naive();
        let mut summary = AutoSubscribeSummary {
            subscribed: 0,
            failed: 0,
        };

        self.run_native(today, &mut summary).await?;
        self.run_watchlist(today, &mut summary).await?;
        self.run_list_collections(today, &mut summary).await?;

        info!(
            "auto-subscribe gate: {} subscribed, {} failed",
            summary.subscribed, summary.failed
        );
        Ok(summary)
    }

    async fn run_native(
        &self,
        today: chrono::NaiveDate,
        summary: &mut AutoSubscribeSummary,
    ) -> Result<()> {
        let natives = self.collection_repo.list_native_collections().await?;

        let mut newly_subscribed = Vec::new();
        for native in natives {
            for item in &native.missing_movies {
                if item.status != MediaStatus::Missing {
                    continue;
                }
                if !item.release_date.map(|d| d <= today).unwrap_or(false) {
                    continue;
                }

                match self.downloader.subscribe_movie(&item.title, &item.tmdb_id).await {
                    Ok(true) => newly_subscribed.push(item.tmdb_id.clone()),
                    Ok(false) => {
                        warn!("auto-subscribe gate: downloader rejected '{}'", item.title);
                        summary.failed += 1;
                    }
                    Err(e) => {
                        warn!("auto-subscribe gate: subscribe failed for '{}': {e}", item.title);
                        summary.failed += 1;
                    }
                }
            }
        }

        summary.subscribed += newly_subscribed.len();
        self.collection_repo
            .batch_mark_movies_as_subscribed_in_collections(&newly_subscribed)
            .await
    }

    async fn run_watchlist(
        &self,
        today: chrono::NaiveDate,
        summary: &mut AutoSubscribeSummary,
    ) -> Result<()> {
        let entries = self.watchlist_repo.list_active().await?;

        for entry in entries {
            if entry.missing_seasons.is_empty() {
                continue;
            }

            let mut remaining = Vec::with_capacity(entry.missing_seasons.len());
            let mut changed = false;

            for season in entry.missing_seasons {
                let due = season.air_date.map(|d| d <= today).unwrap_or(false);
                if !due {
                    remaining.push(season);
                    continue;
                }

                match self
                    .downloader
                    .subscribe_series(&entry.tmdb_id, &entry.tmdb_id, Some(season.season_number))
                    .await
                {
                    Ok(true) => {
                        summary.subscribed += 1;
                        changed = true;
                    }
                    Ok(false) => {
                        warn!(
                            "auto-subscribe gate: downloader rejected season {} of {}",
                            season.season_number, entry.tmdb_id
                        );
                        summary.failed += 1;
                        remaining.push(season);
                    }
                    Err(e) => {
                        warn!(
                            "auto-subscribe gate: subscribe failed for season {} of {}: {e}",
                            season.season_number, entry.tmdb_id
                        );
                        summary.failed += 1;
                        remaining.push(season);
                    }
                }
            }

            if changed {
                self.watchlist_repo
                    .persist_missing_seasons(&entry.item_id, &remaining)
                    .await?;
            }
        }

        Ok(())
    }

    async fn run_list_collections(
        &self,
        today: chrono::NaiveDate,
        summary: &mut AutoSubscribeSummary,
    ) -> Result<()> {
        let collections = self.collection_repo.list_active().await?;

        for mut collection in collections.into_iter().filter(|c| c.collection_type == CollectionType::List) {
            // §9 open question: a list collection's subscription API is
            // chosen from its first declared item_type; a collection
            // declaring both movie and series candidates miscategorizes
            // the second type. Accepted gap, not fixed here.
            let subscribe_as = collection
                .definition
                .item_types()
                .first()
                .copied()
                .unwrap_or(ItemType::Movie);

            let mut changed = false;
            for item in collection.generated_media_info.iter_mut() {
                if item.status != MediaStatus::Missing {
                    continue;
                }
                if !item.release_date.map(|d| d <= today).unwrap_or(false) {
                    continue;
                }

                let outcome = match subscribe_as {
                    ItemType::Movie => self.downloader.subscribe_movie(&item.title, &item.tmdb_id).await,
                    ItemType::Series => {
                        self.downloader
                            .subscribe_series(&item.title, &item.tmdb_id, None)
                            .await
                    }
                };

                match outcome {
                    Ok(true) => {
                        item.status = MediaStatus::Subscribed;
                        changed = true;
                        summary.subscribed += 1;
                    }
                    Ok(false) => {
                        warn!("auto-subscribe gate: downloader rejected '{}'", item.title);
                        summary.failed += 1;
                    }
                    Err(e) => {
                        warn!("auto-subscribe gate: subscribe failed for '{}': {e}", item.title);
                        summary.failed += 1;
                    }
                }
            }

            if changed {
                self.collection_repo
                    .persist_snapshot(
                        collection.id,
                        collection.emby_collection_id.as_deref(),
                        &collection.generated_media_info,
                    )
                    .await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use mockall::mock;
    use reconciler_core::models::{CustomCollection, Watchlist};

    mock! {
        Downloader {}
        #[async_trait]
        impl DownloaderFacade for Downloader {
            async fn subscribe_movie(&self, title: &str, tmdb_id: &str) -> Result<bool>;
            async fn subscribe_series(
                &self,
                item_name: &str,
                tmdb_id: &str,
                season_number: Option<i32>,
            ) -> Result<bool>;
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

    fn past_due_movie() -> SnapshotItem {
        SnapshotItem {
            tmdb_id: "603".to_string(),
            item_type: ItemType::Movie,
            title: "The Matrix".to_string(),
            release_date: Some(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()),
            poster_path: None,
            status: MediaStatus::Missing,
        }
    }

    // §8 scenario S3: a native-collection MISSING item whose release date
    // has passed is subscribed exactly once and counted in the summary.
    #[tokio::test]
    async fn past_due_missing_movie_is_subscribed_once() {
        let mut downloader = MockDownloader::new();
        downloader
            .expect_subscribe_movie()
            .times(1)
            .withf(|_, tmdb_id| tmdb_id == "603")
            .returning(|_, _| Ok(true));

        let mut collections = MockCollections::new();
        collections.expect_list_native_collections().times(1).returning(|| {
            Ok(vec![NativeCollection {
                emby_collection_id: "emby-1".to_string(),
                tmdb_collection_id: 10,
                in_library_count: 0,
                has_missing: true,
                missing_movies: vec![past_due_movie()],
            }])
        });
        collections
            .expect_batch_mark_movies_as_subscribed_in_collections()
            .times(1)
            .withf(|ids| ids == ["603".to_string()])
            .returning(|_| Ok(()));
        collections.expect_list_active().times(1).returning(|| Ok(vec![]));

        let mut watchlists = MockWatchlists::new();
        watchlists.expect_list_active().times(1).returning(|| Ok(vec![]));

        let gate = AutoSubscribeGate::new(
            Arc::new(downloader),
            Arc::new(collections),
            Arc::new(watchlists),
        );

        let summary = gate.run().await.unwrap();
        assert_eq!(summary.subscribed, 1);
        assert_eq!(summary.failed, 0);
    }

    // A MISSING item whose release date is still in the future is never
    // offered to the downloader.
    #[tokio::test]
    async fn future_release_is_not_subscribed() {
        let downloader = MockDownloader::new();

        let mut collections = MockCollections::new();
        collections.expect_list_native_collections().times(1).returning(|| {
            Ok(vec![NativeCollection {
                emby_collection_id: "emby-1".to_string(),
                tmdb_collection_id: 10,
                in_library_count: 0,
                has_missing: true,
                missing_movies: vec![SnapshotItem {
                    release_date: Some(NaiveDate::from_ymd_opt(2999, 1, 1).unwrap()),
                    ..past_due_movie()
                }],
            }])
        });
        collections
            .expect_batch_mark_movies_as_subscribed_in_collections()
            .times(1)
            .withf(|ids| ids.is_empty())
            .returning(|_| Ok(()));
        collections.expect_list_active().times(1).returning(|| Ok(vec![]));

        let mut watchlists = MockWatchlists::new();
        watchlists.expect_list_active().times(1).returning(|| Ok(vec![]));

        let gate = AutoSubscribeGate::new(
            Arc::new(downloader),
            Arc::new(collections),
            Arc::new(watchlists),
        );

        let summary = gate.run().await.unwrap();
        assert_eq!(summary.subscribed, 0);
        assert_eq!(summary.failed, 0);
    }
}
