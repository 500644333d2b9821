//! Actor Subscription Reconciler (§4.6): per-actor filmography diffing
//! against `tracked_actor_media`, with a scan-scoped dedup set to avoid
//! subscribing the same work twice when it appears under two actors.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use reconciler_core::{
    classification::{classify_actor_work, ActorWorkClassification},
    domain::repositories::ActorSubscriptionRepository,
    models::{
        contains_target_script, ActorFilterConfig, ActorSubscription, ItemType, MediaStatus,
        TrackedActorMedia,
    },
    Result,
};
use reconciler_facades::{DownloaderFacade, EmbyFacade, PersonCredit, TmdbFacade};
use tracing::{debug, info, warn};

const RATING_GATE_GRACE_MONTHS: i64 = 6;
const RATING_GATE_MIN_VOTES: i64 = 50;

/// TMDb's genre id → name table (stable, published by TMDb's `/genre/list`
/// endpoint) so `genres_include`/`genres_exclude` can match against the
/// `genre_ids` that `combined_credits` actually returns.
const TMDB_GENRES: &[(i64, &str)] = &[
    (28, "Action"),
    (12, "Adventure"),
    (16, "Animation"),
    (35, "Comedy"),
    (80, "Crime"),
    (99, "Documentary"),
    (18, "Drama"),
    (10751, "Family"),
    (14, "Fantasy"),
    (36, "History"),
    (27, "Horror"),
    (10402, "Music"),
    (9648, "Mystery"),
    (10749, "Romance"),
    (878, "Science Fiction"),
    (10770, "TV Movie"),
    (53, "Thriller"),
    (10752, "War"),
    (37, "Western"),
    (10759, "Action & Adventure"),
    (10762, "Kids"),
    (10763, "News"),
    (10764, "Reality"),
    (10765, "Sci-Fi & Fantasy"),
    (10766, "Soap"),
    (10767, "Talk"),
    (10768, "War & Politics"),
];

fn genre_names(ids: &[i64]) -> Vec<&'static str> {
    ids.iter()
        .filter_map(|id| TMDB_GENRES.iter().find(|(g, _)| g == id).map(|(_, n)| *n))
        .collect()
}

pub struct ActorReconciler {
    emby: Arc<dyn EmbyFacade>,
    tmdb: Arc<dyn TmdbFacade>,
    downloader: Arc<dyn DownloaderFacade>,
    repo: Arc<dyn ActorSubscriptionRepository>,
    library_ids: Vec<String>,
    subscribe_delay: std::time::Duration,
}

impl ActorReconciler {
    pub fn new(
        emby: Arc<dyn EmbyFacade>,
        tmdb: Arc<dyn TmdbFacade>,
        downloader: Arc<dyn DownloaderFacade>,
        repo: Arc<dyn ActorSubscriptionRepository>,
        library_ids: Vec<String>,
        subscribe_delay: std::time::Duration,
    ) -> Self {
        Self {
            emby,
            tmdb,
            downloader,
            repo,
            library_ids,
            subscribe_delay,
        }
    }

    /// Fetches every movie/series tmdb id currently present in Emby, once
    /// per run, so `reconcile_one` can tell an already-owned work apart
    /// from one that still needs subscribing.
    async fn emby_tmdb_ids(&self) -> Result<HashSet<String>> {
        Ok(self
            .emby
            .get_items(&self.library_ids, Some("Movie,Series"))
            .await?
            .into_iter()
            .filter_map(|item| item.tmdb_id().map(|s| s.to_string()))
            .collect())
    }

    /// Scans every active subscription, threading one scan-scoped dedup
    /// set through all of them so the same work is never double-counted.
    pub async fn run_all(&self) -> Vec<Result<()>> {
        let subscriptions = match self.repo.list_active().await {
            Ok(subs) => subs,
            Err(e) => return vec![Err(e)],
        };

        let emby_tmdb_ids = match self.emby_tmdb_ids().await {
            Ok(ids) => ids,
            Err(e) => return vec![Err(e)],
        };

        let mut session_subscribed_ids: HashSet<String> = HashSet::new();
        let mut outcomes = Vec::with_capacity(subscriptions.len());

        for (i, subscription) in subscriptions.iter().enumerate() {
            outcomes.push(
                self.reconcile_one(subscription, &emby_tmdb_ids, &mut session_subscribed_ids)
                    .await,
            );
            if i + 1 < subscriptions.len() {
                tokio::time::sleep(self.subscribe_delay).await;
            }
        }

        outcomes
    }

    /// Reconciles a single subscription by id, for the orchestrator's
    /// `scan-actor-media(id)` task. Its dedup set is scoped to just this
    /// call, since a lone scan has no sibling actors to dedup against.
    pub async fn reconcile_by_id(&self, subscription_id: i64) -> Result<()> {
        let subscription = self
            .repo
            .list_active()
            .await?
            .into_iter()
            .find(|s| s.id == subscription_id)
            .ok_or_else(|| {
                reconciler_core::ReconcileError::contract_violation(
                    "actor_subscriptions",
                    format!("no active subscription with id {subscription_id}"),
                )
            })?;
        let emby_tmdb_ids = self.emby_tmdb_ids().await?;
        let mut dedup = HashSet::new();
        self.reconcile_one(&subscription, &emby_tmdb_ids, &mut dedup).await
    }

    async fn reconcile_one(
        &self,
        subscription: &ActorSubscription,
        emby_tmdb_ids: &HashSet<String>,
        session_subscribed_ids: &mut HashSet<String>,
    ) -> Result<()> {
        let credits = self
            .tmdb
            .get_person_combined_credits(subscription.tmdb_person_id)
            .await?;

        let existing = self.repo.tracked_media(subscription.id).await?;
        let existing_by_id: std::collections::HashMap<&str, &TrackedActorMedia> = existing
            .iter()
            .map(|m| (m.tmdb_media_id.as_str(), m))
            .collect();

        let today = Utc::now().date_naive();
        let filtered: Vec<&PersonCredit> = credits
            .iter()
            .filter(|credit| passes_filter(credit, &subscription.filter_config, today))
            .collect();

        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut insert = Vec::new();
        let mut update = Vec::new();

        for credit in filtered {
            let Some(item_type) = credit.item_type() else {
                continue;
            };
            let tmdb_id = credit.id.to_string();
            if !seen_ids.insert(tmdb_id.clone()) {
                continue;
            }

            let in_library = emby_tmdb_ids.contains(&tmdb_id);
            let previously_subscribed = existing_by_id
                .get(tmdb_id.as_str())
                .map(|m| m.status == MediaStatus::Subscribed)
                .unwrap_or(false);

            let classification = classify_actor_work(
                &tmdb_id,
                in_library,
                previously_subscribed,
                session_subscribed_ids,
                credit.release_date,
                today,
            );

            let status = match classification {
                ActorWorkClassification::NeedsSubscribeAttempt => {
                    let subscribed = match item_type {
                        ItemType::Movie => self.downloader.subscribe_movie(&credit.title, &tmdb_id).await,
                        ItemType::Series => self.downloader.subscribe_series(&credit.title, &tmdb_id, None).await,
                    };
                    match subscribed {
                        Ok(true) => {
                            session_subscribed_ids.insert(tmdb_id.clone());
                            MediaStatus::Subscribed
                        }
                        Ok(false) => {
                            warn!("actor reconciler: downloader rejected '{}'", credit.title);
                            MediaStatus::Missing
                        }
                        Err(e) => {
                            warn!("actor reconciler: subscribe failed for '{}': {e}", credit.title);
                            MediaStatus::Missing
                        }
                    }
                }
                other => other.to_media_status_if_no_attempt_made(),
            };

            let media = TrackedActorMedia {
                subscription_id: subscription.id,
                tmdb_media_id: tmdb_id.clone(),
                item_type,
                title: credit.title.clone(),
                release_date: credit.release_date,
                status,
            };

            match existing_by_id.get(tmdb_id.as_str()) {
                Some(existing_media) if existing_media.status != status => update.push(media),
                Some(_) => {}
                None => insert.push(media),
            }
        }

        let delete: Vec<String> = existing
            .iter()
            .filter(|m| !seen_ids.contains(&m.tmdb_media_id))
            .map(|m| m.tmdb_media_id.clone())
            .collect();

        self.repo
            .apply_diff(subscription.id, &insert, &update, &delete)
            .await?;

        info!(
            "actor reconciler: '{}' — {} inserted, {} updated, {} deleted",
            subscription.display_name,
            insert.len(),
            update.len(),
            delete.len()
        );

        Ok(())
    }
}

fn passes_filter(credit: &PersonCredit, config: &ActorFilterConfig, today: chrono::NaiveDate) -> bool {
    let Some(item_type) = credit.item_type() else {
        return false;
    };
    if !config.media_types.contains(&item_type) {
        return false;
    }

    if let Some(start_year) = config.start_year {
        let year = credit.release_date.map(|d| {
            use chrono::Datelike;
            d.year()
        });
        if year.map(|y| y < start_year).unwrap_or(true) {
            return false;
        }
    }

    let names = genre_names(&credit.genre_ids);
    if !config.genres_include.is_empty() && !config.genres_include.iter().any(|g| names.contains(&g.as_str())) {
        return false;
    }
    if config.genres_exclude.iter().any(|g| names.contains(&g.as_str())) {
        return false;
    }

    if let Some(min_rating) = config.min_rating {
        let vote_count = credit.vote_count.unwrap_or(0);
        let vote_average = credit.vote_average.unwrap_or(0.0);
        let recent = credit
            .release_date
            .map(|d| d >= today - Duration::days(RATING_GATE_GRACE_MONTHS * 30))
            .unwrap_or(false);
        if vote_count > RATING_GATE_MIN_VOTES && vote_average < min_rating && !recent {
            return false;
        }
    }

    if !contains_target_script(&credit.title) {
        debug!("actor reconciler: dropping '{}' — no target-script title", credit.title);
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use reconciler_core::models::ActorSubscriptionStatus;
    use reconciler_facades::{CreateOrUpdateCollectionResult, EmbyItem, EmbyLibrary};

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
            async fn get_movie_details(&self, tmdb_id: &str) -> Result<reconciler_facades::MovieDetails>;
            async fn get_tv_details(&self, tmdb_id: &str) -> Result<reconciler_facades::TvDetails>;
            async fn get_collection_details(&self, tmdb_collection_id: i64) -> Result<reconciler_facades::CollectionDetails>;
            async fn search_media(&self, title: &str, item_type: ItemType) -> Result<Vec<reconciler_facades::SearchResult>>;
            async fn resolve_imdb_to_tmdb(&self, imdb_id: &str, item_type: ItemType) -> Result<Option<String>>;
            async fn get_person_combined_credits(&self, person_id: i64) -> Result<Vec<PersonCredit>>;
        }
    }

    mock! {
        Downloader {}
        #[async_trait]
        impl DownloaderFacade for Downloader {
            async fn subscribe_movie(&self, title: &str, tmdb_id: &str) -> Result<bool>;
            async fn subscribe_series(&self, item_name: &str, tmdb_id: &str, season_number: Option<i32>) -> Result<bool>;
        }
    }

    mock! {
        ActorRepo {}
        #[async_trait]
        impl ActorSubscriptionRepository for ActorRepo {
            async fn list_active(&self) -> Result<Vec<ActorSubscription>>;
            async fn tracked_media(&self, subscription_id: i64) -> Result<Vec<TrackedActorMedia>>;
            async fn apply_diff(
                &self,
                subscription_id: i64,
                insert: &[TrackedActorMedia],
                update: &[TrackedActorMedia],
                delete: &[String],
            ) -> Result<()>;
        }
    }

    fn subscription() -> ActorSubscription {
        ActorSubscription {
            id: 1,
            tmdb_person_id: 1245,
            display_name: "黑客帝国演员".to_string(),
            status: ActorSubscriptionStatus::Active,
            filter_config: ActorFilterConfig::default(),
            last_checked_at: None,
        }
    }

    // §4.5/§4.6 rank-1 precedence: a work already present in Emby must
    // classify IN_LIBRARY even though it would otherwise qualify for a
    // subscribe attempt, and the downloader is never called for it.
    #[tokio::test]
    async fn work_already_in_library_is_not_subscribed() {
        let mut emby = MockEmby::new();
        emby.expect_get_items()
            .times(1)
            .returning(|_, _| Ok(vec![EmbyItem {
                id: "e1".to_string(),
                provider_ids: Some(std::collections::HashMap::from([(
                    "Tmdb".to_string(),
                    "603".to_string(),
                )])),
                item_type: Some("Movie".to_string()),
                ..Default::default()
            }]));

        let mut tmdb = MockTmdb::new();
        tmdb.expect_get_person_combined_credits()
            .times(1)
            .returning(|_| Ok(vec![credit("黑客帝国", "movie")]));

        let downloader = MockDownloader::new();

        let mut repo = MockActorRepo::new();
        repo.expect_list_active().times(1).returning(|| Ok(vec![subscription()]));
        repo.expect_tracked_media().times(1).returning(|_| Ok(vec![]));
        repo.expect_apply_diff()
            .times(1)
            .withf(|_, insert, _, _| insert.len() == 1 && insert[0].status == MediaStatus::InLibrary)
            .returning(|_, _, _, _| Ok(()));

        let reconciler = ActorReconciler::new(
            Arc::new(emby),
            Arc::new(tmdb),
            Arc::new(downloader),
            Arc::new(repo),
            vec!["lib-1".to_string()],
            std::time::Duration::from_secs(0),
        );

        reconciler.reconcile_by_id(1).await.unwrap();
    }

    // A work not yet in the library and not previously subscribed must
    // actually be offered to the downloader before being marked Subscribed.
    #[tokio::test]
    async fn work_needing_subscribe_calls_the_downloader() {
        let mut emby = MockEmby::new();
        emby.expect_get_items().times(1).returning(|_, _| Ok(vec![]));

        let mut tmdb = MockTmdb::new();
        tmdb.expect_get_person_combined_credits()
            .times(1)
            .returning(|_| Ok(vec![credit("黑客帝国", "movie")]));

        let mut downloader = MockDownloader::new();
        downloader
            .expect_subscribe_movie()
            .times(1)
            .withf(|_, tmdb_id| tmdb_id == "603")
            .returning(|_, _| Ok(true));

        let mut repo = MockActorRepo::new();
        repo.expect_list_active().times(1).returning(|| Ok(vec![subscription()]));
        repo.expect_tracked_media().times(1).returning(|_| Ok(vec![]));
        repo.expect_apply_diff()
            .times(1)
            .withf(|_, insert, _, _| insert.len() == 1 && insert[0].status == MediaStatus::Subscribed)
            .returning(|_, _, _, _| Ok(()));

        let reconciler = ActorReconciler::new(
            Arc::new(emby),
            Arc::new(tmdb),
            Arc::new(downloader),
            Arc::new(repo),
            vec!["lib-1".to_string()],
            std::time::Duration::from_secs(0),
        );

        reconciler.reconcile_by_id(1).await.unwrap();
    }

    // A downloader rejection must not be papered over as a fake Subscribed.
    #[tokio::test]
    async fn downloader_rejection_keeps_status_missing() {
        let mut emby = MockEmby::new();
        emby.expect_get_items().times(1).returning(|_, _| Ok(vec![]));

        let mut tmdb = MockTmdb::new();
        tmdb.expect_get_person_combined_credits()
            .times(1)
            .returning(|_| Ok(vec![credit("黑客帝国", "movie")]));

        let mut downloader = MockDownloader::new();
        downloader.expect_subscribe_movie().times(1).returning(|_, _| Ok(false));

        let mut repo = MockActorRepo::new();
        repo.expect_list_active().times(1).returning(|| Ok(vec![subscription()]));
        repo.expect_tracked_media().times(1).returning(|_| Ok(vec![]));
        repo.expect_apply_diff()
            .times(1)
            .withf(|_, insert, _, _| insert.len() == 1 && insert[0].status == MediaStatus::Missing)
            .returning(|_, _, _, _| Ok(()));

        let reconciler = ActorReconciler::new(
            Arc::new(emby),
            Arc::new(tmdb),
            Arc::new(downloader),
            Arc::new(repo),
            vec!["lib-1".to_string()],
            std::time::Duration::from_secs(0),
        );

        reconciler.reconcile_by_id(1).await.unwrap();
    }

    fn credit(title: &str, media_type: &str) -> PersonCredit {
        PersonCredit {
            id: 603,
            title: title.to_string(),
            release_date: Some("2020-01-01".parse().unwrap()),
            vote_average: Some(8.0),
            vote_count: Some(1000),
            genre_ids: vec![28],
            media_type: media_type.to_string(),
        }
    }

    fn config() -> ActorFilterConfig {
        ActorFilterConfig::default()
    }

    #[test]
    fn latin_only_title_fails_the_target_script_gate() {
        let today = "2024-01-01".parse().unwrap();
        assert!(!passes_filter(&credit("The Matrix", "movie"), &config(), today));
    }

    #[test]
    fn cjk_title_passes_the_target_script_gate() {
        let today = "2024-01-01".parse().unwrap();
        assert!(passes_filter(&credit("黑客帝国", "movie"), &config(), today));
    }

    #[test]
    fn media_type_not_in_config_is_excluded() {
        let mut cfg = config();
        cfg.media_types = vec![ItemType::Series];
        let today = "2024-01-01".parse().unwrap();
        assert!(!passes_filter(&credit("黑客帝国", "movie"), &cfg, today));
    }

    #[test]
    fn genres_exclude_wins_over_no_include_list() {
        let mut cfg = config();
        cfg.genres_exclude = vec!["Action".to_string()];
        let today = "2024-01-01".parse().unwrap();
        assert!(!passes_filter(&credit("黑客帝国", "movie"), &cfg, today));
    }

    #[test]
    fn low_rated_old_work_with_enough_votes_is_excluded() {
        let mut cfg = config();
        cfg.min_rating = Some(7.0);
        let mut low_rated = credit("黑客帝国", "movie");
        low_rated.vote_average = Some(4.0);
        low_rated.vote_count = Some(5000);
        low_rated.release_date = Some("2010-01-01".parse().unwrap());
        let today = "2024-01-01".parse().unwrap();
        assert!(!passes_filter(&low_rated, &cfg, today));
    }

    #[test]
    fn genre_names_maps_known_tmdb_ids() {
        assert_eq!(genre_names(&[28, 12]), vec!["Action", "Adventure"]);
        assert!(genre_names(&[999999]).is_empty());
    }
}
