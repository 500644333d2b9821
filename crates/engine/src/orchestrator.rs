//! Task orchestrator (§4.9): a single long-lived registry of the task
//! keys listed in §6, with cooperative cancellation, progress reporting,
//! per-processor-kind single-run guarantees, and per-collection
//! serializability. Generalizes the teacher's `ListSyncScheduler`
//! jobs/running_jobs maps into an ad-hoc task runner rather than a
//! polling scheduler loop — this binary has no daemon, so tasks are
//! dispatched one at a time from the CLI.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use reconciler_core::{
    domain::repositories::{
        ActorSubscriptionRepository, MediaMetadataRepository, PersonIdentityRepository,
        WatchlistRepository,
    },
    models::{ItemType, MissingSeason, PersonIdentityFields},
    ReconcileError, Result,
};
use reconciler_facades::TmdbFacade;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::actor_reconciler::ActorReconciler;
use crate::auto_subscribe::AutoSubscribeGate;
use crate::collection_reconciler::CollectionReconciler;
use crate::library_indexer::{resolve_actor_identities, IndexMode, LibraryIndexer};
use crate::webhook_propagator::WebhookPropagator;

/// Implemented by callers that want `(percent, message)` updates as a
/// task runs. `percent` is `-1` for an error-terminal report, `100` for
/// completion, otherwise a best-effort estimate.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: i32, message: &str);
}

/// Default sink: routes progress through `tracing` at `info`/`error`.
pub struct LoggingProgressSink;

impl ProgressSink for LoggingProgressSink {
    fn report(&self, percent: i32, message: &str) {
        if percent < 0 {
            tracing::error!("{message}");
        } else {
            info!("[{percent}%] {message}");
        }
    }
}

/// The processor families that may not run concurrently with themselves
/// (§5): two `full-scan`s, or a `full-scan` and `populate-metadata`,
/// must not interleave writes to `media_metadata`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ProcessorKind {
    Media,
    Watchlist,
    Actor,
}

/// Cooperative cancellation handle. Unlike the teacher's one-shot
/// `oneshot::Sender<()>` (good for a single await point), this is a
/// re-checkable flag so a task can poll it at many checkpoints across a
/// run rather than only at its single top-level await.
#[derive(Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

struct RunningTask {
    key: String,
    started_at: chrono::DateTime<Utc>,
    token: CancellationToken,
}

/// Ties every engine component together behind the §6 task-key surface.
pub struct Orchestrator {
    library_indexer: Arc<LibraryIndexer>,
    collection_reconciler: Arc<CollectionReconciler>,
    actor_reconciler: Arc<ActorReconciler>,
    auto_subscribe: Arc<AutoSubscribeGate>,
    webhook_propagator: Arc<WebhookPropagator>,

    media_repo: Arc<dyn MediaMetadataRepository>,
    person_repo: Arc<dyn PersonIdentityRepository>,
    actor_repo: Arc<dyn ActorSubscriptionRepository>,
    watchlist_repo: Arc<dyn WatchlistRepository>,
    tmdb: Arc<dyn TmdbFacade>,

    library_ids: Vec<String>,

    running: StdMutex<HashMap<String, RunningTask>>,
    running_kinds: StdMutex<HashSet<ProcessorKind>>,
    collection_locks: AsyncMutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        library_indexer: Arc<LibraryIndexer>,
        collection_reconciler: Arc<CollectionReconciler>,
        actor_reconciler: Arc<ActorReconciler>,
        auto_subscribe: Arc<AutoSubscribeGate>,
        webhook_propagator: Arc<WebhookPropagator>,
        media_repo: Arc<dyn MediaMetadataRepository>,
        person_repo: Arc<dyn PersonIdentityRepository>,
        actor_repo: Arc<dyn ActorSubscriptionRepository>,
        watchlist_repo: Arc<dyn WatchlistRepository>,
        tmdb: Arc<dyn TmdbFacade>,
        library_ids: Vec<String>,
    ) -> Self {
        Self {
            library_indexer,
            collection_reconciler,
            actor_reconciler,
            auto_subscribe,
            webhook_propagator,
            media_repo,
            person_repo,
            actor_repo,
            watchlist_repo,
            tmdb,
            library_ids,
            running: StdMutex::new(HashMap::new()),
            running_kinds: StdMutex::new(HashSet::new()),
            collection_locks: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Requests cancellation of the named task. Returns `false` if no
    /// task is currently running under that key.
    pub fn cancel(&self, task_key: &str) -> bool {
        let running = self.running.lock().unwrap();
        if let Some(task) = running.get(task_key) {
            task.token.cancel();
            true
        } else {
            false
        }
    }

    /// Dispatches one of the §6 task keys. `task_key` carries any
    /// embedded argument already parsed out by the caller (e.g. the
    /// collection id for `process-single-custom-collection`).
    pub async fn run_task(&self, task_key: &str, sink: &dyn ProgressSink) -> Result<()> {
        match task_key {
            "full-scan" => self.run_exclusive("full-scan", ProcessorKind::Media, sink, |token| {
                self.task_full_scan(token, sink)
            }).await,
            "populate-metadata" => self
                .run_exclusive("populate-metadata", ProcessorKind::Media, sink, |token| {
                    self.task_populate_metadata(token, sink)
                })
                .await,
            "sync-person-map" => self
                .run_exclusive("sync-person-map", ProcessorKind::Media, sink, |_token| {
                    self.task_sync_person_map(sink)
                })
                .await,
            "enrich-aliases" => self
                .run_exclusive("enrich-aliases", ProcessorKind::Media, sink, |_token| {
                    self.task_enrich_aliases(sink)
                })
                .await,
            "process-watchlist" => self
                .run_exclusive("process-watchlist", ProcessorKind::Watchlist, sink, |_token| {
                    self.task_process_watchlist(sink)
                })
                .await,
            "refresh-collections" => self
                .run_exclusive("refresh-collections", ProcessorKind::Media, sink, |_token| {
                    self.task_refresh_native_collections(sink)
                })
                .await,
            "custom-collections" => self
                .run_exclusive("custom-collections", ProcessorKind::Media, sink, |_token| {
                    self.task_custom_collections(sink)
                })
                .await,
            "actor-tracking" => self
                .run_exclusive("actor-tracking", ProcessorKind::Actor, sink, |_token| {
                    self.task_actor_tracking(sink)
                })
                .await,
            "auto-subscribe" => self
                .run_exclusive("auto-subscribe", ProcessorKind::Media, sink, |_token| {
                    self.task_auto_subscribe(sink)
                })
                .await,
            _ if task_key.starts_with("process-single-custom-collection(") => {
                let id = parse_i64_arg(task_key, "process-single-custom-collection")?;
                self.run_exclusive_for_collection(id, sink, |_token| {
                    self.task_single_custom_collection(id, sink)
                })
                .await
            }
            _ if task_key.starts_with("scan-actor-media(") => {
                let id = parse_i64_arg(task_key, "scan-actor-media")?;
                self.run_exclusive("scan-actor-media", ProcessorKind::Actor, sink, |_token| {
                    self.task_scan_single_actor(id, sink)
                })
                .await
            }
            _ => Err(ReconcileError::config_missing(format!(
                "unknown task key: {task_key}"
            ))),
        }
    }

    /// Runs a sequence of task keys (`task-chain`), stopping at the first
    /// `Cancelled`/`Fatal` outcome but logging and continuing past a
    /// recoverable one (§7).
    pub async fn run_chain(&self, sequence: &[String], sink: &dyn ProgressSink) -> Result<()> {
        for task_key in sequence {
            match self.run_task(task_key, sink).await {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    warn!("task-chain: '{task_key}' failed recoverably, continuing: {e}");
                }
                Err(e) => {
                    sink.report(-1, &format!("task-chain stopped at '{task_key}': {e}"));
                    return Err(e);
                }
            }
        }
        sink.report(100, "task-chain complete");
        Ok(())
    }

    async fn run_exclusive<'a, F, Fut>(
        &'a self,
        key: &str,
        kind: ProcessorKind,
        sink: &'a dyn ProgressSink,
        body: F,
    ) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = Result<()>> + 'a,
    {
        {
            let mut kinds = self.running_kinds.lock().unwrap();
            if kinds.contains(&kind) {
                return Err(ReconcileError::config_missing(format!(
                    "a {kind:?} task is already running"
                )));
            }
            kinds.insert(kind);
        }

        let token = CancellationToken::new();
        self.running.lock().unwrap().insert(
            key.to_string(),
            RunningTask {
                key: key.to_string(),
                started_at: Utc::now(),
                token: token.clone(),
            },
        );

        let result = body(token).await;

        self.running.lock().unwrap().remove(key);
        self.running_kinds.lock().unwrap().remove(&kind);

        match &result {
            Ok(()) => sink.report(100, &format!("{key} complete")),
            Err(e) => sink.report(-1, &format!("{key} failed: {e}")),
        }
        result
    }

    /// Collection tasks serialize by collection id, not by processor
    /// kind — two different collections reconcile in parallel, the same
    /// collection never does.
    async fn run_exclusive_for_collection<'a, F, Fut>(
        &'a self,
        collection_id: i64,
        sink: &'a dyn ProgressSink,
        body: F,
    ) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = Result<()>> + 'a,
    {
        let lock = {
            let mut locks = self.collection_locks.lock().await;
            locks
                .entry(collection_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        let token = CancellationToken::new();
        let result = body(token).await;
        match &result {
            Ok(()) => sink.report(100, &format!("collection {collection_id} complete")),
            Err(e) => sink.report(-1, &format!("collection {collection_id} failed: {e}")),
        }
        result
    }

    async fn task_full_scan(&self, token: CancellationToken, sink: &dyn ProgressSink) -> Result<()> {
        sink.report(0, "full scan starting");
        let (processed, deleted) = self
            .library_indexer
            .run(&self.library_ids, IndexMode::Deep, || token.is_cancelled())
            .await?;
        sink.report(90, &format!("{processed} indexed, {deleted} removed"));
        Ok(())
    }

    async fn task_populate_metadata(
        &self,
        token: CancellationToken,
        sink: &dyn ProgressSink,
    ) -> Result<()> {
        sink.report(0, "metadata population starting");
        let (processed, deleted) = self
            .library_indexer
            .run(&self.library_ids, IndexMode::Quick, || token.is_cancelled())
            .await?;
        sink.report(90, &format!("{processed} indexed, {deleted} removed"));
        Ok(())
    }

    /// Re-resolves the canonical identity of every cast/crew member
    /// already stored in `media_metadata`, without touching Emby or TMDb.
    /// Useful after a direct database import, mirroring the teacher's
    /// "sync person map" pass.
    async fn task_sync_person_map(&self, sink: &dyn ProgressSink) -> Result<()> {
        let rows = self
            .media_repo
            .find_many(&[ItemType::Movie, ItemType::Series])
            .await?;
        let total = rows.len();
        let mut batch = Vec::with_capacity(rows.len());
        for mut row in rows {
            row.actors = resolve_actor_identities(self.person_repo.as_ref(), row.actors).await;
            row.directors = resolve_actor_identities(self.person_repo.as_ref(), row.directors).await;
            batch.push(row);
        }
        self.media_repo.upsert_batch(&batch).await?;
        sink.report(90, &format!("{total} media rows re-resolved"));
        Ok(())
    }

    /// Refreshes the `PersonIdentityMap` row backing every active actor
    /// subscription from its TMDb person id. This is scoped to the
    /// subscribed-actor identity only: neither `PersonIdentityFields` nor
    /// `TmdbFacade` model "also known as" aliases, so broader alias
    /// scraping isn't implemented.
    async fn task_enrich_aliases(&self, sink: &dyn ProgressSink) -> Result<()> {
        let subscriptions = self.actor_repo.list_active().await?;
        let total = subscriptions.len();
        for sub in &subscriptions {
            let fields = PersonIdentityFields {
                primary_name: Some(sub.display_name.clone()),
                tmdb_person_id: Some(sub.tmdb_person_id),
                ..Default::default()
            };
            if let Err(e) = self.person_repo.upsert_person(&fields).await {
                warn!("enrich-aliases: failed for '{}': {e}", sub.display_name);
            }
        }
        sink.report(90, &format!("{total} tracked actor identities refreshed"));
        Ok(())
    }

    async fn task_process_watchlist(&self, sink: &dyn ProgressSink) -> Result<()> {
        let entries = self.watchlist_repo.list_active().await?;
        let mut updated = 0;

        for entry in entries {
            let details = match self.tmdb.get_tv_details(&entry.tmdb_id).await {
                Ok(details) => details,
                Err(e) => {
                    warn!("process-watchlist: TMDb lookup failed for {}: {e}", entry.tmdb_id);
                    continue;
                }
            };

            let known: HashSet<i32> = entry
                .missing_seasons
                .iter()
                .map(|s| s.season_number)
                .collect();
            let mut merged = entry.missing_seasons.clone();
            let mut changed = false;

            for season in details.seasons {
                if season.season_number == 0 || known.contains(&season.season_number) {
                    continue;
                }
                merged.push(MissingSeason {
                    season_number: season.season_number,
                    air_date: season.air_date,
                });
                changed = true;
            }

            if changed {
                self.watchlist_repo
                    .persist_missing_seasons(&entry.item_id, &merged)
                    .await?;
                updated += 1;
            }
        }

        sink.report(90, &format!("{updated} watchlist entries updated"));
        Ok(())
    }

    async fn task_refresh_native_collections(&self, sink: &dyn ProgressSink) -> Result<()> {
        let outcomes = self.collection_reconciler.run_native_all().await;
        let (ok, failed) = count_outcomes(&outcomes);
        sink.report(90, &format!("{ok} native collections refreshed, {failed} failed"));
        Ok(())
    }

    async fn task_custom_collections(&self, sink: &dyn ProgressSink) -> Result<()> {
        let outcomes = self.collection_reconciler.run_all().await;
        let (ok, failed) = count_outcomes(&outcomes);
        sink.report(90, &format!("{ok} collections refreshed, {failed} failed"));
        Ok(())
    }

    async fn task_single_custom_collection(
        &self,
        collection_id: i64,
        sink: &dyn ProgressSink,
    ) -> Result<()> {
        sink.report(10, &format!("reconciling collection {collection_id}"));
        self.collection_reconciler.reconcile_by_id(collection_id).await
    }

    async fn task_actor_tracking(&self, sink: &dyn ProgressSink) -> Result<()> {
        let outcomes = self.actor_reconciler.run_all().await;
        let (ok, failed) = count_outcomes(&outcomes);
        sink.report(90, &format!("{ok} subscriptions reconciled, {failed} failed"));
        Ok(())
    }

    async fn task_scan_single_actor(&self, subscription_id: i64, sink: &dyn ProgressSink) -> Result<()> {
        sink.report(10, &format!("scanning subscription {subscription_id}"));
        self.actor_reconciler.reconcile_by_id(subscription_id).await
    }

    async fn task_auto_subscribe(&self, sink: &dyn ProgressSink) -> Result<()> {
        let summary = self.auto_subscribe.run().await?;
        sink.report(
            90,
            &format!("{} subscribed, {} failed", summary.subscribed, summary.failed),
        );
        Ok(())
    }

    /// Lists currently-running tasks, for a status endpoint or CLI `ps`.
    pub fn running_tasks(&self) -> Vec<(String, chrono::DateTime<Utc>)> {
        self.running
            .lock()
            .unwrap()
            .values()
            .map(|t| (t.key.clone(), t.started_at))
            .collect()
    }

    pub async fn handle_webhook_item_added(&self, emby_item_id: &str) -> Result<()> {
        self.webhook_propagator.handle_item_added(emby_item_id).await
    }
}

fn count_outcomes<T>(outcomes: &[Result<T>]) -> (usize, usize) {
    let ok = outcomes.iter().filter(|o| o.is_ok()).count();
    (ok, outcomes.len() - ok)
}

fn parse_i64_arg(task_key: &str, prefix: &str) -> Result<i64> {
    let inner = task_key
        .strip_prefix(prefix)
        .and_then(|s| s.strip_prefix('('))
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| {
            ReconcileError::contract_violation("task_key", format!("malformed task key: {task_key}"))
        })?;
    inner
        .parse::<i64>()
        .map_err(|_| ReconcileError::contract_violation("task_key", format!("non-numeric id in {task_key}")))
}
