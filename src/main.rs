//! Thin CLI entry point (§1.1): load config, run migrations, wire the
//! facade clients and repositories behind trait objects, build the
//! orchestrator, and dispatch exactly one named task from argv. There is
//! no daemonized scheduler loop and no HTTP server — those are out of
//! scope per the system's external-collaborator boundary.

mod config;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use config::EngineConfig;
use reconciler_core::domain::repositories::{
    ActorSubscriptionRepository, CollectionRepository, MediaMetadataRepository,
    PersonIdentityRepository, WatchlistRepository,
};
use reconciler_engine::{
    ActorReconciler, AutoSubscribeGate, CollectionReconciler, LibraryIndexer,
    LoggingProgressSink, Orchestrator, WebhookPropagator,
};
use reconciler_facades::{DownloaderClient, EmbyClient, TmdbClient};
use reconciler_infrastructure::database::{create_pool, migrate};
use reconciler_infrastructure::repositories::{
    PostgresActorSubscriptionRepository, PostgresCollectionRepository,
    PostgresMediaMetadataRepository, PostgresPersonIdentityRepository,
    PostgresWatchlistRepository,
};
use reconciler_list_importer::ListImporter;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "reconciler-cli", about = "Media-library reconciliation engine")]
struct Cli {
    #[command(subcommand)]
    task: Task,
}

/// One variant per §6 task key, plus `task-chain` for a sequence.
#[derive(Subcommand)]
enum Task {
    FullScan,
    SyncPersonMap,
    EnrichAliases,
    PopulateMetadata,
    ProcessWatchlist,
    RefreshCollections,
    CustomCollections,
    ProcessSingleCustomCollection(i64),
    ActorTracking,
    ScanActorMedia(i64),
    AutoSubscribe,
    TaskChain { sequence: Vec<String> },
}

impl Task {
    fn task_key(&self) -> String {
        match self {
            Task::FullScan => "full-scan".to_string(),
            Task::SyncPersonMap => "sync-person-map".to_string(),
            Task::EnrichAliases => "enrich-aliases".to_string(),
            Task::PopulateMetadata => "populate-metadata".to_string(),
            Task::ProcessWatchlist => "process-watchlist".to_string(),
            Task::RefreshCollections => "refresh-collections".to_string(),
            Task::CustomCollections => "custom-collections".to_string(),
            Task::ProcessSingleCustomCollection(id) => {
                format!("process-single-custom-collection({id})")
            }
            Task::ActorTracking => "actor-tracking".to_string(),
            Task::ScanActorMedia(id) => format!("scan-actor-media({id})"),
            Task::AutoSubscribe => "auto-subscribe".to_string(),
            Task::TaskChain { .. } => "task-chain".to_string(),
        }
    }
}

fn init_logging(logging: &config::LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let engine_config = EngineConfig::from_env()?;
    init_logging(&engine_config.logging);
    engine_config.validate()?;

    info!("connecting to database");
    let pool = create_pool(engine_config.database.clone()).await?;
    migrate(&pool).await?;

    let media_repo: Arc<dyn MediaMetadataRepository> =
        Arc::new(PostgresMediaMetadataRepository::new(pool.clone()));
    let person_repo: Arc<dyn PersonIdentityRepository> =
        Arc::new(PostgresPersonIdentityRepository::new(pool.clone()));
    let collection_repo: Arc<dyn CollectionRepository> =
        Arc::new(PostgresCollectionRepository::new(pool.clone()));
    let watchlist_repo: Arc<dyn WatchlistRepository> =
        Arc::new(PostgresWatchlistRepository::new(pool.clone()));
    let actor_repo: Arc<dyn ActorSubscriptionRepository> =
        Arc::new(PostgresActorSubscriptionRepository::new(pool.clone()));

    let emby = Arc::new(EmbyClient::new(engine_config.emby.clone()));
    let tmdb = Arc::new(TmdbClient::new(engine_config.tmdb.clone()));
    let downloader = Arc::new(DownloaderClient::new(engine_config.downloader.clone()));

    let mut list_importer =
        ListImporter::new(tmdb.clone(), engine_config.reconciler.list_cache_dir.clone());
    if let Some(script_path) = &engine_config.reconciler.maoyan_script_path {
        list_importer = list_importer.with_maoyan_fetcher(reconciler_list_importer::CommandMaoyanFetcher {
            script_path: script_path.clone(),
            tmdb_api_key: engine_config.tmdb.api_key.clone(),
        });
    }
    let list_importer = Arc::new(list_importer);

    let library_indexer = Arc::new(LibraryIndexer::new(
        emby.clone(),
        tmdb.clone(),
        media_repo.clone(),
        person_repo.clone(),
    ));
    let collection_reconciler = Arc::new(CollectionReconciler::new(
        emby.clone(),
        tmdb.clone(),
        media_repo.clone(),
        collection_repo.clone(),
        list_importer,
        engine_config.reconciler.library_ids.clone(),
    ));
    let actor_reconciler = Arc::new(ActorReconciler::new(
        emby.clone(),
        tmdb.clone(),
        downloader.clone(),
        actor_repo.clone(),
        engine_config.reconciler.library_ids.clone(),
        engine_config.reconciler.subscribe_delay,
    ));
    let auto_subscribe = Arc::new(AutoSubscribeGate::new(
        downloader,
        collection_repo.clone(),
        watchlist_repo.clone(),
    ));
    let webhook_propagator = Arc::new(WebhookPropagator::new(
        emby,
        tmdb.clone(),
        media_repo.clone(),
        person_repo.clone(),
        collection_repo,
        watchlist_repo.clone(),
    ));

    let orchestrator = Orchestrator::new(
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
        engine_config.reconciler.library_ids.clone(),
    );

    let sink = LoggingProgressSink;
    match &cli.task {
        Task::TaskChain { sequence } => orchestrator.run_chain(sequence, &sink).await?,
        task => orchestrator.run_task(&task.task_key(), &sink).await?,
    }

    Ok(())
}
