//! Application configuration: one `EngineConfig` composed of the
//! per-concern configs each crate already owns, plus the two pieces that
//! only make sense at the binary level — reconciler tuning knobs and
//! logging.

use std::path::PathBuf;
use std::time::Duration;

use reconciler_core::{ReconcileError, Result};
use reconciler_facades::{DownloaderConfig, EmbyConfig, TmdbConfig};
use reconciler_infrastructure::database::DatabaseConfig;
use serde::{Deserialize, Serialize};

/// Reconciler-specific tuning: which libraries to index, how fast to walk
/// actor subscriptions, and where the list importer's maoyan cache lives.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub library_ids: Vec<String>,
    pub subscribe_delay: Duration,
    pub list_cache_dir: PathBuf,
    pub maoyan_script_path: Option<PathBuf>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            library_ids: Vec::new(),
            subscribe_delay: Duration::from_secs(2),
            list_cache_dir: PathBuf::from("./cache/lists"),
            maoyan_script_path: None,
        }
    }
}

impl ReconcilerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ids) = std::env::var("RECONCILER_LIBRARY_IDS") {
            config.library_ids = ids
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(secs) = std::env::var("RECONCILER_SUBSCRIBE_DELAY_SECS") {
            if let Ok(secs) = secs.parse() {
                config.subscribe_delay = Duration::from_secs(secs);
            }
        }
        if let Ok(dir) = std::env::var("RECONCILER_LIST_CACHE_DIR") {
            config.list_cache_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("RECONCILER_MAOYAN_SCRIPT_PATH") {
            config.maoyan_script_path = Some(PathBuf::from(path));
        }

        config
    }
}

/// Log level, format, and optional file sink for `tracing-subscriber`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
    pub log_file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            log_file: None,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("RECONCILER_LOG_LEVEL") {
            config.level = level;
        }
        if let Ok(json) = std::env::var("RECONCILER_LOG_JSON") {
            config.json_format = json == "1" || json.eq_ignore_ascii_case("true");
        }
        if let Ok(file) = std::env::var("RECONCILER_LOG_FILE") {
            config.log_file = Some(file);
        }

        config
    }
}

/// Top-level configuration, loaded once at process start and handed to
/// every facade client/repository constructor during bootstrap.
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub emby: EmbyConfig,
    pub tmdb: TmdbConfig,
    pub downloader: DownloaderConfig,
    pub reconciler: ReconcilerConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Loads every sub-config from its own environment variables, per
    /// each crate's `from_env()`. `EmbyConfig`/`TmdbConfig` fail fast
    /// (`ConfigMissing`) if their required keys are absent.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database: DatabaseConfig::from_env(),
            emby: EmbyConfig::from_env()?,
            tmdb: TmdbConfig::from_env()?,
            downloader: DownloaderConfig::from_env()?,
            reconciler: ReconcilerConfig::from_env(),
            logging: LoggingConfig::from_env(),
        })
    }

    /// Final guard before any task runs: catches a config assembled by
    /// hand (e.g. in tests) with required fields left empty, which
    /// `from_env()`'s per-field fallbacks wouldn't otherwise catch.
    pub fn validate(&self) -> Result<()> {
        if self.database.database_url.trim().is_empty() {
            return Err(ReconcileError::config_missing("database.database_url"));
        }
        if self.emby.base_url.trim().is_empty() {
            return Err(ReconcileError::config_missing("emby.base_url"));
        }
        if self.emby.api_key.trim().is_empty() {
            return Err(ReconcileError::config_missing("emby.api_key"));
        }
        if self.tmdb.api_key.trim().is_empty() {
            return Err(ReconcileError::config_missing("tmdb.api_key"));
        }
        if self.downloader.base_url.trim().is_empty() {
            return Err(ReconcileError::config_missing("downloader.base_url"));
        }
        if self.reconciler.library_ids.is_empty() {
            tracing::warn!("RECONCILER_LIBRARY_IDS is empty — the library indexer will index nothing");
        }

        Ok(())
    }
}
