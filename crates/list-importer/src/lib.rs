//! Resolves a `list`-type collection's URL definition to TMDb ids (§4.4).

pub mod maoyan;
pub mod rss;

use std::path::PathBuf;
use std::sync::Arc;

use reconciler_core::models::{ItemType, ListDefinition};
use reconciler_facades::TmdbFacade;
use tracing::warn;

pub use maoyan::{CommandMaoyanFetcher, MaoyanResultItem, MaoyanSpec};
pub use rss::RssCandidate;

/// One resolved candidate, ready to be deduplicated into a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedItem {
    pub tmdb_id: String,
    pub item_type: ItemType,
}

impl ResolvedItem {
    fn dedup_key(&self) -> String {
        format!("{}-{}", self.item_type, self.tmdb_id)
    }
}

pub struct ListImporter {
    http: reqwest::Client,
    tmdb: Arc<dyn TmdbFacade>,
    maoyan_fetcher: Option<CommandMaoyanFetcher>,
    cache_dir: PathBuf,
}

impl ListImporter {
    pub fn new(tmdb: Arc<dyn TmdbFacade>, cache_dir: PathBuf) -> Self {
        Self {
            http: reqwest::Client::new(),
            tmdb,
            maoyan_fetcher: None,
            cache_dir,
        }
    }

    pub fn with_maoyan_fetcher(mut self, fetcher: CommandMaoyanFetcher) -> Self {
        self.maoyan_fetcher = Some(fetcher);
        self
    }

    /// Resolves `definition.url` (either an RSS-like `http(s)://` feed or a
    /// `maoyan://` platform list) into a deduplicated `{tmdb_id, item_type}`
    /// set. Network/parse failures of either backend yield an empty result
    /// rather than propagating — the reconciler continues with whatever
    /// other collections it has.
    pub async fn resolve(&self, definition: &ListDefinition) -> Vec<ResolvedItem> {
        let resolved = if definition.url.starts_with("maoyan://") {
            self.resolve_maoyan(definition).await
        } else {
            self.resolve_rss(definition).await
        };

        // §4.4: limit is applied by each backend before resolution; dedup
        // happens last, here, across the whole resolved set.
        let mut seen = std::collections::HashSet::new();
        resolved
            .into_iter()
            .filter(|item| seen.insert(item.dedup_key()))
            .collect()
    }

    async fn resolve_rss(&self, definition: &ListDefinition) -> Vec<ResolvedItem> {
        let candidates = rss::fetch_candidates(&self.http, &definition.url, definition.limit).await;
        rss::resolve_all(self.tmdb.clone(), candidates, definition.item_type.clone())
            .await
            .into_iter()
            .map(|(tmdb_id, item_type)| ResolvedItem { tmdb_id, item_type })
            .collect()
    }

    async fn resolve_maoyan(&self, definition: &ListDefinition) -> Vec<ResolvedItem> {
        let Some(spec) = maoyan::parse_maoyan_url(&definition.url, definition.limit) else {
            warn!("list importer: unparseable maoyan url {}", definition.url);
            return Vec::new();
        };

        let Some(fetcher) = &self.maoyan_fetcher else {
            warn!("list importer: no maoyan fetcher configured, skipping {}", definition.url);
            return Vec::new();
        };

        fetcher
            .fetch(&spec, &self.cache_dir)
            .await
            .into_iter()
            .map(|item| ResolvedItem {
                tmdb_id: item.tmdb_id,
                item_type: item.item_type,
            })
            .collect()
    }
}
