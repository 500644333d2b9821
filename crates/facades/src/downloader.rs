//! Downloader facade — the two subscribe operations listed in §6. The
//! concrete download client (qBittorrent, SABnzbd, ...) is out of scope;
//! this talks to whatever front-end service accepts a subscribe request
//! and reports a boolean outcome.

use async_trait::async_trait;
use reconciler_core::{ReconcileError, Result};
use serde::Serialize;

#[async_trait]
pub trait DownloaderFacade: Send + Sync {
    async fn subscribe_movie(&self, title: &str, tmdb_id: &str) -> Result<bool>;

    async fn subscribe_series(
        &self,
        item_name: &str,
        tmdb_id: &str,
        season_number: Option<i32>,
    ) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl DownloaderConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: std::env::var("DOWNLOADER_BASE_URL")
                .map_err(|_| ReconcileError::config_missing("DOWNLOADER_BASE_URL"))?,
            api_key: std::env::var("DOWNLOADER_API_KEY").ok(),
        })
    }
}

pub struct DownloaderClient {
    config: DownloaderConfig,
    http: reqwest::Client,
}

impl DownloaderClient {
    pub fn new(config: DownloaderConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let builder = self.http.post(url);
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[derive(Serialize)]
struct SubscribeMoviePayload<'a> {
    title: &'a str,
    tmdb_id: &'a str,
}

#[derive(Serialize)]
struct SubscribeSeriesPayload<'a> {
    item_name: &'a str,
    tmdb_id: &'a str,
    season_number: Option<i32>,
}

#[async_trait]
impl DownloaderFacade for DownloaderClient {
    async fn subscribe_movie(&self, title: &str, tmdb_id: &str) -> Result<bool> {
        let response = self
            .request("/subscribe/movie")
            .json(&SubscribeMoviePayload { title, tmdb_id })
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    async fn subscribe_series(
        &self,
        item_name: &str,
        tmdb_id: &str,
        season_number: Option<i32>,
    ) -> Result<bool> {
        let response = self
            .request("/subscribe/series")
            .json(&SubscribeSeriesPayload {
                item_name,
                tmdb_id,
                season_number,
            })
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}
