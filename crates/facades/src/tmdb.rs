//! TMDb facade — the operations listed in §6.

use async_trait::async_trait;
use chrono::NaiveDate;
use reconciler_core::{models::ItemType, ReconcileError, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CreditPerson {
    pub id: i64,
    pub name: String,
    pub job: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credits {
    #[serde(default)]
    pub cast: Vec<CreditPerson>,
    #[serde(default)]
    pub crew: Vec<CreditPerson>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductionCountry {
    pub iso_3166_1: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovieDetails {
    pub id: i64,
    pub title: String,
    pub release_date: Option<NaiveDate>,
    pub poster_path: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    #[serde(default)]
    pub genres: Vec<NamedRef>,
    #[serde(default)]
    pub production_countries: Vec<ProductionCountry>,
    pub credits: Option<Credits>,
    pub belongs_to_collection: Option<CollectionRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedRef {
    pub id: Option<i64>,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionRef {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Season {
    pub season_number: i32,
    pub air_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TvDetails {
    pub id: i64,
    pub name: String,
    pub first_air_date: Option<NaiveDate>,
    pub poster_path: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    #[serde(default)]
    pub genres: Vec<NamedRef>,
    #[serde(default)]
    pub origin_country: Vec<String>,
    #[serde(default)]
    pub created_by: Vec<NamedRef>,
    #[serde(default)]
    pub seasons: Vec<Season>,
    pub credits: Option<Credits>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionDetails {
    pub id: i64,
    pub parts: Vec<MovieDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    pub id: i64,
    #[serde(alias = "title", alias = "name")]
    pub title: String,
    #[serde(alias = "release_date", alias = "first_air_date")]
    pub release_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonCredit {
    pub id: i64,
    #[serde(alias = "title", alias = "name")]
    pub title: String,
    #[serde(alias = "release_date", alias = "first_air_date")]
    pub release_date: Option<NaiveDate>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
    /// Set by `get_person_combined_credits` from the envelope this item
    /// came from (`cast` vs `crew` doesn't distinguish movie/tv; the
    /// `media_type` field on the raw response does).
    #[serde(default)]
    pub media_type: String,
}

impl PersonCredit {
    pub fn item_type(&self) -> Option<ItemType> {
        match self.media_type.as_str() {
            "movie" => Some(ItemType::Movie),
            "tv" => Some(ItemType::Series),
            _ => None,
        }
    }
}

#[async_trait]
pub trait TmdbFacade: Send + Sync {
    async fn get_movie_details(&self, tmdb_id: &str) -> Result<MovieDetails>;

    async fn get_tv_details(&self, tmdb_id: &str) -> Result<TvDetails>;

    async fn get_collection_details(&self, tmdb_collection_id: i64) -> Result<CollectionDetails>;

    async fn search_media(&self, title: &str, item_type: ItemType) -> Result<Vec<SearchResult>>;

    async fn resolve_imdb_to_tmdb(
        &self,
        imdb_id: &str,
        item_type: ItemType,
    ) -> Result<Option<String>>;

    async fn get_person_combined_credits(&self, person_id: i64) -> Result<Vec<PersonCredit>>;
}

#[derive(Debug, Clone)]
pub struct TmdbConfig {
    pub api_key: String,
    pub base_url: String,
}

impl TmdbConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: std::env::var("TMDB_API_KEY")
                .map_err(|_| ReconcileError::config_missing("TMDB_API_KEY"))?,
            base_url: std::env::var("TMDB_BASE_URL")
                .unwrap_or_else(|_| "https://api.themoviedb.org/3".to_string()),
        })
    }
}

pub struct TmdbClient {
    config: TmdbConfig,
    http: reqwest::Client,
}

impl TmdbClient {
    pub fn new(config: TmdbConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str, query: &str) -> String {
        format!(
            "{}{}?api_key={}{}{}",
            self.config.base_url.trim_end_matches('/'),
            path,
            self.config.api_key,
            if query.is_empty() { "" } else { "&" },
            query
        )
    }
}

#[async_trait]
impl TmdbFacade for TmdbClient {
    async fn get_movie_details(&self, tmdb_id: &str) -> Result<MovieDetails> {
        let details = self
            .http
            .get(self.url(&format!("/movie/{tmdb_id}"), "append_to_response=credits"))
            .send()
            .await?
            .json()
            .await?;
        Ok(details)
    }

    async fn get_tv_details(&self, tmdb_id: &str) -> Result<TvDetails> {
        let details = self
            .http
            .get(self.url(
                &format!("/tv/{tmdb_id}"),
                "append_to_response=credits,seasons",
            ))
            .send()
            .await?
            .json()
            .await?;
        Ok(details)
    }

    async fn get_collection_details(&self, tmdb_collection_id: i64) -> Result<CollectionDetails> {
        let details = self
            .http
            .get(self.url(&format!("/collection/{tmdb_collection_id}"), ""))
            .send()
            .await?
            .json()
            .await?;
        Ok(details)
    }

    async fn search_media(&self, title: &str, item_type: ItemType) -> Result<Vec<SearchResult>> {
        #[derive(Deserialize)]
        struct SearchEnvelope {
            results: Vec<SearchResult>,
        }

        let endpoint = match item_type {
            ItemType::Movie => "/search/movie",
            ItemType::Series => "/search/tv",
        };
        let envelope: SearchEnvelope = self
            .http
            .get(self.url(endpoint, &format!("query={}", urlencoding_query(title))))
            .send()
            .await?
            .json()
            .await?;
        Ok(envelope.results)
    }

    async fn resolve_imdb_to_tmdb(
        &self,
        imdb_id: &str,
        item_type: ItemType,
    ) -> Result<Option<String>> {
        #[derive(Deserialize)]
        struct FindEnvelope {
            movie_results: Vec<SearchResult>,
            tv_results: Vec<SearchResult>,
        }

        let envelope: FindEnvelope = self
            .http
            .get(self.url(
                &format!("/find/{imdb_id}"),
                "external_source=imdb_id",
            ))
            .send()
            .await?
            .json()
            .await?;

        let result = match item_type {
            ItemType::Movie => envelope.movie_results.first(),
            ItemType::Series => envelope.tv_results.first(),
        };
        Ok(result.map(|r| r.id.to_string()))
    }

    async fn get_person_combined_credits(&self, person_id: i64) -> Result<Vec<PersonCredit>> {
        #[derive(Deserialize)]
        struct CreditsEnvelope {
            cast: Vec<PersonCredit>,
        }

        let envelope: CreditsEnvelope = self
            .http
            .get(self.url(&format!("/person/{person_id}/combined_credits"), ""))
            .send()
            .await?
            .json()
            .await?;
        Ok(envelope.cast)
    }
}

fn urlencoding_query(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
