//! Media server (Emby/Jellyfin-compatible) facade — the operations listed
//! in §6. Field names mirror the server's actual JSON casing so the
//! deserializer needs no renaming table beyond `serde`'s defaults.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reconciler_core::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct EmbyLibrary {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "CollectionType")]
    pub collection_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbyPersonRef {
    #[serde(rename = "Id")]
    pub id: Option<String>,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub person_type: Option<String>,
    #[serde(rename = "ProviderIds")]
    pub provider_ids: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbyItem {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub item_type: Option<String>,
    #[serde(rename = "ProviderIds")]
    pub provider_ids: Option<HashMap<String, String>>,
    #[serde(rename = "DateCreated")]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(rename = "DateModified")]
    pub date_modified: Option<DateTime<Utc>>,
    #[serde(rename = "CommunityRating")]
    pub community_rating: Option<f64>,
    #[serde(rename = "Genres")]
    pub genres: Vec<String>,
    #[serde(rename = "Studios")]
    pub studios: Vec<EmbyStudio>,
    #[serde(rename = "ProductionLocations")]
    pub production_locations: Vec<String>,
    #[serde(rename = "People")]
    pub people: Vec<EmbyPersonRef>,
    #[serde(rename = "Tags")]
    pub tags: Vec<String>,
    #[serde(rename = "PremiereDate")]
    pub premiere_date: Option<DateTime<Utc>>,
    #[serde(rename = "ParentId")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbyStudio {
    #[serde(rename = "Name")]
    pub name: String,
}

impl EmbyItem {
    pub fn tmdb_id(&self) -> Option<&str> {
        self.provider_ids
            .as_ref()
            .and_then(|p| p.get("Tmdb").map(|s| s.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct CreateOrUpdateCollectionResult {
    pub collection_id: String,
    pub tmdb_ids_present: Vec<String>,
}

#[async_trait]
pub trait EmbyFacade: Send + Sync {
    async fn get_libraries(&self) -> Result<Vec<EmbyLibrary>>;

    async fn get_items(
        &self,
        library_ids: &[String],
        media_type_filter: Option<&str>,
    ) -> Result<Vec<EmbyItem>>;

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

#[derive(Debug, Clone)]
pub struct EmbyConfig {
    pub base_url: String,
    pub api_key: String,
}

impl EmbyConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: std::env::var("EMBY_BASE_URL")
                .map_err(|_| ReconcileError::config_missing("EMBY_BASE_URL"))?,
            api_key: std::env::var("EMBY_API_KEY")
                .map_err(|_| ReconcileError::config_missing("EMBY_API_KEY"))?,
        })
    }
}

pub struct EmbyClient {
    config: EmbyConfig,
    http: reqwest::Client,
}

impl EmbyClient {
    pub fn new(config: EmbyConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}{}{}api_key={}",
            self.config.base_url.trim_end_matches('/'),
            path,
            if path.contains('?') { "&" } else { "?" },
            self.config.api_key
        )
    }
}

#[derive(Deserialize)]
struct ItemsEnvelope<T> {
    #[serde(rename = "Items")]
    items: Vec<T>,
}

#[async_trait]
impl EmbyFacade for EmbyClient {
    async fn get_libraries(&self) -> Result<Vec<EmbyLibrary>> {
        let envelope: ItemsEnvelope<EmbyLibrary> = self
            .http
            .get(self.url("/Library/VirtualFolders"))
            .send()
            .await?
            .json()
            .await?;
        Ok(envelope.items)
    }

    async fn get_items(
        &self,
        library_ids: &[String],
        media_type_filter: Option<&str>,
    ) -> Result<Vec<EmbyItem>> {
        let fields = "ProviderIds,DateCreated,DateModified,CommunityRating,Genres,Studios,\
                      ProductionLocations,People,Tags,PremiereDate";
        let mut url = self.url(&format!(
            "/Items?Recursive=true&Fields={fields}&ParentId={}",
            library_ids.join(",")
        ));
        if let Some(media_type) = media_type_filter {
            url.push_str(&format!("&IncludeItemTypes={media_type}"));
        }

        let envelope: ItemsEnvelope<EmbyItem> = self.http.get(url).send().await?.json().await?;
        Ok(envelope.items)
    }

    async fn get_item(&self, id: &str) -> Result<EmbyItem> {
        let item: EmbyItem = self
            .http
            .get(self.url(&format!("/Items/{id}")))
            .send()
            .await?
            .json()
            .await?;
        Ok(item)
    }

    async fn get_item_count(&self, parent_id: &str, item_type: &str) -> Result<i64> {
        #[derive(Deserialize)]
        struct CountEnvelope {
            #[serde(rename = "TotalRecordCount")]
            total_record_count: i64,
        }

        let envelope: CountEnvelope = self
            .http
            .get(self.url(&format!(
                "/Items?ParentId={parent_id}&IncludeItemTypes={item_type}&Recursive=true&Limit=0"
            )))
            .send()
            .await?
            .json()
            .await?;
        Ok(envelope.total_record_count)
    }

    async fn create_or_update_collection(
        &self,
        name: &str,
        tmdb_ids: &[String],
        library_ids: &[String],
        item_types: &[String],
    ) -> Result<CreateOrUpdateCollectionResult> {
        #[derive(Serialize)]
        struct Payload<'a> {
            name: &'a str,
            tmdb_ids: &'a [String],
            library_ids: &'a [String],
            item_types: &'a [String],
        }

        #[derive(Deserialize)]
        struct Response {
            #[serde(rename = "Id")]
            id: String,
            #[serde(rename = "TmdbIdsPresent")]
            tmdb_ids_present: Vec<String>,
        }

        let response: Response = self
            .http
            .post(self.url("/Collections"))
            .json(&Payload {
                name,
                tmdb_ids,
                library_ids,
                item_types,
            })
            .send()
            .await?
            .json()
            .await?;

        Ok(CreateOrUpdateCollectionResult {
            collection_id: response.id,
            tmdb_ids_present: response.tmdb_ids_present,
        })
    }

    async fn append_item_to_collection(&self, collection_id: &str, item_id: &str) -> Result<()> {
        self.http
            .post(self.url(&format!(
                "/Collections/{collection_id}/Items?Ids={item_id}"
            )))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn update_person(&self, person_id: &str, name: &str) -> Result<()> {
        #[derive(Serialize)]
        struct Payload<'a> {
            #[serde(rename = "Name")]
            name: &'a str,
        }

        self.http
            .post(self.url(&format!("/Persons/{person_id}")))
            .json(&Payload { name })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn get_library_root_for_item(&self, item_id: &str) -> Result<String> {
        let item = self.get_item(item_id).await?;
        item.parent_id
            .ok_or_else(|| ReconcileError::contract_violation("emby.item", "missing ParentId"))
    }
}
