//! RSS-like URL backend (§4.4 branch 1): fetch XML, parse `channel/item`,
//! extract ids embedded in `guid`/`link`, normalize titles, resolve
//! against TMDb.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use reconciler_core::models::ItemType;
use reconciler_facades::{fan_out, TmdbFacade, DEFAULT_WORKER_CAP};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Deserialize)]
struct RssDocument {
    channel: RssChannel,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RssChannel {
    #[serde(default, rename = "item")]
    items: Vec<RssItemXml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RssItemXml {
    #[serde(default)]
    title: String,
    #[serde(default)]
    guid: String,
    #[serde(default)]
    link: String,
}

/// A raw `<item>` with its extracted identifiers, before title resolution.
#[derive(Debug, Clone)]
pub struct RssCandidate {
    pub title: String,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<String>,
}

fn imdb_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)tt\d{7,8}").unwrap())
}

fn tmdb_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)tmdb://(\d+)").unwrap())
}

fn rank_prefix_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+\.\s*").unwrap())
}

fn trailing_year_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\(\d{4}\)\s*$").unwrap())
}

fn season_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*?)\s*第([一二三四五六七八九十百\d]+)季\s*$").unwrap())
}

fn chinese_numeral(s: &str) -> Option<i32> {
    if let Ok(n) = s.parse::<i32>() {
        return Some(n);
    }
    let map: HashMap<&str, i32> = [
        ("一", 1),
        ("二", 2),
        ("三", 3),
        ("四", 4),
        ("五", 5),
        ("六", 6),
        ("七", 7),
        ("八", 8),
        ("九", 9),
        ("十", 10),
        ("十一", 11),
        ("十二", 12),
        ("十三", 13),
        ("十四", 14),
        ("十五", 15),
    ]
    .into_iter()
    .collect();
    map.get(s).copied()
}

/// Strips a leading `NN.` rank prefix and a trailing `(YYYY)` suffix.
pub fn normalize_title(title: &str) -> String {
    let stripped = rank_prefix_regex().replace(title, "");
    trailing_year_regex().replace(&stripped, "").trim().to_string()
}

/// Extracts `(base_title, season_number)` if the title ends in a CJK
/// `第X季` ordinal marker.
pub fn detect_season(title: &str) -> Option<(String, i32)> {
    let caps = season_regex().captures(title)?;
    let base = caps.get(1)?.as_str().trim().to_string();
    let season = chinese_numeral(caps.get(2)?.as_str())?;
    Some((base, season))
}

fn extract_ids(text: &str) -> (Option<String>, Option<String>) {
    let imdb_id = imdb_regex().find(text).map(|m| m.as_str().to_string());
    let tmdb_id = tmdb_regex()
        .captures(text)
        .map(|c| c[1].to_string());
    (imdb_id, tmdb_id)
}

/// Fetches and parses one RSS-like feed into candidates, applying `limit`
/// (a head-truncation) before any resolution happens.
pub async fn fetch_candidates(
    http: &reqwest::Client,
    url: &str,
    limit: Option<usize>,
) -> Vec<RssCandidate> {
    let body = match http.get(url).send().await {
        Ok(response) => match response.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!("list importer: failed reading RSS body from {url}: {e}");
                return Vec::new();
            }
        },
        Err(e) => {
            warn!("list importer: failed fetching RSS feed {url}: {e}");
            return Vec::new();
        }
    };

    let document: RssDocument = match quick_xml::de::from_str(&body) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("list importer: malformed RSS XML from {url}: {e}");
            return Vec::new();
        }
    };

    let mut items: Vec<RssItemXml> = document.channel.items;
    if let Some(limit) = limit {
        items.truncate(limit);
    }

    items
        .into_iter()
        .map(|item| {
            let combined = format!("{} {}", item.guid, item.link);
            let (imdb_id, tmdb_id) = extract_ids(&combined);
            RssCandidate {
                title: item.title,
                imdb_id,
                tmdb_id,
            }
        })
        .collect()
}

/// Resolves one candidate against TMDb: a full id-only pass across every
/// declared `item_type` first, falling back to a title-only pass across
/// every declared `item_type` only if the id pass entirely misses. Kept
/// as two separate passes rather than interleaved per type, so a
/// spurious title match under an earlier-declared type can never win
/// over a valid id match under a later-declared one.
/// Series titles carrying a `第X季` marker are validated against the
/// show's season list; an absent season rejects the match.
pub async fn resolve_candidate(
    tmdb: &dyn TmdbFacade,
    candidate: &RssCandidate,
    item_types: &[ItemType],
) -> Option<(String, ItemType)> {
    for &item_type in item_types {
        if let Some(tmdb_id) = &candidate.tmdb_id {
            return Some((tmdb_id.clone(), item_type));
        }

        if let Some(imdb_id) = &candidate.imdb_id {
            if let Ok(Some(tmdb_id)) = tmdb.resolve_imdb_to_tmdb(imdb_id, item_type).await {
                return Some((tmdb_id, item_type));
            }
        }
    }

    for &item_type in item_types {
        let normalized = normalize_title(&candidate.title);
        let (search_title, season) = match item_type {
            ItemType::Series => match detect_season(&normalized) {
                Some((base, season)) => (base, Some(season)),
                None => (normalized.clone(), None),
            },
            ItemType::Movie => (normalized.clone(), None),
        };

        let results = match tmdb.search_media(&search_title, item_type).await {
            Ok(results) => results,
            Err(e) => {
                debug!("list importer: search failed for '{search_title}': {e}");
                continue;
            }
        };

        let Some(top) = results.first() else {
            continue;
        };

        if let Some(season_number) = season {
            match tmdb.get_tv_details(&top.id.to_string()).await {
                Ok(details) => {
                    if !details.seasons.iter().any(|s| s.season_number == season_number) {
                        debug!(
                            "list importer: rejecting '{}' — season {season_number} not found",
                            candidate.title
                        );
                        continue;
                    }
                }
                Err(_) => continue,
            }
        }

        return Some((top.id.to_string(), item_type));
    }

    None
}

/// Resolves a whole batch of candidates concurrently, bounded by the
/// standard worker cap.
pub async fn resolve_all(
    tmdb: Arc<dyn TmdbFacade>,
    candidates: Vec<RssCandidate>,
    item_types: Vec<ItemType>,
) -> Vec<(String, ItemType)> {
    fan_out(candidates, DEFAULT_WORKER_CAP, move |candidate| {
        let tmdb = tmdb.clone();
        let item_types = item_types.clone();
        async move { resolve_candidate(tmdb.as_ref(), &candidate, &item_types).await }
    })
    .await
    .into_iter()
    .flatten()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_rank_prefix_and_year() {
        assert_eq!(normalize_title("12. The Matrix (1999)"), "The Matrix");
        assert_eq!(normalize_title("Inception"), "Inception");
    }

    #[test]
    fn detects_cjk_season_marker() {
        let (base, season) = detect_season("庆余年 第二季").unwrap();
        assert_eq!(base, "庆余年");
        assert_eq!(season, 2);
    }

    #[test]
    fn no_season_marker_returns_none() {
        assert!(detect_season("The Matrix").is_none());
    }

    #[test]
    fn extracts_imdb_and_tmdb_ids() {
        let (imdb, tmdb) = extract_ids("guid tt1375666, see tmdb://27205 too");
        assert_eq!(imdb.as_deref(), Some("tt1375666"));
        assert_eq!(tmdb.as_deref(), Some("27205"));
    }
}
