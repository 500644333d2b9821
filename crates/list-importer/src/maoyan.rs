//! `maoyan://` platform backend (§4.4 branch 2, §6 grammar). Execution is
//! delegated to an external fetcher process; this module owns only URL
//! parsing and the 24h atomic on-disk cache (§5: subprocess output must be
//! waited on with a timeout, temp files removed on every exit path).

use std::path::{Path, PathBuf};
use std::time::Duration;

use reconciler_core::{models::ItemType, ReconcileError, Result};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

const VALID_PLATFORMS: &[&str] = &["tencent", "iqiyi", "youku", "mango"];
const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const FETCH_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq)]
pub struct MaoyanSpec {
    pub platform: String,
    pub types: Vec<String>,
    pub limit: usize,
}

/// Parses `maoyan://<type-spec>[-<platform>]`.
pub fn parse_maoyan_url(url: &str, limit: Option<usize>) -> Option<MaoyanSpec> {
    let content = url.strip_prefix("maoyan://")?;
    let parts: Vec<&str> = content.split('-').collect();

    let (type_part, platform) = match parts.split_last() {
        Some((last, rest)) if !rest.is_empty() && VALID_PLATFORMS.contains(last) => {
            (rest.join("-"), last.to_string())
        }
        _ => (content.to_string(), "all".to_string()),
    };

    let types: Vec<String> = type_part
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if types.is_empty() {
        return None;
    }

    Some(MaoyanSpec {
        platform,
        types,
        limit: limit.unwrap_or(50),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaoyanResultItem {
    pub tmdb_id: String,
    pub item_type: ItemType,
}

/// Delegates fetching to an external process, treated as a black box; the
/// reconciler knows only its argv contract.
pub struct CommandMaoyanFetcher {
    pub script_path: PathBuf,
    pub tmdb_api_key: String,
}

impl CommandMaoyanFetcher {
    pub async fn fetch(&self, spec: &MaoyanSpec, cache_dir: &Path) -> Vec<MaoyanResultItem> {
        let cache_key = cache_key(spec);
        if let Some(cached) = read_cache(cache_dir, &cache_key) {
            return cached;
        }

        let temp_output = cache_dir.join(format!("maoyan_temp_output_{cache_key}.json"));
        let result = self.invoke(spec, &temp_output).await;
        let _ = tokio::fs::remove_file(&temp_output).await;

        match result {
            Ok(items) => {
                write_cache(cache_dir, &cache_key, &items);
                items
            }
            Err(e) => {
                warn!("list importer: maoyan fetch failed: {e}");
                Vec::new()
            }
        }
    }

    async fn invoke(&self, spec: &MaoyanSpec, output_path: &Path) -> Result<Vec<MaoyanResultItem>> {
        let mut command = Command::new(&self.script_path);
        command
            .arg("--api-key")
            .arg(&self.tmdb_api_key)
            .arg("--output-file")
            .arg(output_path)
            .arg("--num")
            .arg(spec.limit.to_string())
            .arg("--platform")
            .arg(&spec.platform)
            .arg("--types")
            .args(&spec.types);

        let output = timeout(FETCH_TIMEOUT, command.output())
            .await
            .map_err(|_| ReconcileError::transient("maoyan_fetcher", "timed out after 10 minutes"))?
            .map_err(|e| ReconcileError::transient("maoyan_fetcher", e))?;

        if !output.status.success() {
            return Err(ReconcileError::transient(
                "maoyan_fetcher",
                format!(
                    "exited with {:?}: {}",
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr)
                ),
            ));
        }

        let contents = tokio::fs::read_to_string(output_path)
            .await
            .map_err(|e| ReconcileError::contract_violation("maoyan_fetcher.output", e))?;

        serde_json::from_str(&contents)
            .map_err(|e| ReconcileError::contract_violation("maoyan_fetcher.output", e))
    }
}

fn cache_key(spec: &MaoyanSpec) -> String {
    format!("{}_{}_{}", spec.platform, spec.types.join(","), spec.limit)
        .replace(['/', ' '], "_")
}

fn read_cache(cache_dir: &Path, key: &str) -> Option<Vec<MaoyanResultItem>> {
    let path = cache_dir.join(format!("maoyan_cache_{key}.json"));
    let metadata = std::fs::metadata(&path).ok()?;
    let modified = metadata.modified().ok()?;
    if modified.elapsed().ok()? > CACHE_TTL {
        return None;
    }
    let contents = std::fs::read_to_string(&path).ok()?;
    serde_json::from_str(&contents).ok()
}

fn write_cache(cache_dir: &Path, key: &str, items: &[MaoyanResultItem]) {
    let path = cache_dir.join(format!("maoyan_cache_{key}.json"));
    let temp_path = cache_dir.join(format!("maoyan_cache_{key}.json.tmp"));

    let Ok(json) = serde_json::to_string(items) else {
        return;
    };
    if std::fs::write(&temp_path, json).is_ok() {
        let _ = std::fs::rename(&temp_path, &path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_url_with_platform_suffix() {
        let spec = parse_maoyan_url("maoyan://movie,tv-tencent", Some(20)).unwrap();
        assert_eq!(spec.platform, "tencent");
        assert_eq!(spec.types, vec!["movie", "tv"]);
        assert_eq!(spec.limit, 20);
    }

    #[test]
    fn defaults_platform_to_all_when_absent() {
        let spec = parse_maoyan_url("maoyan://movie", None).unwrap();
        assert_eq!(spec.platform, "all");
        assert_eq!(spec.limit, 50);
    }

    #[test]
    fn unrecognized_trailing_segment_is_kept_as_a_type() {
        let spec = parse_maoyan_url("maoyan://movie-unknownplatform", None).unwrap();
        assert_eq!(spec.platform, "all");
        assert_eq!(spec.types, vec!["movie-unknownplatform"]);
    }

    #[test]
    fn cache_round_trips_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let spec = MaoyanSpec {
            platform: "tencent".to_string(),
            types: vec!["movie".to_string()],
            limit: 10,
        };
        let items = vec![MaoyanResultItem {
            tmdb_id: "603".to_string(),
            item_type: ItemType::Movie,
        }];

        assert!(read_cache(dir.path(), &cache_key(&spec)).is_none());
        write_cache(dir.path(), &cache_key(&spec), &items);

        let cached = read_cache(dir.path(), &cache_key(&spec)).expect("cache hit");
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].tmdb_id, "603");
    }

    #[test]
    fn cache_write_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let spec = MaoyanSpec {
            platform: "all".to_string(),
            types: vec!["tv".to_string()],
            limit: 5,
        };
        write_cache(dir.path(), &cache_key(&spec), &[]);

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "only the final cache file should remain, no .tmp");
    }
}
