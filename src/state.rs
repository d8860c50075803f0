use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::config::ScrapeConfig;
use crate::error::StateError;

/// Current on-disk schema version. v1 counted total commits per day; v2
/// counts distinct repositories, so the two series are not comparable.
pub const DATA_VERSION: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub username: String,
    pub user_id: u64,
    pub scrape_start_date: String,
    #[serde(default)]
    pub total_repos: u64,
    #[serde(default)]
    pub data_version: u64,
}

/// The root aggregate: the whole crawl's durable progress.
///
/// Owned exclusively by the running process; loaded once at start, mutated
/// in memory, persisted atomically at checkpoints and at run end. `BTreeMap`
/// and `BTreeSet` keep the serialized document canonically sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlState {
    pub last_updated: Option<String>,
    pub metadata: Metadata,
    /// ISO date -> distinct repository count.
    pub contributions: BTreeMap<String, u64>,
    /// Dates whose most recent attempt exhausted retries.
    pub failed_dates: BTreeSet<String>,
}

impl CrawlState {
    pub fn empty(config: &ScrapeConfig) -> Self {
        CrawlState {
            last_updated: None,
            metadata: Metadata {
                username: config.username.clone(),
                user_id: config.user_id,
                scrape_start_date: config.start_date.to_string(),
                total_repos: 0,
                data_version: DATA_VERSION,
            },
            contributions: BTreeMap::new(),
            failed_dates: BTreeSet::new(),
        }
    }

    /// Load the state file, applying schema migration if the version on
    /// disk is older. A missing file yields a fresh empty state.
    pub fn load(path: &Path, config: &ScrapeConfig) -> Result<Self, StateError> {
        if !path.exists() {
            return Ok(CrawlState::empty(config));
        }
        let raw: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
        let document = match raw["metadata"]["data_version"].as_u64() {
            Some(DATA_VERSION) => raw,
            _ => {
                info!("Migrating state file from v1 to v{}", DATA_VERSION);
                migrate_v1(raw)
            }
        };
        Ok(serde_json::from_value(document)?)
    }

    /// Persist atomically: write a sibling temp file, then rename over the
    /// destination. A crash mid-write leaves the previous version intact.
    pub fn save(&mut self, path: &Path) -> Result<(), StateError> {
        self.last_updated = Some(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string());
        self.metadata.total_repos = self.contributions.values().sum();

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let mut body = serde_json::to_string_pretty(self)?;
        body.push('\n');

        let tmp = path.with_extension("json.tmp");
        let written = fs::write(&tmp, &body).and_then(|_| fs::rename(&tmp, path));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written?;
        Ok(())
    }

    /// Record a successful count. The date leaves the failed set.
    pub fn commit(&mut self, date: &str, count: u64) {
        self.contributions.insert(date.to_string(), count);
        self.failed_dates.remove(date);
    }

    /// Record an exhausted attempt. A stale committed value for the date is
    /// dropped so the series never disagrees with the failed set.
    pub fn mark_failed(&mut self, date: &str) {
        self.contributions.remove(date);
        self.failed_dates.insert(date.to_string());
    }
}

/// Pure v1 -> v2 transition. The commit-count series cannot be reinterpreted
/// as a repository-count series, so the series and failed set reset and the
/// backfill re-collects them.
pub fn migrate_v1(mut document: Value) -> Value {
    if let Some(metadata) = document["metadata"].as_object_mut() {
        metadata.remove("total_commits");
        metadata.insert("total_repos".to_string(), json!(0));
        metadata.insert("data_version".to_string(), json!(DATA_VERSION));
    }
    document["contributions"] = json!({});
    document["failed_dates"] = json!([]);
    document
}

/// Dates whose count was zero in the file as it exists on disk, read without
/// migration. After a schema reset these let the backfill re-commit known
/// zero-commit days without spending a request on each.
pub fn previous_zero_dates(path: &Path) -> BTreeSet<String> {
    let Ok(content) = fs::read_to_string(path) else {
        return BTreeSet::new();
    };
    let Ok(raw) = serde_json::from_str::<Value>(&content) else {
        return BTreeSet::new();
    };
    let Some(contributions) = raw["contributions"].as_object() else {
        return BTreeSet::new();
    };
    contributions
        .iter()
        .filter(|(_, count)| count.as_u64() == Some(0))
        .map(|(date, _)| date.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ScrapeConfig {
        ScrapeConfig {
            username: "octocat".to_string(),
            user_id: 583231,
            ..ScrapeConfig::default()
        }
    }

    #[test]
    fn test_empty_state_carries_query_identity() {
        let state = CrawlState::empty(&test_config());
        assert_eq!(state.metadata.username, "octocat");
        assert_eq!(state.metadata.data_version, DATA_VERSION);
        assert_eq!(state.metadata.scrape_start_date, "2024-01-01");
        assert!(state.last_updated.is_none());
        assert!(state.contributions.is_empty());
        assert!(state.failed_dates.is_empty());
    }

    #[test]
    fn test_commit_clears_failed_marker() {
        let mut state = CrawlState::empty(&test_config());
        state.mark_failed("2024-03-01");
        assert!(state.failed_dates.contains("2024-03-01"));

        state.commit("2024-03-01", 7);
        assert_eq!(state.contributions.get("2024-03-01"), Some(&7));
        assert!(!state.failed_dates.contains("2024-03-01"));
    }

    #[test]
    fn test_mark_failed_drops_stale_count() {
        let mut state = CrawlState::empty(&test_config());
        state.commit("2024-03-01", 7);
        state.mark_failed("2024-03-01");
        assert!(!state.contributions.contains_key("2024-03-01"));
        assert!(state.failed_dates.contains("2024-03-01"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contributions.json");
        let config = test_config();

        let mut state = CrawlState::empty(&config);
        state.commit("2024-03-01", 5);
        state.commit("2024-03-02", 12);
        state.mark_failed("2024-03-03");
        state.save(&path).unwrap();

        let loaded = CrawlState::load(&path, &config).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.metadata.total_repos, 17);
        assert!(loaded.last_updated.is_some());
        // No leftover temp file from the atomic write.
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_load_missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config();
        let state = CrawlState::load(&dir.path().join("absent.json"), &config).unwrap();
        assert_eq!(state, CrawlState::empty(&config));
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("contributions.json");
        let mut state = CrawlState::empty(&test_config());
        state.save(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_migrate_v1_resets_series() {
        let v1 = json!({
            "last_updated": "2024-06-01T00:00:00Z",
            "metadata": {
                "username": "octocat",
                "user_id": 583231,
                "scrape_start_date": "2024-01-01",
                "total_commits": 4242
            },
            "contributions": {"2024-01-01": 17, "2024-01-02": 0},
            "failed_dates": ["2024-01-03"]
        });

        let migrated: CrawlState = serde_json::from_value(migrate_v1(v1)).unwrap();
        assert_eq!(migrated.metadata.data_version, DATA_VERSION);
        assert_eq!(migrated.metadata.total_repos, 0);
        assert!(migrated.contributions.is_empty());
        assert!(migrated.failed_dates.is_empty());
        // Identity fields survive the migration.
        assert_eq!(migrated.metadata.username, "octocat");
    }

    #[test]
    fn test_load_applies_migration_to_versionless_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contributions.json");
        let v1 = json!({
            "last_updated": null,
            "metadata": {
                "username": "octocat",
                "user_id": 583231,
                "scrape_start_date": "2024-01-01",
                "total_commits": 99
            },
            "contributions": {"2024-01-01": 99},
            "failed_dates": []
        });
        fs::write(&path, serde_json::to_string(&v1).unwrap()).unwrap();

        let loaded = CrawlState::load(&path, &test_config()).unwrap();
        assert_eq!(loaded.metadata.data_version, DATA_VERSION);
        assert!(loaded.contributions.is_empty());
    }

    #[test]
    fn test_previous_zero_dates_reads_unmigrated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contributions.json");
        let v1 = json!({
            "metadata": {"username": "octocat", "total_commits": 3},
            "contributions": {"2024-01-01": 3, "2024-01-02": 0, "2024-01-03": 0}
        });
        fs::write(&path, serde_json::to_string(&v1).unwrap()).unwrap();

        let zeros = previous_zero_dates(&path);
        assert_eq!(zeros.len(), 2);
        assert!(zeros.contains("2024-01-02"));
        assert!(zeros.contains("2024-01-03"));
    }

    #[test]
    fn test_previous_zero_dates_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(previous_zero_dates(&dir.path().join("absent.json")).is_empty());
    }

    #[test]
    fn test_serialized_dates_are_sorted() {
        let mut state = CrawlState::empty(&test_config());
        state.commit("2024-03-05", 1);
        state.commit("2024-01-01", 2);
        state.commit("2024-02-10", 3);

        let body = serde_json::to_string_pretty(&state).unwrap();
        let first = body.find("2024-01-01").unwrap();
        let second = body.find("2024-02-10").unwrap();
        let third = body.find("2024-03-05").unwrap();
        assert!(first < second && second < third);
    }
}
