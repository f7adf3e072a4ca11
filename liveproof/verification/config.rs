use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use shared_logging::LogLevel;

use crate::search::MAX_SEARCH_RESULTS;

/// Top-level service configuration: optional TOML file, then environment overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    /// Search collaborator settings.
    #[serde(default)]
    pub search: SearchSettings,
    /// Result store settings.
    #[serde(default)]
    pub store: StoreSettings,
    /// Telemetry sinks.
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    /// Transient session cache.
    #[serde(default)]
    pub cache: CacheSettings,
}

impl ServiceConfig {
    /// Loads configuration from a TOML file without applying the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading service config {}", path.display()))?;
        let config: Self =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the optional file, then applies process environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from an environment lookup.
    ///
    /// `YOU_API_KEY`, `YOU_STUB`, `YOU_BASE_URL`, `SANITY_PROJECT_ID`, `SANITY_DATASET`,
    /// `SANITY_TOKEN`, `LIVEPROOF_LOG_PATH`, `LIVEPROOF_EVENT_LOG`, `LIVEPROOF_LOG_LEVEL`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(key) = get("YOU_API_KEY") {
            self.search.api_key = Some(key);
        }
        if let Some(flag) = get("YOU_STUB") {
            self.search.stub = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(url) = get("YOU_BASE_URL") {
            self.search.base_url = url;
        }
        if let Some(project) = get("SANITY_PROJECT_ID") {
            self.store.project_id = Some(project);
        }
        if let Some(dataset) = get("SANITY_DATASET") {
            self.store.dataset = dataset;
        }
        if let Some(token) = get("SANITY_TOKEN") {
            self.store.token = Some(token);
        }
        if let Some(path) = get("LIVEPROOF_LOG_PATH") {
            self.telemetry.log_path = Some(PathBuf::from(path));
        }
        if let Some(path) = get("LIVEPROOF_EVENT_LOG") {
            self.telemetry.event_log = Some(PathBuf::from(path));
        }
        if let Some(level) = get("LIVEPROOF_LOG_LEVEL").and_then(|raw| raw.parse().ok()) {
            self.telemetry.min_level = level;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.search.max_results == 0 || self.search.max_results > MAX_SEARCH_RESULTS {
            bail!(
                "search.max_results must be within 1..={MAX_SEARCH_RESULTS}, got {}",
                self.search.max_results
            );
        }
        if self.cache.capacity == 0 {
            bail!("cache.capacity must be positive");
        }
        Ok(())
    }
}

/// Search provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    /// API root.
    #[serde(default = "default_search_base")]
    pub base_url: String,
    /// API key; the stub is used when absent.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Forces the offline stub.
    #[serde(default = "default_true")]
    pub stub: bool,
    /// Request timeout in milliseconds.
    #[serde(default = "default_search_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum records kept from one response.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            base_url: default_search_base(),
            api_key: None,
            stub: true,
            timeout_ms: default_search_timeout_ms(),
            max_results: default_max_results(),
        }
    }
}

impl SearchSettings {
    /// True when the offline stub should answer searches.
    #[must_use]
    pub fn use_stub(&self) -> bool {
        self.stub || self.api_key.as_deref().map_or(true, str::is_empty)
    }
}

/// Remote document store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// Project identifier.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Dataset name.
    #[serde(default = "default_dataset")]
    pub dataset: String,
    /// Write token.
    #[serde(default)]
    pub token: Option<String>,
    /// API version path segment.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            project_id: None,
            dataset: default_dataset(),
            token: None,
            api_version: default_api_version(),
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl StoreSettings {
    /// Remote persistence requires both a project id and a token.
    #[must_use]
    pub fn remote_enabled(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        present(&self.project_id) && present(&self.token)
    }
}

/// Telemetry sink settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetrySettings {
    /// JSON-lines log file.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// JSON-lines event file.
    #[serde(default)]
    pub event_log: Option<PathBuf>,
    /// Minimum level written to the log file.
    #[serde(default)]
    pub min_level: LogLevel,
}

/// Session cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Maximum cached sessions.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

const fn default_true() -> bool {
    true
}

fn default_search_base() -> String {
    "https://api.you.com/v1".into()
}

const fn default_search_timeout_ms() -> u64 {
    15_000
}

const fn default_max_results() -> usize {
    MAX_SEARCH_RESULTS
}

fn default_dataset() -> String {
    "production".into()
}

fn default_api_version() -> String {
    "v2024-01-01".into()
}

const fn default_store_timeout_ms() -> u64 {
    10_000
}

const fn default_cache_capacity() -> usize {
    1_024
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn defaults_use_stub_and_memory_store() {
        let config = ServiceConfig::default();
        assert!(config.search.use_stub());
        assert!(!config.store.remote_enabled());
        assert_eq!(config.search.max_results, 15);
        assert_eq!(config.store.dataset, "production");
        assert_eq!(config.cache.capacity, 1_024);
    }

    #[test]
    fn loads_partial_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("liveproof.toml");
        fs::write(
            &path,
            r#"
[search]
stub = false
api_key = "k"
timeout_ms = 2000

[store]
project_id = "abc"
token = "t"

[telemetry]
min_level = "WARN"
"#,
        )
        .unwrap();
        let config = ServiceConfig::load(&path).unwrap();
        assert!(!config.search.use_stub());
        assert_eq!(config.search.timeout_ms, 2_000);
        assert!(config.store.remote_enabled());
        assert_eq!(config.telemetry.min_level, LogLevel::Warn);
    }

    #[test]
    fn rejects_oversized_result_cap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[search]\nmax_results = 40\n").unwrap();
        assert!(ServiceConfig::load(&path).is_err());
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("YOU_API_KEY", "secret"),
            ("YOU_STUB", "false"),
            ("SANITY_PROJECT_ID", "proj"),
            ("SANITY_TOKEN", "tok"),
            ("SANITY_DATASET", "staging"),
            ("LIVEPROOF_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();
        let mut config = ServiceConfig::default();
        config.apply_env(|key| env.get(key).map(|value| (*value).to_string()));
        assert!(!config.search.use_stub());
        assert!(config.store.remote_enabled());
        assert_eq!(config.store.dataset, "staging");
        assert_eq!(config.telemetry.min_level, LogLevel::Debug);
    }

    #[test]
    fn missing_key_forces_stub() {
        let mut config = ServiceConfig::default();
        config.apply_env(|key| (key == "YOU_STUB").then(|| "0".to_string()));
        assert!(!config.search.stub);
        assert!(config.search.use_stub());
    }
}
