//! Store configuration (`.tagsift/config.toml`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_TOML: &str = "config.toml";

/// Default contents written by `TagStore::init`
pub const DEFAULT_CONFIG_TOML: &str = r#"[store]
busy_timeout_ms = 5000

[query]
delimiter = "@"  # Everything after it is ignored by the cache key
all_tag = "ALL"  # Pseudo-tag matching every object

[cache]
invalidation = "scoped"  # "scoped" (by provenance) or "flush-all"
"#;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagsiftConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How long a connection waits on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Reserved query delimiter marker
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Reserved "match everything" pseudo-tag
    #[serde(default = "default_all_tag")]
    pub all_tag: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            all_tag: default_all_tag(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub invalidation: InvalidationPolicy,
}

/// What a tag mutation drops from the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidationPolicy {
    /// Only entries whose provenance (or rows) involve the mutated tag/object
    #[default]
    Scoped,
    /// Every entry
    FlushAll,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_delimiter() -> String {
    "@".to_string()
}

fn default_all_tag() -> String {
    "ALL".to_string()
}

/// Load configuration from `<store_dir>/config.toml`
///
/// Falls back to defaults if the file or any section is missing.
pub fn load_config(store_dir: &Path) -> Result<TagsiftConfig> {
    let config_path = store_dir.join(CONFIG_TOML);

    if !config_path.exists() {
        log::debug!("No config.toml found, using defaults");
        return Ok(TagsiftConfig::default());
    }

    let config_str = std::fs::read_to_string(&config_path)
        .context("Failed to read config.toml")?;

    let config: TagsiftConfig = toml::from_str(&config_str)
        .context("Failed to parse config.toml")?;

    if config.query.delimiter.is_empty() {
        anyhow::bail!("[query] delimiter must not be empty");
    }

    log::debug!("Loaded config: {:?}", config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path()).unwrap();
        assert_eq!(config, TagsiftConfig::default());
        assert_eq!(config.query.delimiter, "@");
        assert_eq!(config.cache.invalidation, InvalidationPolicy::Scoped);
    }

    #[test]
    fn test_default_file_matches_defaults() {
        let parsed: TagsiftConfig = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(parsed, TagsiftConfig::default());
    }

    #[test]
    fn test_partial_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_TOML),
            "[cache]\ninvalidation = \"flush-all\"\n",
        )
        .unwrap();

        let config = load_config(temp.path()).unwrap();
        assert_eq!(config.cache.invalidation, InvalidationPolicy::FlushAll);
        assert_eq!(config.store.busy_timeout_ms, 5000);
        assert_eq!(config.query.all_tag, "ALL");
    }

    #[test]
    fn test_empty_delimiter_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_TOML), "[query]\ndelimiter = \"\"\n").unwrap();
        assert!(load_config(temp.path()).is_err());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_TOML), "[cache]\ninvalidation = \"never\"\n").unwrap();
        assert!(load_config(temp.path()).is_err());
    }
}
