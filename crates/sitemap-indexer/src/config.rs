//! Indexer configuration: defaults, environment overrides.

use crate::budget::{MemoryLimit, DEFAULT_MAX_DURATION, MEMORY_SAFETY_MARGIN};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Items requested per page from a paged source.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

pub const ENV_MAX_DURATION_SECS: &str = "SITEMAP_INDEXER_MAX_DURATION_SECS";
pub const ENV_MEMORY_LIMIT: &str = "SITEMAP_INDEXER_MEMORY_LIMIT";
pub const ENV_PAGE_SIZE: &str = "SITEMAP_INDEXER_PAGE_SIZE";

/// Tunables for one indexing invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Wall-time budget in seconds.
    pub max_duration_secs: u64,
    /// Memory ceiling of the host process; `-1` for unlimited.
    pub memory_limit: MemoryLimit,
    /// Bytes kept free below `memory_limit`.
    pub memory_safety_margin: u64,
    /// Page size for paged sources. Negative fetches a whole partition at once.
    pub page_size: i64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: DEFAULT_MAX_DURATION.as_secs(),
            memory_limit: MemoryLimit::Unlimited,
            memory_safety_margin: MEMORY_SAFETY_MARGIN,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl IndexerConfig {
    /// Defaults overlaid with `SITEMAP_INDEXER_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`. Unparseable values are logged and ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_DURATION_SECS) {
            match raw.trim().parse() {
                Ok(secs) => self.max_duration_secs = secs,
                Err(_) => {
                    warn!(var = ENV_MAX_DURATION_SECS, value = %raw, "ignoring invalid value")
                }
            }
        }

        if let Some(raw) = lookup(ENV_MEMORY_LIMIT) {
            match MemoryLimit::parse(&raw) {
                Some(limit) => self.memory_limit = limit,
                None => warn!(var = ENV_MEMORY_LIMIT, value = %raw, "ignoring invalid value"),
            }
        }

        if let Some(raw) = lookup(ENV_PAGE_SIZE) {
            match raw.trim().parse::<i64>() {
                Ok(0) | Err(_) => {
                    warn!(var = ENV_PAGE_SIZE, value = %raw, "ignoring invalid value")
                }
                Ok(size) => self.page_size = size,
            }
        }

        self
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = IndexerConfig::default();
        assert_eq!(config.max_duration(), Duration::from_secs(25));
        assert_eq!(config.memory_limit, MemoryLimit::Unlimited);
        assert_eq!(config.memory_safety_margin, 4_096_000);
        assert_eq!(config.page_size, 50);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_MAX_DURATION_SECS, "10"),
            (ENV_MEMORY_LIMIT, "256M"),
            (ENV_PAGE_SIZE, "-1"),
        ]
        .into_iter()
        .collect();

        let config = IndexerConfig::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.max_duration_secs, 10);
        assert_eq!(config.memory_limit, MemoryLimit::Bytes(256 * 1024 * 1024));
        assert_eq!(config.page_size, -1);
    }

    #[test]
    fn test_invalid_overrides_keep_defaults() {
        let config = IndexerConfig::default().with_overrides(|k| match k {
            ENV_MAX_DURATION_SECS => Some("soon".into()),
            ENV_PAGE_SIZE => Some("0".into()),
            _ => None,
        });
        assert_eq!(config, IndexerConfig::default());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: IndexerConfig = serde_json::from_str(r#"{"page_size": 10}"#).unwrap();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.max_duration_secs, 25);
    }
}
