//! JSON content export read as a paged source.
//!
//! ```json
//! {"categories": [
//!   {"name": "post", "items": [
//!     {"id": "1", "url": "https://example.com/hello", "last_modified": "2024-03-01T10:00:00Z",
//!      "status": "publish", "password_protected": false}
//!   ]}
//! ]}
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitemap_indexer::{PageQuery, PagedSource, ResolvedItem, SourceError};
use std::path::Path;

/// Status of items visible to the public.
pub const PUBLISHED: &str = "publish";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub password_protected: bool,
}

fn default_status() -> String {
    PUBLISHED.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub items: Vec<ContentItem>,
}

/// Every category of a content export, in file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentFile {
    pub categories: Vec<Category>,
}

impl ContentFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read content file: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid content file: {}", path.display()))
    }

    fn category(&self, name: &str) -> std::result::Result<&Category, SourceError> {
        self.categories
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| SourceError::UnknownPartition(name.to_string()))
    }

    /// Items of the query's category that pass its visibility filters.
    fn matching(&self, query: &PageQuery) -> std::result::Result<Vec<&ContentItem>, SourceError> {
        let category = self.category(&query.partition)?;
        Ok(category
            .items
            .iter()
            .filter(|item| !query.published_only || item.status == PUBLISHED)
            .filter(|item| query.include_password_protected || !item.password_protected)
            .collect())
    }
}

impl PagedSource for ContentFile {
    fn partitions(&self) -> std::result::Result<Vec<String>, SourceError> {
        Ok(self.categories.iter().map(|c| c.name.clone()).collect())
    }

    fn count(&self, query: &PageQuery) -> std::result::Result<Option<u64>, SourceError> {
        Ok(Some(self.matching(query)?.len() as u64))
    }

    fn fetch_ids(&self, query: &PageQuery) -> std::result::Result<Vec<String>, SourceError> {
        let items = self.matching(query)?;
        let start = usize::try_from(query.offset)
            .unwrap_or(usize::MAX)
            .min(items.len());
        let end = if query.page_size < 0 {
            items.len()
        } else {
            start
                .saturating_add(query.page_size as usize)
                .min(items.len())
        };
        Ok(items[start..end].iter().map(|item| item.id.clone()).collect())
    }

    fn resolve(
        &self,
        partition: &str,
        id: &str,
    ) -> std::result::Result<Option<ResolvedItem>, SourceError> {
        Ok(self
            .category(partition)?
            .items
            .iter()
            .find(|item| item.id == id)
            .map(|item| ResolvedItem {
                url: item.url.clone(),
                last_modified: item.last_modified,
            }))
    }
}
