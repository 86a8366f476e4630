//! `sitemap-indexer status`: show the indexing indicator and pending checkpoints.

use crate::cli::output::{self, Styled};
use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use sitemap_indexer::store::INDEX_STATUS_KEY;
use sitemap_indexer::{CheckpointStore, Estimate, IndexIndicator, SqliteStore};
use std::path::Path;

/// Snapshot of a checkpoint database.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    /// Raw indicator value; present means an invocation was interrupted.
    pub raw_indicator: Option<Value>,
    pub indicator: Option<IndexIndicator>,
    /// Every other stored checkpoint, ordered by key.
    pub checkpoints: Vec<(String, Value)>,
}

impl StatusReport {
    pub fn in_progress(&self) -> bool {
        self.raw_indicator.is_some()
    }

    pub fn to_json(&self) -> Value {
        let checkpoints: Map<String, Value> = self.checkpoints.iter().cloned().collect();
        json!({
            "indexing": self.in_progress(),
            "indicator": self.raw_indicator,
            "checkpoints": checkpoints,
        })
    }
}

/// Read the state of the database at `store_path`. A missing database is empty.
pub fn collect(store_path: &Path) -> Result<StatusReport> {
    if !store_path.exists() {
        return Ok(StatusReport {
            raw_indicator: None,
            indicator: None,
            checkpoints: Vec::new(),
        });
    }

    let store = SqliteStore::open(store_path)
        .with_context(|| format!("failed to open checkpoint store: {}", store_path.display()))?;
    let raw_indicator = store.get(INDEX_STATUS_KEY)?;
    let indicator = raw_indicator
        .clone()
        .and_then(|value| serde_json::from_value(value).ok());
    let checkpoints = store
        .entries()?
        .into_iter()
        .filter(|(key, _)| key != INDEX_STATUS_KEY)
        .collect();

    Ok(StatusReport {
        raw_indicator,
        indicator,
        checkpoints,
    })
}

/// One-line description of where indexing stopped.
pub fn describe(indicator: &IndexIndicator) -> String {
    match indicator {
        IndexIndicator::Paged {
            source,
            partition,
            offset,
            total: Estimate::Known(total),
        } => format!(
            "{source}/{partition} at offset {offset} of {total} {}",
            output::progress_bar(*offset, *total, 20)
        ),
        IndexIndicator::Paged {
            source,
            partition,
            offset,
            total: Estimate::Unknown,
        } => format!("{source}/{partition} at offset {offset}"),
        IndexIndicator::Callback {
            source,
            iteration,
            iterations: Estimate::Known(iterations),
        } => format!("{source} at iteration {iteration} of {iterations}"),
        IndexIndicator::Callback {
            source,
            iteration,
            iterations: Estimate::Unknown,
        } => format!("{source} at iteration {iteration}"),
    }
}

/// Print the status of the checkpoint database.
pub fn run(store_path: &Path) -> Result<()> {
    let report = collect(store_path)?;

    if output::is_json() {
        output::print_json(&report.to_json());
        return Ok(());
    }

    let s = Styled::new();
    eprintln!();
    output::print_section(&s, "Sitemap index");
    match (&report.indicator, &report.raw_indicator) {
        (Some(indicator), _) => {
            output::print_check(s.warn_sym(), "Interrupted", &describe(indicator));
        }
        (None, Some(raw)) => {
            output::print_check(
                s.warn_sym(),
                "Interrupted",
                &format!("unrecognised indicator {raw}"),
            );
        }
        (None, None) => {
            output::print_check(s.ok_sym(), "Idle", "no indexing in progress");
        }
    }

    if !report.checkpoints.is_empty() {
        eprintln!();
        output::print_section(&s, "Checkpoints");
        for (key, value) in &report.checkpoints {
            output::print_check(s.info_sym(), key, &s.cyan(&value.to_string()));
        }
    }
    eprintln!();
    eprintln!("  {}", s.dim(&store_path.display().to_string()));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitemap_indexer::store::partition_offset_key;

    #[test]
    fn test_missing_database_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let report = collect(&dir.path().join("absent.db")).unwrap();
        assert!(!report.in_progress());
        assert!(report.checkpoints.is_empty());
        assert!(!dir.path().join("absent.db").exists());
    }

    #[test]
    fn test_collects_indicator_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.db");
        let indicator = IndexIndicator::Paged {
            source: "content".into(),
            partition: "post".into(),
            offset: 50,
            total: Estimate::Known(200),
        };
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .set(INDEX_STATUS_KEY, serde_json::to_value(&indicator).unwrap(), true)
                .unwrap();
            store
                .set(&partition_offset_key("content", "post"), json!(50), false)
                .unwrap();
        }

        let report = collect(&path).unwrap();
        assert!(report.in_progress());
        assert_eq!(report.indicator, Some(indicator));
        assert_eq!(
            report.checkpoints,
            vec![("sitemap_index-content-post".to_string(), json!(50))]
        );
        assert_eq!(report.to_json()["checkpoints"]["sitemap_index-content-post"], 50);
    }

    #[test]
    fn test_describe() {
        let paged = IndexIndicator::Paged {
            source: "content".into(),
            partition: "page".into(),
            offset: 10,
            total: Estimate::Unknown,
        };
        assert_eq!(describe(&paged), "content/page at offset 10");

        let callback = IndexIndicator::Callback {
            source: "custom".into(),
            iteration: 2,
            iterations: Estimate::Known(5),
        };
        assert_eq!(describe(&callback), "custom at iteration 2 of 5");
    }
}
