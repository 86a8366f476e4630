//! `sitemap-indexer reset`: forget all indexing progress.

use crate::cli::output::{self, Styled};
use anyhow::{Context, Result};
use sitemap_indexer::store::KEY_PREFIX;
use sitemap_indexer::SqliteStore;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResetSummary {
    pub checkpoints_removed: usize,
    pub output_removed: bool,
}

/// Delete the indicator and every checkpoint, and optionally the registered
/// URL log, so the next run re-indexes from scratch.
pub fn reset(store_path: &Path, purge_output: Option<&Path>) -> Result<ResetSummary> {
    let mut summary = ResetSummary::default();

    if store_path.exists() {
        let store = SqliteStore::open(store_path).with_context(|| {
            format!("failed to open checkpoint store: {}", store_path.display())
        })?;
        summary.checkpoints_removed = store.clear_prefix(KEY_PREFIX)?;
    }

    if let Some(path) = purge_output {
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            summary.output_removed = true;
        }
    }

    Ok(summary)
}

pub fn run(store_path: &Path, purge_output: Option<&Path>) -> Result<()> {
    let summary = reset(store_path, purge_output)?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "checkpoints_removed": summary.checkpoints_removed,
            "output_removed": summary.output_removed,
        }));
    } else if !output::is_quiet() {
        let s = Styled::new();
        if summary.checkpoints_removed > 0 {
            eprintln!(
                "  {} Cleared {} checkpoint(s).",
                s.ok_sym(),
                summary.checkpoints_removed
            );
        } else {
            eprintln!("  No checkpoints to clear.");
        }
        if summary.output_removed {
            eprintln!("  {} Removed registered URL log.", s.ok_sym());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sitemap_indexer::store::{callback_iteration_key, INDEX_STATUS_KEY};
    use sitemap_indexer::CheckpointStore;

    #[test]
    fn test_reset_clears_progress() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("checkpoints.db");
        let output = dir.path().join("registered.jsonl");
        std::fs::write(&output, "{}\n").unwrap();
        {
            let store = SqliteStore::open(&store_path).unwrap();
            store.set(INDEX_STATUS_KEY, json!({"type": "callback"}), true).unwrap();
            store.set(&callback_iteration_key("custom"), json!(3), false).unwrap();
        }

        let summary = reset(&store_path, Some(&output)).unwrap();
        assert_eq!(
            summary,
            ResetSummary {
                checkpoints_removed: 2,
                output_removed: true
            }
        );
        assert!(!output.exists());

        let store = SqliteStore::open(&store_path).unwrap();
        assert!(store.get(INDEX_STATUS_KEY).unwrap().is_none());
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn test_reset_without_database() {
        let dir = tempfile::tempdir().unwrap();
        let summary = reset(&dir.path().join("absent.db"), None).unwrap();
        assert_eq!(summary, ResetSummary::default());
    }
}
