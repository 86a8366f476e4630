//! CLI subcommand implementations for the `sitemap-indexer` binary.

pub mod output;
pub mod reset_cmd;
pub mod run_cmd;
pub mod status;

use std::path::PathBuf;

/// Checkpoint database file name inside the indexer home.
pub const CHECKPOINT_DB: &str = "checkpoints.db";

/// Registered URL log file name inside the indexer home.
pub const REGISTERED_FILE: &str = "registered.jsonl";

/// Validation audit log file name inside the indexer home.
pub const VALIDATION_LOG: &str = "validation.jsonl";

/// Directory holding the indexer's files (`~/.sitemap-indexer` unless
/// `SITEMAP_INDEXER_HOME` is set).
pub fn indexer_home() -> PathBuf {
    if let Ok(p) = std::env::var("SITEMAP_INDEXER_HOME") {
        return PathBuf::from(p);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".sitemap-indexer")
}
