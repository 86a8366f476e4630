//! JSONL validation audit log: one line per rejected URL registration.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sitemap_indexer::ValidationErrorSink;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationEvent {
    pub timestamp: String,
    pub message: String,
    pub candidate: Value,
}

/// Append-only JSONL log of validation failures.
pub struct ValidationAuditLog {
    file: File,
    path: PathBuf,
}

impl ValidationAuditLog {
    /// Open or create the audit log file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open validation log: {}", path.display()))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event.
    pub fn log(&self, event: &ValidationEvent) -> Result<()> {
        let json = serde_json::to_string(event)?;
        let mut file = &self.file;
        writeln!(file, "{json}")?;
        Ok(())
    }
}

impl ValidationErrorSink for ValidationAuditLog {
    fn notify(&self, candidate: &Value, message: &str) {
        let event = ValidationEvent {
            timestamp: Utc::now().to_rfc3339(),
            message: message.to_string(),
            candidate: candidate.clone(),
        };
        if let Err(e) = self.log(&event) {
            warn!(path = %self.path.display(), "failed to write validation event: {e:#}");
        }
    }
}
