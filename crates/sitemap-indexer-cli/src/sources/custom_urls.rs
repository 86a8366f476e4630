//! JSON array of URL batches replayed as a callback producer.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sitemap_indexer::UrlProducer;
use std::path::Path;

/// Batch `n` of the file is handed out for iteration `n`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchFile {
    batches: Vec<Value>,
}

impl BatchFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read custom URL file: {}", path.display()))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("invalid custom URL file: {}", path.display()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(batches) => Ok(Self { batches }),
            other => bail!("custom URL file must hold an array of batches, found {other}"),
        }
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl UrlProducer for BatchFile {
    fn produce(&mut self, iteration: u64) -> Value {
        usize::try_from(iteration)
            .ok()
            .and_then(|i| self.batches.get(i))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn iterations(&self) -> Option<u64> {
        Some(self.batches.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_replays_batches_then_runs_dry() {
        let mut file =
            BatchFile::from_value(json!([[{"url": "https://example.com/a"}], []])).unwrap();
        assert_eq!(file.iterations(), Some(2));
        assert_eq!(file.produce(0), json!([{"url": "https://example.com/a"}]));
        assert_eq!(file.produce(1), json!([]));
        assert_eq!(file.produce(2), Value::Null);
    }

    #[test]
    fn test_rejects_non_array() {
        assert!(BatchFile::from_value(json!({"url": "https://example.com"})).is_err());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(&path, r#"[[], [{"url": "https://example.com/b"}]]"#).unwrap();
        let file = BatchFile::load(&path).unwrap();
        assert_eq!(file.len(), 2);
    }
}
