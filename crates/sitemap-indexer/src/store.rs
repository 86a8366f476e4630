//! Checkpoint persistence: the key-value store that makes indexing resumable.

use crate::error::StoreError;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::rc::Rc;

/// Key of the global index indicator.
pub const INDEX_STATUS_KEY: &str = "sitemap_index_status";

/// Prefix shared by every key the indexer writes.
pub const KEY_PREFIX: &str = "sitemap_";

/// Key of the offset checkpoint for one partition of a paged source.
pub fn partition_offset_key(source: &str, partition: &str) -> String {
    format!(
        "sitemap_index-{}-{}",
        escape_key_part(source),
        escape_key_part(partition)
    )
}

/// Key of the iteration checkpoint for a callback source.
pub fn callback_iteration_key(source: &str) -> String {
    format!("sitemap_callback_iteration-{}", escape_key_part(source))
}

/// Percent-encode the key separator so distinct names never share a key.
fn escape_key_part(part: &str) -> String {
    part.replace('%', "%25").replace('-', "%2D")
}

/// Durable key-value persistence for checkpoints.
///
/// `durable` marks values that are read on every invocation (the index
/// indicator) so implementations can keep them on a fast path.
pub trait CheckpointStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, key: &str, value: Value, durable: bool) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

impl<T: CheckpointStore + ?Sized> CheckpointStore for &T {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Value, durable: bool) -> Result<(), StoreError> {
        (**self).set(key, value, durable)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }
}

impl<T: CheckpointStore + ?Sized> CheckpointStore for Rc<T> {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Value, durable: bool) -> Result<(), StoreError> {
        (**self).set(key, value, durable)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }
}

/// Volatile store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, (Value, bool)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    /// Whether `key` was last written with the durable flag.
    pub fn is_durable(&self, key: &str) -> bool {
        self.entries
            .borrow()
            .get(key)
            .map(|(_, durable)| *durable)
            .unwrap_or(false)
    }
}

impl CheckpointStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.borrow().get(key).map(|(v, _)| v.clone()))
    }

    fn set(&self, key: &str, value: Value, durable: bool) -> Result<(), StoreError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), (value, durable));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Checkpoint store backed by a single SQLite table.
///
/// Rows written with `durable = true` are flagged `autoload` and loaded into
/// memory when the store opens, so reading the index indicator costs no query.
pub struct SqliteStore {
    db: Connection,
    autoloaded: RefCell<HashMap<String, Value>>,
}

impl SqliteStore {
    /// Open or create a checkpoint database.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self, StoreError> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                autoload INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );",
        )?;

        let mut autoloaded = HashMap::new();
        {
            let mut stmt = db.prepare("SELECT key, value FROM checkpoints WHERE autoload = 1")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (key, raw) = row?;
                let value = decode(&key, &raw)?;
                autoloaded.insert(key, value);
            }
        }

        Ok(Self {
            db,
            autoloaded: RefCell::new(autoloaded),
        })
    }

    /// Every stored checkpoint, ordered by key.
    pub fn entries(&self) -> Result<Vec<(String, Value)>, StoreError> {
        let mut stmt = self
            .db
            .prepare("SELECT key, value FROM checkpoints ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, raw)| {
                let value = decode(&key, &raw)?;
                Ok((key, value))
            })
            .collect()
    }

    /// Delete every key starting with `prefix`. Returns the number of rows removed.
    pub fn clear_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let removed = self.db.execute(
            "DELETE FROM checkpoints WHERE substr(key, 1, length(?1)) = ?1",
            rusqlite::params![prefix],
        )?;
        self.autoloaded
            .borrow_mut()
            .retain(|key, _| !key.starts_with(prefix));
        Ok(removed)
    }
}

impl CheckpointStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        if let Some(value) = self.autoloaded.borrow().get(key) {
            return Ok(Some(value.clone()));
        }

        let raw: Option<String> = self
            .db
            .query_row(
                "SELECT value FROM checkpoints WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|raw| decode(key, &raw)).transpose()
    }

    fn set(&self, key: &str, value: Value, durable: bool) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&value).map_err(|source| StoreError::Encoding {
            key: key.to_string(),
            source,
        })?;

        self.db.execute(
            "INSERT OR REPLACE INTO checkpoints (key, value, autoload, updated_at)
             VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)",
            rusqlite::params![key, raw, durable],
        )?;

        let mut autoloaded = self.autoloaded.borrow_mut();
        if durable {
            autoloaded.insert(key.to_string(), value);
        } else {
            autoloaded.remove(key);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.db.execute(
            "DELETE FROM checkpoints WHERE key = ?1",
            rusqlite::params![key],
        )?;
        self.autoloaded.borrow_mut().remove(key);
        Ok(())
    }
}

fn decode(key: &str, raw: &str) -> Result<Value, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Encoding {
        key: key.to_string(),
        source,
    })
}
