//! Per-invocation indexing context shared with every source indexer.
//!
//! Holds the execution budget, the current index indicator and the handles to
//! the checkpoint store and registration sink. Source indexers never touch the
//! store directly for the indicator; they go through this context so the
//! in-memory copy and the persisted copy stay in step.

use crate::budget::ExecutionBudget;
use crate::config::DEFAULT_PAGE_SIZE;
use crate::error::{IndexError, Result, StoreError};
use crate::record::{IndexIndicator, UrlRecord};
use crate::sink::RegistrationSink;
use crate::store::{CheckpointStore, INDEX_STATUS_KEY};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

pub struct IndexContext<'a> {
    store: &'a dyn CheckpointStore,
    sink: &'a dyn RegistrationSink,
    budget: ExecutionBudget,
    request_time: DateTime<Utc>,
    page_size: i64,
    indicator: Option<IndexIndicator>,
    registered: u64,
}

impl<'a> IndexContext<'a> {
    /// Build a context, loading any indicator left behind by a previous invocation.
    pub fn open(
        store: &'a dyn CheckpointStore,
        sink: &'a dyn RegistrationSink,
        budget: ExecutionBudget,
        request_time: DateTime<Utc>,
    ) -> Result<Self> {
        let indicator = load_indicator(store)?;
        Ok(Self {
            store,
            sink,
            budget,
            request_time,
            page_size: DEFAULT_PAGE_SIZE,
            indicator,
            registered: 0,
        })
    }

    /// Page size for paged sources that do not set their own. Zero is ignored.
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        if page_size != 0 {
            self.page_size = page_size;
        }
        self
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    /// Whether the invocation has used up its budget.
    pub fn reached_execution_limit(&self) -> bool {
        let exceeded = self.budget.exceeded();
        if exceeded {
            debug!(
                elapsed_ms = self.budget.elapsed().as_millis() as u64,
                headroom = ?self.budget.memory_headroom(),
                "execution budget exceeded"
            );
        }
        exceeded
    }

    pub fn budget(&self) -> &ExecutionBudget {
        &self.budget
    }

    /// Time this invocation started; timestamps after it are rejected.
    pub fn request_time(&self) -> DateTime<Utc> {
        self.request_time
    }

    pub fn index_indicator(&self) -> Option<&IndexIndicator> {
        self.indicator.as_ref()
    }

    /// Publish the source currently being indexed.
    pub fn set_index_indicator(&mut self, indicator: IndexIndicator) -> Result<()> {
        let value = serde_json::to_value(&indicator).map_err(|source| StoreError::Encoding {
            key: INDEX_STATUS_KEY.to_string(),
            source,
        })?;
        self.store.set(INDEX_STATUS_KEY, value, true)?;
        self.indicator = Some(indicator);
        Ok(())
    }

    pub fn clear_index_indicator(&mut self) -> Result<()> {
        self.store.delete(INDEX_STATUS_KEY)?;
        self.indicator = None;
        Ok(())
    }

    /// Read a counter checkpoint; absent means 0.
    pub fn load_checkpoint(&self, key: &str) -> Result<u64> {
        match self.store.get(key)? {
            None => Ok(0),
            Some(value) => value.as_u64().ok_or(IndexError::CorruptCheckpoint {
                key: key.to_string(),
                value,
            }),
        }
    }

    pub fn save_checkpoint(&self, key: &str, value: u64) -> Result<()> {
        self.store.set(key, Value::from(value), false)?;
        Ok(())
    }

    pub fn delete_checkpoint(&self, key: &str) -> Result<()> {
        self.store.delete(key)?;
        Ok(())
    }

    /// Hand a record to the registration sink.
    pub fn register_url(&mut self, record: UrlRecord) {
        self.registered += 1;
        self.sink.register(record);
    }

    /// Records registered during this invocation.
    pub fn registered(&self) -> u64 {
        self.registered
    }
}

/// Read the persisted indicator.
///
/// A value that no longer decodes still means an invocation was interrupted,
/// so it is kept as a liveness signal but not surfaced as an indicator.
pub(crate) fn load_indicator(store: &dyn CheckpointStore) -> Result<Option<IndexIndicator>> {
    let Some(value) = store.get(INDEX_STATUS_KEY)? else {
        return Ok(None);
    };
    match serde_json::from_value(value.clone()) {
        Ok(indicator) => Ok(Some(indicator)),
        Err(e) => {
            warn!(%value, "unrecognised index indicator: {e}");
            Ok(None)
        }
    }
}
