//! Paged source indexer: walks every partition of a paged content source
//! with an offset checkpoint per partition.

use crate::config::DEFAULT_PAGE_SIZE;
use crate::context::IndexContext;
use crate::error::{Result, SourceError};
use crate::orchestrator::SourceIndexer;
use crate::record::{Estimate, IndexIndicator, SourceKind, UrlRecord};
use crate::store::partition_offset_key;
use crate::validation::TIMESTAMP_FLOOR;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use url::Url;

/// Arguments for one page request against a [`PagedSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageQuery {
    pub partition: String,
    pub offset: u64,
    /// Items per page; negative requests the whole partition at once.
    pub page_size: i64,
    /// Only items that are publicly visible.
    pub published_only: bool,
    pub include_password_protected: bool,
    /// Source-specific arguments added by a query transform.
    pub extra: BTreeMap<String, Value>,
}

impl PageQuery {
    pub fn new(partition: &str, page_size: i64) -> Self {
        Self {
            partition: partition.to_string(),
            offset: 0,
            page_size,
            published_only: true,
            include_password_protected: false,
            extra: BTreeMap::new(),
        }
    }
}

/// Canonical location of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedItem {
    pub url: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A content store that can be read one page at a time.
pub trait PagedSource {
    /// Every partition the source holds, in a stable order.
    fn partitions(&self) -> std::result::Result<Vec<String>, SourceError>;

    /// Estimated number of items matching `query`, ignoring its offset.
    fn count(&self, _query: &PageQuery) -> std::result::Result<Option<u64>, SourceError> {
        Ok(None)
    }

    /// Identifiers of the page described by `query`, in a stable order.
    ///
    /// A page must hold exactly `query.page_size` ids unless the partition
    /// runs out within it: a shorter page marks the partition complete. A
    /// backend that caps its page size below the request must be given a
    /// smaller page size (or a query transform that lowers it).
    fn fetch_ids(&self, query: &PageQuery) -> std::result::Result<Vec<String>, SourceError>;

    /// Look up an item's URL and modification time; `None` if it vanished.
    fn resolve(
        &self,
        partition: &str,
        id: &str,
    ) -> std::result::Result<Option<ResolvedItem>, SourceError>;
}

pub type PartitionFilter = Box<dyn Fn(&str) -> bool>;
pub type ItemFilter = Box<dyn Fn(&str, &str) -> bool>;
pub type QueryTransform = Box<dyn Fn(PageQuery) -> PageQuery>;

/// Indexes a [`PagedSource`] one partition at a time.
pub struct PagedIndexer {
    name: String,
    source: Box<dyn PagedSource>,
    page_size: Option<i64>,
    count_totals: bool,
    partition_filter: PartitionFilter,
    item_filter: ItemFilter,
    query_transform: QueryTransform,
}

impl PagedIndexer {
    pub fn new(name: impl Into<String>, source: Box<dyn PagedSource>) -> Self {
        Self {
            name: name.into(),
            source,
            page_size: None,
            count_totals: true,
            partition_filter: Box::new(|_| true),
            item_filter: Box::new(|_, _| true),
            query_transform: Box::new(|query| query),
        }
    }

    /// Items per page. Zero is ignored; negative fetches a partition in one go.
    ///
    /// Without it the run's configured page size applies.
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        if page_size != 0 {
            self.page_size = Some(page_size);
        }
        self
    }

    /// Skip the per-partition count query and report the total as unknown.
    pub fn without_totals(mut self) -> Self {
        self.count_totals = false;
        self
    }

    /// Only partitions for which `filter` returns true are indexed.
    pub fn with_partition_filter(mut self, filter: impl Fn(&str) -> bool + 'static) -> Self {
        self.partition_filter = Box::new(filter);
        self
    }

    /// Items for which `filter(partition, id)` returns false are skipped.
    pub fn with_item_filter(mut self, filter: impl Fn(&str, &str) -> bool + 'static) -> Self {
        self.item_filter = Box::new(filter);
        self
    }

    /// Rewrite the page query before a partition is walked.
    ///
    /// `partition` and `offset` are restored afterwards.
    pub fn with_query_transform(
        mut self,
        transform: impl Fn(PageQuery) -> PageQuery + 'static,
    ) -> Self {
        self.query_transform = Box::new(transform);
        self
    }

    /// Partitions to index on this call, re-derived every time.
    pub fn indexable_partitions(&self) -> Result<Vec<String>> {
        let partitions = self.source.partitions()?;
        Ok(partitions
            .into_iter()
            .filter(|p| (self.partition_filter)(p))
            .collect())
    }

    fn query_for(&self, partition: &str, offset: u64, default_page_size: i64) -> PageQuery {
        let page_size = self.page_size.unwrap_or(default_page_size);
        let mut query = (self.query_transform)(PageQuery::new(partition, page_size));
        query.partition = partition.to_string();
        query.offset = offset;
        if query.page_size == 0 {
            warn!(source = %self.name, partition, "query transform set page size 0, using default");
            query.page_size = DEFAULT_PAGE_SIZE;
        }
        query
    }

    /// Index one partition. Returns false when the budget ran out first.
    fn index_partition(&self, ctx: &mut IndexContext<'_>, partition: &str) -> Result<bool> {
        let key = partition_offset_key(&self.name, partition);
        let mut offset = ctx.load_checkpoint(&key)?;
        let mut query = self.query_for(partition, offset, ctx.page_size());

        let total = if self.count_totals {
            Estimate::from(self.source.count(&query)?)
        } else {
            Estimate::Unknown
        };

        ctx.set_index_indicator(self.indicator(partition, offset, total))?;
        debug!(source = %self.name, partition, offset, %total, "indexing partition");

        loop {
            if ctx.reached_execution_limit() {
                info!(source = %self.name, partition, offset, "budget exhausted, suspending");
                return Ok(false);
            }

            let ids = self.source.fetch_ids(&query)?;
            if ids.is_empty() {
                return Ok(true);
            }

            for id in &ids {
                if !(self.item_filter)(partition, id) {
                    debug!(source = %self.name, partition, id = %id, "item excluded");
                    continue;
                }
                self.register_item(ctx, partition, id)?;
            }

            if query.page_size < 0 {
                return Ok(true);
            }
            // A short page means the partition ran out while it was read.
            if (ids.len() as i64) < query.page_size {
                return Ok(true);
            }

            offset += query.page_size as u64;
            ctx.save_checkpoint(&key, offset)?;
            query.offset = offset;
            ctx.set_index_indicator(self.indicator(partition, offset, total))?;
        }
    }

    fn register_item(&self, ctx: &mut IndexContext<'_>, partition: &str, id: &str) -> Result<()> {
        let Some(item) = self.source.resolve(partition, id)? else {
            warn!(source = %self.name, partition, id, "item vanished before it could be resolved");
            return Ok(());
        };

        let url = match Url::parse(&item.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => url,
            _ => {
                warn!(
                    source = %self.name,
                    partition,
                    id,
                    url = %item.url,
                    "skipping item without an absolute http(s) URL"
                );
                return Ok(());
            }
        };

        let now = ctx.request_time().timestamp();
        let last_modified = match item.last_modified.map(|t| t.timestamp()) {
            None | Some(0) => 0,
            Some(ts) if (TIMESTAMP_FLOOR..=now).contains(&ts) => ts,
            Some(ts) => {
                warn!(
                    source = %self.name,
                    partition,
                    id,
                    last_modified = ts,
                    "modification time out of range, registering as unknown"
                );
                0
            }
        };

        ctx.register_url(UrlRecord {
            source: SourceKind::Paged,
            identifier: id.to_string(),
            url,
            last_modified,
        });
        Ok(())
    }

    fn finish_partition(&self, ctx: &mut IndexContext<'_>, partition: &str) -> Result<()> {
        ctx.delete_checkpoint(&partition_offset_key(&self.name, partition))?;
        ctx.clear_index_indicator()?;
        info!(source = %self.name, partition, "partition indexed");
        Ok(())
    }

    fn indicator(&self, partition: &str, offset: u64, total: Estimate) -> IndexIndicator {
        IndexIndicator::Paged {
            source: self.name.clone(),
            partition: partition.to_string(),
            offset,
            total,
        }
    }
}

impl SourceIndexer for PagedIndexer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Paged
    }

    fn run(&mut self, ctx: &mut IndexContext<'_>) -> Result<bool> {
        for partition in self.indexable_partitions()? {
            if !self.index_partition(ctx, &partition)? {
                return Ok(false);
            }
            self.finish_partition(ctx, &partition)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{ExecutionBudget, MemoryLimit};
    use crate::sink::MemorySink;
    use crate::store::{CheckpointStore, MemoryStore, INDEX_STATUS_KEY};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::time::Duration;

    /// Items `0..n` per partition; records every query it serves.
    struct Catalog {
        partitions: Vec<(String, usize)>,
        queries: Rc<RefCell<Vec<PageQuery>>>,
    }

    impl Catalog {
        fn new(partitions: &[(&str, usize)]) -> (Self, Rc<RefCell<Vec<PageQuery>>>) {
            let queries = Rc::new(RefCell::new(Vec::new()));
            let catalog = Self {
                partitions: partitions
                    .iter()
                    .map(|(name, n)| (name.to_string(), *n))
                    .collect(),
                queries: queries.clone(),
            };
            (catalog, queries)
        }

        fn size(&self, partition: &str) -> std::result::Result<usize, SourceError> {
            self.partitions
                .iter()
                .find(|(name, _)| name == partition)
                .map(|(_, n)| *n)
                .ok_or_else(|| SourceError::UnknownPartition(partition.to_string()))
        }
    }

    impl PagedSource for Catalog {
        fn partitions(&self) -> std::result::Result<Vec<String>, SourceError> {
            Ok(self.partitions.iter().map(|(name, _)| name.clone()).collect())
        }

        fn count(&self, query: &PageQuery) -> std::result::Result<Option<u64>, SourceError> {
            Ok(Some(self.size(&query.partition)? as u64))
        }

        fn fetch_ids(&self, query: &PageQuery) -> std::result::Result<Vec<String>, SourceError> {
            self.queries.borrow_mut().push(query.clone());
            let size = self.size(&query.partition)?;
            let start = (query.offset as usize).min(size);
            let end = if query.page_size < 0 {
                size
            } else {
                (start + query.page_size as usize).min(size)
            };
            Ok((start..end).map(|i| format!("{}-{i}", query.partition)).collect())
        }

        fn resolve(
            &self,
            _partition: &str,
            id: &str,
        ) -> std::result::Result<Option<ResolvedItem>, SourceError> {
            Ok(Some(ResolvedItem {
                url: format!("https://example.com/{id}"),
                last_modified: DateTime::from_timestamp(1_600_000_000, 0),
            }))
        }
    }

    fn run_once(
        indexer: &mut PagedIndexer,
        store: &MemoryStore,
        sink: &MemorySink,
        budget: ExecutionBudget,
    ) -> bool {
        let mut ctx = IndexContext::open(store, sink, budget, Utc::now()).unwrap();
        indexer.run(&mut ctx).unwrap()
    }

    /// Budget that allows `checks` passes and then trips on memory.
    fn budget_after(checks: usize) -> ExecutionBudget {
        let calls = Cell::new(0usize);
        ExecutionBudget::with_probe(
            Duration::from_secs(3600),
            MemoryLimit::Bytes(u64::MAX),
            0,
            Box::new(move || {
                calls.set(calls.get() + 1);
                if calls.get() > checks { u64::MAX } else { 0 }
            }),
        )
    }

    #[test]
    fn test_indexes_all_partitions() {
        let (catalog, _) = Catalog::new(&[("post", 3), ("page", 2)]);
        let mut indexer = PagedIndexer::new("content", Box::new(catalog));
        let store = MemoryStore::new();
        let sink = MemorySink::new();

        assert!(run_once(&mut indexer, &store, &sink, ExecutionBudget::unbounded()));
        let ids: Vec<String> = sink.records().into_iter().map(|r| r.identifier).collect();
        assert_eq!(ids, vec!["post-0", "post-1", "post-2", "page-0", "page-1"]);
        assert!(sink.records().iter().all(|r| r.source == SourceKind::Paged));
        assert_eq!(sink.records()[0].last_modified, 1_600_000_000);
        assert!(store.keys().is_empty());
    }

    #[test]
    fn test_suspends_and_keeps_checkpoint() {
        let (catalog, _) = Catalog::new(&[("post", 150)]);
        let mut indexer = PagedIndexer::new("content", Box::new(catalog));
        let store = MemoryStore::new();
        let sink = MemorySink::new();

        assert!(!run_once(&mut indexer, &store, &sink, budget_after(1)));
        assert_eq!(sink.len(), 50);
        assert_eq!(
            store.get(&partition_offset_key("content", "post")).unwrap(),
            Some(Value::from(50))
        );
        let indicator: IndexIndicator =
            serde_json::from_value(store.get(INDEX_STATUS_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(
            indicator,
            IndexIndicator::Paged {
                source: "content".into(),
                partition: "post".into(),
                offset: 50,
                total: Estimate::Known(150),
            }
        );
    }

    #[test]
    fn test_negative_page_size_fetches_once() {
        let (catalog, queries) = Catalog::new(&[("post", 120)]);
        let mut indexer = PagedIndexer::new("content", Box::new(catalog)).with_page_size(-1);
        let store = MemoryStore::new();
        let sink = MemorySink::new();

        assert!(run_once(&mut indexer, &store, &sink, ExecutionBudget::unbounded()));
        assert_eq!(queries.borrow().len(), 1);
        assert_eq!(sink.len(), 120);
        assert!(store.keys().is_empty());
    }

    #[test]
    fn test_filters_and_query_transform() {
        let (catalog, queries) = Catalog::new(&[("post", 4), ("attachment", 10)]);
        let mut indexer = PagedIndexer::new("content", Box::new(catalog))
            .with_partition_filter(|p| p != "attachment")
            .with_item_filter(|_, id| id != "post-1")
            .with_query_transform(|mut q| {
                q.page_size = 2;
                q.offset = 99;
                q.partition = "ignored".into();
                q.extra.insert("orderby".into(), Value::from("date"));
                q
            });
        let store = MemoryStore::new();
        let sink = MemorySink::new();

        assert!(run_once(&mut indexer, &store, &sink, ExecutionBudget::unbounded()));
        let ids: Vec<String> = sink.records().into_iter().map(|r| r.identifier).collect();
        assert_eq!(ids, vec!["post-0", "post-2", "post-3"]);

        let queries = queries.borrow();
        assert!(queries.iter().all(|q| q.partition == "post"));
        assert_eq!(queries[0].offset, 0);
        assert_eq!(queries[1].offset, 2);
        assert_eq!(queries[0].extra["orderby"], "date");
    }

    #[test]
    fn test_unresolvable_and_invalid_items_are_skipped() {
        struct Flaky;
        impl PagedSource for Flaky {
            fn partitions(&self) -> std::result::Result<Vec<String>, SourceError> {
                Ok(vec!["post".into()])
            }
            fn fetch_ids(
                &self,
                query: &PageQuery,
            ) -> std::result::Result<Vec<String>, SourceError> {
                Ok(if query.offset == 0 {
                    vec!["gone".into(), "relative".into(), "ok".into()]
                } else {
                    Vec::new()
                })
            }
            fn resolve(
                &self,
                _partition: &str,
                id: &str,
            ) -> std::result::Result<Option<ResolvedItem>, SourceError> {
                Ok(match id {
                    "gone" => None,
                    "relative" => Some(ResolvedItem {
                        url: "/about".into(),
                        last_modified: None,
                    }),
                    _ => Some(ResolvedItem {
                        url: "https://example.com/ok".into(),
                        last_modified: None,
                    }),
                })
            }
        }

        let mut indexer = PagedIndexer::new("content", Box::new(Flaky)).without_totals();
        let store = MemoryStore::new();
        let sink = MemorySink::new();

        assert!(run_once(&mut indexer, &store, &sink, ExecutionBudget::unbounded()));
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier, "ok");
        assert_eq!(records[0].last_modified, 0);
    }

    #[test]
    fn test_page_size_falls_back_to_run_config() {
        let (catalog, queries) = Catalog::new(&[("post", 25)]);
        let mut indexer = PagedIndexer::new("content", Box::new(catalog));
        let store = MemoryStore::new();
        let sink = MemorySink::new();
        let mut ctx = IndexContext::open(&store, &sink, ExecutionBudget::unbounded(), Utc::now())
            .unwrap()
            .with_page_size(10);

        assert!(indexer.run(&mut ctx).unwrap());
        let queries = queries.borrow();
        assert_eq!(queries.len(), 3);
        assert!(queries.iter().all(|q| q.page_size == 10));
        assert_eq!(sink.len(), 25);
    }

    #[test]
    fn test_own_page_size_beats_run_config() {
        let (catalog, queries) = Catalog::new(&[("post", 5)]);
        let mut indexer = PagedIndexer::new("content", Box::new(catalog)).with_page_size(-1);
        let store = MemoryStore::new();
        let sink = MemorySink::new();
        let mut ctx = IndexContext::open(&store, &sink, ExecutionBudget::unbounded(), Utc::now())
            .unwrap()
            .with_page_size(2);

        assert!(indexer.run(&mut ctx).unwrap());
        assert_eq!(queries.borrow().len(), 1);
        assert_eq!(queries.borrow()[0].page_size, -1);
    }

    #[test]
    fn test_out_of_range_modification_time_is_unknown() {
        struct Dated {
            now: i64,
        }
        impl PagedSource for Dated {
            fn partitions(&self) -> std::result::Result<Vec<String>, SourceError> {
                Ok(vec!["post".into()])
            }
            fn fetch_ids(
                &self,
                query: &PageQuery,
            ) -> std::result::Result<Vec<String>, SourceError> {
                Ok(if query.offset == 0 {
                    vec!["old".into(), "future".into(), "floor".into(), "recent".into()]
                } else {
                    Vec::new()
                })
            }
            fn resolve(
                &self,
                _partition: &str,
                id: &str,
            ) -> std::result::Result<Option<ResolvedItem>, SourceError> {
                let ts = match id {
                    "old" => 631_152_000,
                    "future" => self.now + 86_400,
                    "floor" => TIMESTAMP_FLOOR,
                    _ => 1_600_000_000,
                };
                Ok(Some(ResolvedItem {
                    url: format!("https://example.com/{id}"),
                    last_modified: DateTime::from_timestamp(ts, 0),
                }))
            }
        }

        let now = Utc::now();
        let mut indexer =
            PagedIndexer::new("content", Box::new(Dated { now: now.timestamp() })).without_totals();
        let store = MemoryStore::new();
        let sink = MemorySink::new();
        let mut ctx =
            IndexContext::open(&store, &sink, ExecutionBudget::unbounded(), now).unwrap();

        assert!(indexer.run(&mut ctx).unwrap());
        let stamps: Vec<(String, i64)> = sink
            .records()
            .into_iter()
            .map(|r| (r.identifier, r.last_modified))
            .collect();
        assert_eq!(
            stamps,
            vec![
                ("old".to_string(), 0),
                ("future".to_string(), 0),
                ("floor".to_string(), TIMESTAMP_FLOOR),
                ("recent".to_string(), 1_600_000_000),
            ]
        );
    }
}
