//! Indexing orchestrator: decides whether a re-index is needed and drives
//! every source indexer in order until all finish or the budget runs out.

use crate::budget::{ExecutionBudget, MemoryProbe, ProcessMemory};
use crate::config::IndexerConfig;
use crate::context::IndexContext;
use crate::error::Result;
use crate::record::SourceKind;
use crate::sink::RegistrationSink;
use crate::store::{CheckpointStore, INDEX_STATUS_KEY};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

/// A source of sitemap URLs that can be indexed in resumable steps.
pub trait SourceIndexer {
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Index until done or until the budget is spent.
    ///
    /// Returns true only when the source has been indexed completely. When it
    /// returns false its checkpoints are left for the next invocation.
    fn run(&mut self, ctx: &mut IndexContext<'_>) -> Result<bool>;
}

/// What an invocation of [`SitemapIndexer::run`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// URLs are registered and nothing was interrupted; no work needed.
    Skipped,
    /// Every source was indexed to the end.
    Completed { registered: u64 },
    /// The budget ran out in `source`; the next invocation resumes there.
    Suspended { source: String, registered: u64 },
}

type ProbeFactory = Box<dyn Fn() -> Box<dyn MemoryProbe>>;

/// Sequences source indexers across budgeted invocations.
///
/// Paged sources always run before callback sources; within a kind, sources
/// run in the order they were added.
pub struct SitemapIndexer<'a> {
    store: &'a dyn CheckpointStore,
    sink: &'a dyn RegistrationSink,
    config: IndexerConfig,
    sources: Vec<Box<dyn SourceIndexer + 'a>>,
    probe: ProbeFactory,
}

impl<'a> SitemapIndexer<'a> {
    pub fn new(
        store: &'a dyn CheckpointStore,
        sink: &'a dyn RegistrationSink,
        config: IndexerConfig,
    ) -> Self {
        Self {
            store,
            sink,
            config,
            sources: Vec::new(),
            probe: Box::new(|| Box::new(ProcessMemory::new()) as Box<dyn MemoryProbe>),
        }
    }

    pub fn with_source(mut self, source: Box<dyn SourceIndexer + 'a>) -> Self {
        self.add_source(source);
        self
    }

    pub fn add_source(&mut self, source: Box<dyn SourceIndexer + 'a>) {
        self.sources.push(source);
        self.sources.sort_by_key(|s| s.kind());
    }

    /// Replace the memory probe used by each invocation's budget.
    pub fn with_memory_probe<F, P>(mut self, factory: F) -> Self
    where
        F: Fn() -> P + 'static,
        P: MemoryProbe + 'static,
    {
        self.probe = Box::new(move || Box::new(factory()) as Box<dyn MemoryProbe>);
        self
    }

    /// Source names in the order they run.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Whether an invocation would do any work.
    ///
    /// Work is needed on a cold start (nothing registered yet) or when an
    /// earlier invocation left its index indicator behind.
    pub fn needs_indexing(&self) -> Result<bool> {
        if !self.sink.has_registered_urls() {
            return Ok(true);
        }
        Ok(self.store.get(INDEX_STATUS_KEY)?.is_some())
    }

    /// Run one budgeted invocation.
    pub fn run(&mut self) -> Result<RunOutcome> {
        if !self.needs_indexing()? {
            debug!("sitemap index is complete, nothing to do");
            return Ok(RunOutcome::Skipped);
        }

        let budget = ExecutionBudget::with_probe(
            self.config.max_duration(),
            self.config.memory_limit,
            self.config.memory_safety_margin,
            (self.probe)(),
        );
        let mut ctx = IndexContext::open(self.store, self.sink, budget, Utc::now())?
            .with_page_size(self.config.page_size);

        if let Some(indicator) = ctx.index_indicator() {
            info!(%indicator, "resuming interrupted indexing");
        } else {
            info!(sources = self.sources.len(), "starting sitemap indexing");
        }

        for source in self.sources.iter_mut() {
            if !source.run(&mut ctx)? {
                let registered = ctx.registered();
                info!(
                    source = source.name(),
                    registered,
                    elapsed_ms = ctx.budget().elapsed().as_millis() as u64,
                    "indexing suspended"
                );
                return Ok(RunOutcome::Suspended {
                    source: source.name().to_string(),
                    registered,
                });
            }
        }

        let registered = ctx.registered();
        info!(registered, "sitemap indexing complete");
        Ok(RunOutcome::Completed { registered })
    }
}
