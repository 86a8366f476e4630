//! Resumable sitemap re-indexing engine.
//!
//! Rebuilds a sitemap's URL registry from paged content sources and callback
//! URL producers across many short invocations. Each invocation runs inside an
//! execution budget and persists checkpoints, so the next trigger resumes
//! exactly where the previous one stopped.

pub mod budget;
pub mod callback;
pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod paged;
pub mod record;
pub mod sink;
pub mod store;
pub mod validation;

pub use budget::{ExecutionBudget, MemoryLimit, MemoryProbe, ProcessMemory};
pub use callback::{CallbackIndexer, UrlProducer};
pub use config::IndexerConfig;
pub use context::IndexContext;
pub use error::{IndexError, Result, SourceError, StoreError};
pub use orchestrator::{RunOutcome, SitemapIndexer, SourceIndexer};
pub use paged::{PageQuery, PagedIndexer, PagedSource, ResolvedItem};
pub use record::{Estimate, IndexIndicator, SourceKind, UrlRecord};
pub use sink::{JsonlSink, MemorySink, RegistrationSink};
pub use store::{CheckpointStore, MemoryStore, SqliteStore};
pub use validation::{LogErrorSink, ValidationErrorSink, Violation};
