//! `sitemap-indexer run`: one budgeted indexing invocation.

use crate::audit::ValidationAuditLog;
use crate::cli::output::{self, Styled};
use crate::cli::{indexer_home, REGISTERED_FILE, VALIDATION_LOG};
use crate::sources::{BatchFile, ContentFile};
use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use sitemap_indexer::{
    CallbackIndexer, IndexerConfig, JsonlSink, MemoryLimit, PagedIndexer, RunOutcome,
    SitemapIndexer, SqliteStore,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

/// Name of the paged source built from `--content`.
pub const CONTENT_SOURCE: &str = "content";

/// Name of the callback source built from `--custom-urls`.
pub const CUSTOM_SOURCE: &str = "custom";

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// JSON content export indexed as a paged source
    #[arg(long)]
    pub content: Option<PathBuf>,

    /// JSON array of URL batches indexed as a callback source
    #[arg(long)]
    pub custom_urls: Option<PathBuf>,

    /// Registered URL log (default: ~/.sitemap-indexer/registered.jsonl)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Validation failure log (default: ~/.sitemap-indexer/validation.jsonl)
    #[arg(long)]
    pub audit: Option<PathBuf>,

    /// Wall-time budget in seconds
    #[arg(long)]
    pub max_duration: Option<u64>,

    /// Memory limit such as 128M, 2G or -1 for unlimited
    #[arg(long, allow_hyphen_values = true)]
    pub memory_limit: Option<String>,

    /// Items per page; -1 fetches each category at once
    #[arg(long, allow_hyphen_values = true)]
    pub page_size: Option<i64>,

    /// Category to leave out of the index (repeatable)
    #[arg(long = "exclude-category")]
    pub exclude_categories: Vec<String>,

    /// Skip counting items per category
    #[arg(long)]
    pub without_totals: bool,
}

impl RunArgs {
    /// Overlay command-line flags onto `config`.
    pub fn apply(&self, mut config: IndexerConfig) -> Result<IndexerConfig> {
        if let Some(secs) = self.max_duration {
            config.max_duration_secs = secs;
        }
        if let Some(raw) = &self.memory_limit {
            config.memory_limit =
                MemoryLimit::parse(raw).ok_or_else(|| anyhow!("invalid memory limit: {raw}"))?;
        }
        match self.page_size {
            Some(0) => bail!("page size must not be 0"),
            Some(size) => config.page_size = size,
            None => {}
        }
        Ok(config)
    }

    fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| indexer_home().join(REGISTERED_FILE))
    }

    fn audit_path(&self) -> PathBuf {
        self.audit
            .clone()
            .unwrap_or_else(|| indexer_home().join(VALIDATION_LOG))
    }
}

/// What a run did, for display.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub sources: Vec<String>,
    pub output: PathBuf,
    pub elapsed_ms: u64,
}

/// Run one invocation against the checkpoint database at `store_path`.
pub fn execute(store_path: &Path, args: &RunArgs) -> Result<RunReport> {
    let config = args.apply(IndexerConfig::from_env())?;
    debug!(?config, "resolved indexer config");

    let store = SqliteStore::open(store_path)
        .with_context(|| format!("failed to open checkpoint store: {}", store_path.display()))?;
    let output_path = args.output_path();
    let sink = JsonlSink::open(&output_path)
        .with_context(|| format!("failed to open output: {}", output_path.display()))?;

    let mut indexer = SitemapIndexer::new(&store, &sink, config);

    if let Some(path) = &args.content {
        let content = ContentFile::load(path)?;
        let mut paged = PagedIndexer::new(CONTENT_SOURCE, Box::new(content));
        if !args.exclude_categories.is_empty() {
            let excluded = args.exclude_categories.clone();
            paged = paged.with_partition_filter(move |p| !excluded.iter().any(|e| e == p));
        }
        if args.without_totals {
            paged = paged.without_totals();
        }
        indexer.add_source(Box::new(paged));
    }

    if let Some(path) = &args.custom_urls {
        let batches = BatchFile::load(path)?;
        let audit = ValidationAuditLog::open(&args.audit_path())?;
        indexer.add_source(Box::new(
            CallbackIndexer::new(CUSTOM_SOURCE, Box::new(batches)).with_error_sink(Box::new(audit)),
        ));
    }

    let sources: Vec<String> = indexer
        .source_names()
        .into_iter()
        .map(String::from)
        .collect();
    if sources.is_empty() {
        bail!("nothing to index: pass --content and/or --custom-urls");
    }

    let started = Instant::now();
    let outcome = indexer.run()?;

    Ok(RunReport {
        outcome,
        sources,
        output: output_path,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

/// Run and print the result.
pub fn run(store_path: &Path, args: &RunArgs) -> Result<()> {
    let report = execute(store_path, args)?;

    if output::is_json() {
        let mut value = serde_json::to_value(&report.outcome)?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("sources".into(), serde_json::json!(report.sources));
            obj.insert("output".into(), serde_json::json!(report.output.display().to_string()));
            obj.insert("elapsed_ms".into(), serde_json::json!(report.elapsed_ms));
        }
        output::print_json(&value);
        return Ok(());
    }

    if output::is_quiet() {
        return Ok(());
    }

    let s = Styled::new();
    let elapsed = output::format_elapsed(report.elapsed_ms);
    match &report.outcome {
        RunOutcome::Skipped => {
            eprintln!("  {} Sitemap index is complete, nothing to do.", s.info_sym());
        }
        RunOutcome::Completed { registered } => {
            eprintln!(
                "  {} Indexed {} URL(s) in {elapsed}.",
                s.ok_sym(),
                s.green(&registered.to_string())
            );
        }
        RunOutcome::Suspended { source, registered } => {
            eprintln!(
                "  {} Budget exhausted in '{}' after {registered} URL(s) ({elapsed}).",
                s.warn_sym(),
                s.yellow(source)
            );
            eprintln!("  Run again to resume where this run stopped.");
        }
    }

    if output::is_verbose() {
        eprintln!("  {}", s.dim(&format!("sources: {}", report.sources.join(", "))));
        eprintln!("  {}", s.dim(&format!("output:  {}", report.output.display())));
    }

    Ok(())
}
