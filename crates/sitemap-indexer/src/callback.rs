//! Callback source indexer: pulls batches of externally registered URLs
//! from a producer until it runs dry, checkpointing the iteration counter.

use crate::context::IndexContext;
use crate::error::Result;
use crate::orchestrator::SourceIndexer;
use crate::record::{Estimate, IndexIndicator, SourceKind};
use crate::store::callback_iteration_key;
use crate::validation::{validate_and_report, LogErrorSink, ValidationErrorSink};
use serde_json::Value;
use tracing::{debug, info};

/// Supplies batches of candidate URL entries on request.
pub trait UrlProducer {
    /// Batch number `iteration`. A non-array or an empty array ends the stream.
    fn produce(&mut self, iteration: u64) -> Value;

    /// Total number of iterations, when the producer knows it.
    fn iterations(&self) -> Option<u64> {
        None
    }
}

impl<F> UrlProducer for F
where
    F: FnMut(u64) -> Value,
{
    fn produce(&mut self, iteration: u64) -> Value {
        self(iteration)
    }
}

/// Indexes the URLs a [`UrlProducer`] hands out, validating each entry.
pub struct CallbackIndexer {
    name: String,
    producer: Box<dyn UrlProducer>,
    errors: Box<dyn ValidationErrorSink>,
}

impl CallbackIndexer {
    pub fn new(name: impl Into<String>, producer: Box<dyn UrlProducer>) -> Self {
        Self {
            name: name.into(),
            producer,
            errors: Box::new(LogErrorSink),
        }
    }

    /// Where validation failures are reported. Defaults to [`LogErrorSink`].
    pub fn with_error_sink(mut self, errors: Box<dyn ValidationErrorSink>) -> Self {
        self.errors = errors;
        self
    }

    fn indicator(&self, iteration: u64) -> IndexIndicator {
        IndexIndicator::Callback {
            source: self.name.clone(),
            iteration,
            iterations: Estimate::from(self.producer.iterations()),
        }
    }

    /// Returns false when the budget ran out before the producer did.
    fn index(&mut self, ctx: &mut IndexContext<'_>) -> Result<bool> {
        let key = callback_iteration_key(&self.name);
        let mut iteration = ctx.load_checkpoint(&key)?;
        let now = ctx.request_time().timestamp();

        ctx.set_index_indicator(self.indicator(iteration))?;

        loop {
            if ctx.reached_execution_limit() {
                info!(source = %self.name, iteration, "budget exhausted, suspending");
                return Ok(false);
            }

            let batch = match self.producer.produce(iteration) {
                Value::Array(batch) if !batch.is_empty() => batch,
                _ => return Ok(true),
            };
            debug!(source = %self.name, iteration, entries = batch.len(), "received batch");

            for candidate in &batch {
                if let Some(record) =
                    validate_and_report(candidate, now, SourceKind::Callback, self.errors.as_ref())
                {
                    ctx.register_url(record);
                }
            }

            iteration += 1;
            ctx.save_checkpoint(&key, iteration)?;
            ctx.set_index_indicator(self.indicator(iteration))?;
        }
    }

    fn finish(&self, ctx: &mut IndexContext<'_>) -> Result<()> {
        ctx.delete_checkpoint(&callback_iteration_key(&self.name))?;
        ctx.clear_index_indicator()?;
        info!(source = %self.name, "callback source indexed");
        Ok(())
    }
}

impl SourceIndexer for CallbackIndexer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Callback
    }

    fn run(&mut self, ctx: &mut IndexContext<'_>) -> Result<bool> {
        let finished = self.index(ctx)?;
        if finished {
            self.finish(ctx)?;
        }
        Ok(finished)
    }
}
