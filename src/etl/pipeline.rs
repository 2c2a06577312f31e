//! Pipeline orchestration for lane-partitioned ETL runs

use super::{
    ExtractScheduler, Extractor, LaneRouter, LaneWorker, Loader, RunSummary, Transformer, recover,
};
use crate::model::{NormalizedRecord, SourceEntity};
use crate::storage::FailedBatchStore;
use eyre::{Result, WrapErr};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sizing and timing knobs for a pipeline run
///
/// Every size and the timeout must be non-zero; [`Pipeline::run`] rejects
/// options that fail [`PipelineOptions::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Maximum extraction tasks in flight
    pub concurrency: usize,
    /// Number of lanes, each with its own queue and load worker
    pub lanes: usize,
    /// Capacity of each lane queue
    pub queue_depth: usize,
    /// Buffered records that trigger a flush
    pub flush_threshold: usize,
    /// Per-source extraction timeout
    pub extract_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: 1000,
            lanes: 10,
            queue_depth: 2000,
            flush_threshold: 200,
            extract_timeout: Duration::from_secs(8),
        }
    }
}

impl PipelineOptions {
    /// Check that every size and the timeout are non-zero
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("extraction concurrency", self.concurrency),
            ("lane count", self.lanes),
            ("queue depth", self.queue_depth),
            ("flush threshold", self.flush_threshold),
        ];
        for (name, value) in checks {
            if value == 0 {
                eyre::bail!("The {} must be greater than zero", name);
            }
        }
        if self.extract_timeout.is_zero() {
            eyre::bail!("The extraction timeout must be greater than zero");
        }
        Ok(())
    }
}

/// Lane-partitioned ETL pipeline
///
/// A run goes through these phases:
/// 1. Start one load worker per lane
/// 2. Re-enqueue failure batches persisted by earlier runs
/// 3. Extract every source with bounded concurrency, transform, and route each
///    record to its lane
/// 4. Close the lane queues and wait for the final flushes
///
/// # Example
/// ```no_run
/// use lane_etl::etl::{CpuTransformer, Pipeline, PipelineOptions};
/// use lane_etl::storage::FailedBatchStore;
/// # use lane_etl::etl::{Extractor, Loader};
/// # use lane_etl::model::{NormalizedRecord, RawMetricRecord, SourceEntity};
/// # use eyre::Result;
/// # struct MyExtractor;
/// # impl Extractor for MyExtractor {
/// #     type Item = RawMetricRecord;
/// #     async fn extract(&self, _: &SourceEntity) -> Result<Self::Item> { unimplemented!() }
/// # }
/// # struct MyLoader;
/// # impl Loader for MyLoader {
/// #     type Item = NormalizedRecord;
/// #     async fn load(&self, items: &[Self::Item]) -> Result<usize> { Ok(items.len()) }
/// # }
///
/// # async fn example() -> Result<()> {
/// let pipeline = Pipeline::new(
///     MyExtractor,
///     CpuTransformer::new(),
///     MyLoader,
///     FailedBatchStore::new("."),
///     PipelineOptions::default(),
/// );
///
/// let sources = vec![SourceEntity::new("10.0.0.1", "edge-01")];
/// let summary = pipeline.run(sources).await?;
/// println!("Delivered {} records", summary.delivered());
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<E, T, L> {
    extractor: Arc<E>,
    transformer: Arc<T>,
    loader: Arc<L>,
    store: FailedBatchStore,
    options: PipelineOptions,
}

impl<E, T, L> Pipeline<E, T, L>
where
    E: Extractor + 'static,
    E::Item: 'static,
    T: Transformer<Input = E::Item, Output = NormalizedRecord> + 'static,
    L: Loader<Item = NormalizedRecord> + 'static,
{
    /// Create a new pipeline
    pub fn new(
        extractor: E,
        transformer: T,
        loader: L,
        store: FailedBatchStore,
        options: PipelineOptions,
    ) -> Self {
        Self {
            extractor: Arc::new(extractor),
            transformer: Arc::new(transformer),
            loader: Arc::new(loader),
            store,
            options,
        }
    }

    /// Run the complete ETL pipeline over `sources`
    ///
    /// Extraction and load failures do not fail the run; they are reported in
    /// the returned [`RunSummary`].
    ///
    /// # Errors
    /// Returns an error if the options are invalid or a task or lane worker
    /// panics
    pub async fn run(&self, sources: Vec<SourceEntity>) -> Result<RunSummary> {
        let started = Instant::now();
        let opts = &self.options;
        opts.validate().wrap_err("Invalid pipeline options")?;
        log::info!(
            "Starting ETL pipeline: {} lanes, flush threshold {}",
            opts.lanes,
            opts.flush_threshold
        );

        let (router, receivers) = LaneRouter::new(opts.lanes, opts.queue_depth);
        let workers: Vec<_> = receivers
            .into_iter()
            .enumerate()
            .map(|(lane, receiver)| {
                LaneWorker::new(
                    lane,
                    receiver,
                    Arc::clone(&self.loader),
                    self.store.clone(),
                    opts.flush_threshold,
                )
                .spawn()
            })
            .collect();

        log::debug!("Replaying failed batches...");
        let recovery = recover(&self.store, &router).await;
        if recovery.files > 0 {
            log::info!(
                "Re-enqueued {} records from {} failed batches",
                recovery.records,
                recovery.files
            );
        }

        log::debug!("Extracting from {} sources...", sources.len());
        let extract = ExtractScheduler::new(opts.concurrency, opts.extract_timeout)
            .run(
                sources,
                Arc::clone(&self.extractor),
                Arc::clone(&self.transformer),
                router,
            )
            .await?;

        log::debug!("Waiting for lane workers to flush...");
        let mut lanes = Vec::with_capacity(workers.len());
        for worker in workers {
            lanes.push(worker.await.wrap_err("Lane worker panicked")?);
        }

        Ok(RunSummary {
            recovery,
            extract,
            lanes,
            elapsed: started.elapsed(),
        })
    }
}
