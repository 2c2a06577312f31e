//! CLI helper functions

use crate::{
    client::{HealthStatus, IngestClient},
    collector::SimulatedCollector,
    config::EtlConfig,
    etl::{CpuTransformer, Pipeline, RunSummary, log_resource_usage},
    storage::{FailedBatchFile, FailedBatchStore, SourceListReader},
};
use eyre::{Context, Result};
use owo_colors::OwoColorize;

/// Build the ingestion client from configuration
pub fn load_ingest_client(config: &EtlConfig) -> Result<IngestClient> {
    IngestClient::with_timeout(config.url.clone(), config.auth.clone(), config.request_timeout)
        .context("Failed to create ingestion client")
}

/// Run the full pipeline
///
/// Pipeline: failed batch replay → SimulatedCollector → CpuTransformer → lanes → IngestClient
pub async fn run_pipeline(config: &EtlConfig) -> Result<RunSummary> {
    config.validate()?;

    log::info!("Reading sources from {}", config.sources.display().bright_black());
    let sources = SourceListReader::new(&config.sources).read()?;
    log::info!("Loaded {} source entities", sources.len().cyan());

    let store = FailedBatchStore::open(&config.state_dir)?;
    let client = load_ingest_client(config)?;
    log::info!(
        "Loading to {} (auth: {})",
        client.url().bright_black(),
        config.auth
    );

    let pipeline = Pipeline::new(
        SimulatedCollector::new(config.collector_latency),
        CpuTransformer::new(),
        client,
        store,
        config.pipeline.clone(),
    );

    log_resource_usage("Before ETL");
    let summary = pipeline.run(sources).await?;
    log_resource_usage("After ETL");

    summary.log();
    log::info!("Total execution time: {:?}", summary.elapsed);
    Ok(summary)
}

/// Check the ingestion endpoint's health operation
pub async fn check_health(config: &EtlConfig) -> Result<HealthStatus> {
    let client = load_ingest_client(config)?;
    log::info!("Checking {}", client.health_url().bright_black());
    client.health().await
}

/// A persisted failure batch and its decoded record count
#[derive(Debug)]
pub struct PendingBatch {
    pub file: FailedBatchFile,
    /// `None` when the file cannot be decoded
    pub records: Option<usize>,
}

/// List failure batches waiting for the next run
pub fn list_pending(config: &EtlConfig) -> Result<Vec<PendingBatch>> {
    let store = FailedBatchStore::new(&config.state_dir);
    let pending = store
        .scan()?
        .into_iter()
        .map(|file| {
            let records = match store.read(&file.path) {
                Ok(records) => Some(records.len()),
                Err(e) => {
                    log::warn!("{:#}", e);
                    None
                }
            };
            PendingBatch { file, records }
        })
        .collect();
    Ok(pending)
}
