//! Lane ETL
//!
//! Extracts CPU metrics from many devices with bounded concurrency, normalizes
//! them, and loads them into an ingestion endpoint through a fixed set of
//! buffered lanes. Batches the endpoint rejects are persisted and replayed on
//! the next run.

pub mod cli;
pub mod client;
pub mod collector;
pub mod config;
pub mod etl;
pub mod model;
pub mod storage;

// Re-exports for convenience
pub use client::{Auth, IngestClient};
pub use collector::SimulatedCollector;
pub use config::EtlConfig;
pub use etl::{CpuTransformer, Extractor, Loader, Pipeline, PipelineOptions, Transformer};
pub use model::{Indicator, NormalizedRecord, RawMetricRecord, SourceEntity};
pub use storage::{FailedBatchStore, SourceListReader};
