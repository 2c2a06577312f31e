//! Core ETL (Extract, Transform, Load) pipeline
//!
//! This module provides the trait definitions for the three stages and the
//! lane-partitioned machinery that connects them: bounded concurrent extraction,
//! static partitioning onto lanes, per-lane buffering load workers, and replay
//! of batches that failed to load in earlier runs.

mod extract;
mod lane;
mod load;
pub mod partition;
mod pipeline;
mod recovery;
mod report;
mod scheduler;
mod transform;

pub use extract::Extractor;
pub use lane::{LaneBuffer, LaneReport, LaneRouter, LaneWorker};
pub use load::Loader;
pub use pipeline::{Pipeline, PipelineOptions};
pub use recovery::{RecoveryReport, recover};
pub use report::{RunSummary, log_resource_usage};
pub use scheduler::{ExtractReport, ExtractScheduler};
pub use transform::{CpuTransformer, INDICATOR_ORDER, Transformer};
