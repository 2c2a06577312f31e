//! File system storage operations
//!
//! This module handles all file I/O operations including:
//! - Reading the CSV source list
//! - Persisting and decoding failed flush batches

mod failed_batch;
mod sources;

pub use failed_batch::{
    FAILED_BATCH_PREFIX, FAILED_BATCH_SUFFIX, FailedBatchFile, FailedBatchStore, file_name_for,
    parse_file_name,
};
pub use sources::SourceListReader;
