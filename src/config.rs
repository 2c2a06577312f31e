//! Run configuration
//!
//! Values come from environment variables (usually sourced from a `.env` file)
//! and may be overridden by command line flags.
//!
//! Environment variables:
//! - ETL_EXTRACT_CONCURRENCY: maximum extractions in flight (default 1000)
//! - ETL_LANES: number of load lanes (default 10)
//! - ETL_QUEUE_DEPTH: capacity of each lane queue (default 2000)
//! - ETL_FLUSH_THRESHOLD: buffered records per flush (default 200)
//! - ETL_EXTRACT_TIMEOUT_MS: per-source extraction timeout (default 8000)
//! - ETL_COLLECTOR_LATENCY_MS: simulated collector latency (default 6000)
//! - ETL_SOURCES: CSV source list (default appliances.csv)
//! - ETL_STATE_DIR: where failed batches are kept (default .)
//! - INGEST_URL: ingestion endpoint (default http://localhost:8080/load)
//! - INGEST_TOKEN: bearer token (optional)
//! - INGEST_TIMEOUT_MS: request timeout (default 15000)

use crate::client::{Auth, DEFAULT_REQUEST_TIMEOUT};
use crate::collector::DEFAULT_LATENCY;
use crate::etl::PipelineOptions;
use eyre::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_URL: &str = "http://localhost:8080/load";
pub const DEFAULT_SOURCES: &str = "appliances.csv";

#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub pipeline: PipelineOptions,
    pub collector_latency: Duration,
    pub url: Url,
    pub auth: Auth,
    pub request_timeout: Duration,
    pub sources: PathBuf,
    pub state_dir: PathBuf,
}

/// Command line values that take precedence over the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub concurrency: Option<usize>,
    pub lanes: Option<usize>,
    pub queue_depth: Option<usize>,
    pub flush_threshold: Option<usize>,
    pub extract_timeout_ms: Option<u64>,
    pub collector_latency_ms: Option<u64>,
    pub url: Option<String>,
    pub sources: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {}", key, raw)),
        None => Ok(default),
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).with_context(|| format!("Invalid ingestion URL: {}", raw))
}

impl EtlConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through a variable lookup function
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = PipelineOptions::default();
        let pipeline = PipelineOptions {
            concurrency: parse_var(&lookup, "ETL_EXTRACT_CONCURRENCY", defaults.concurrency)?,
            lanes: parse_var(&lookup, "ETL_LANES", defaults.lanes)?,
            queue_depth: parse_var(&lookup, "ETL_QUEUE_DEPTH", defaults.queue_depth)?,
            flush_threshold: parse_var(&lookup, "ETL_FLUSH_THRESHOLD", defaults.flush_threshold)?,
            extract_timeout: Duration::from_millis(parse_var(
                &lookup,
                "ETL_EXTRACT_TIMEOUT_MS",
                defaults.extract_timeout.as_millis() as u64,
            )?),
        };

        let url = parse_url(&lookup("INGEST_URL").unwrap_or_else(|| DEFAULT_URL.to_string()))?;

        let config = Self {
            pipeline,
            collector_latency: Duration::from_millis(parse_var(
                &lookup,
                "ETL_COLLECTOR_LATENCY_MS",
                DEFAULT_LATENCY.as_millis() as u64,
            )?),
            url,
            auth: Auth::new(lookup("INGEST_TOKEN")),
            request_timeout: Duration::from_millis(parse_var(
                &lookup,
                "INGEST_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            )?),
            sources: lookup("ETL_SOURCES")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCES)),
            state_dir: lookup("ETL_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        };

        Ok(config)
    }

    /// Apply command line overrides
    pub fn apply(mut self, overrides: Overrides) -> Result<Self> {
        let p = &mut self.pipeline;
        if let Some(v) = overrides.concurrency {
            p.concurrency = v;
        }
        if let Some(v) = overrides.lanes {
            p.lanes = v;
        }
        if let Some(v) = overrides.queue_depth {
            p.queue_depth = v;
        }
        if let Some(v) = overrides.flush_threshold {
            p.flush_threshold = v;
        }
        if let Some(ms) = overrides.extract_timeout_ms {
            p.extract_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = overrides.collector_latency_ms {
            self.collector_latency = Duration::from_millis(ms);
        }
        if let Some(url) = overrides.url {
            self.url = parse_url(&url)?;
        }
        if let Some(sources) = overrides.sources {
            self.sources = sources;
        }
        if let Some(dir) = overrides.state_dir {
            self.state_dir = dir;
        }
        Ok(self)
    }

    /// Check that every size and timeout is usable
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        p.validate()?;
        if self.request_timeout.is_zero() {
            eyre::bail!("The request timeout must be greater than zero");
        }

        if p.extract_timeout <= self.collector_latency {
            log::warn!(
                "Extraction timeout {:?} does not exceed collector latency {:?}, every extraction will time out",
                p.extract_timeout,
                self.collector_latency
            );
        }
        Ok(())
    }
}
