//! Records flowing through the pipeline
//!
//! A [`SourceEntity`] is extracted into a [`RawMetricRecord`], transformed into a
//! [`NormalizedRecord`], and shipped to the ingestion endpoint in batches.

use serde::{Deserialize, Serialize};

/// A device to collect metrics from, as listed in the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntity {
    pub address: String,
    pub name: String,
}

impl SourceEntity {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }
}

/// CPU statistics as reported by a device.
///
/// The percentage fields are kept as the device sent them. Parsing happens in
/// the transformer so a garbled value never fails extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetricRecord {
    pub name: String,
    pub timestamp: u64,
    pub cpu_number: String,
    #[serde(rename = "pIdle")]
    pub idle: String,
    #[serde(rename = "pUser")]
    pub user: String,
    #[serde(rename = "pSys")]
    pub system: String,
    #[serde(rename = "pIRQ")]
    pub irq: String,
    #[serde(rename = "pNice")]
    pub nice: String,
}

/// One derived measurement, e.g. `utilization` or `irq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub name: String,
    pub value: f64,
}

impl Indicator {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// The record submitted to the ingestion endpoint and persisted on flush failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub name: String,
    pub cpu_number: String,
    pub timestamp: u64,
    pub indicators: Vec<Indicator>,
}

impl NormalizedRecord {
    /// Look up an indicator value by name
    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators
            .iter()
            .find(|i| i.name == name)
            .map(|i| i.value)
    }
}
