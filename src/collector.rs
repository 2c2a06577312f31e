//! Stand-in metric collector
//!
//! Simulates polling a device: waits a fixed latency, then reports fixed CPU
//! percentages stamped with the current time. A real collector replaces this
//! with the device protocol.

use crate::etl::Extractor;
use crate::model::{RawMetricRecord, SourceEntity};
use eyre::Result;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_LATENCY: Duration = Duration::from_secs(6);

#[derive(Debug, Clone)]
pub struct SimulatedCollector {
    latency: Duration,
}

impl Default for SimulatedCollector {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY)
    }
}

impl SimulatedCollector {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Extractor for SimulatedCollector {
    type Item = RawMetricRecord;

    async fn extract(&self, entity: &SourceEntity) -> Result<Self::Item> {
        log::trace!("[Extract] Polling {} ({})", entity.name, entity.address);
        tokio::time::sleep(self.latency).await;

        Ok(RawMetricRecord {
            name: entity.name.clone(),
            timestamp: unix_now(),
            cpu_number: "0".to_string(),
            idle: "95".to_string(),
            user: "3".to_string(),
            system: "1".to_string(),
            irq: "0.5".to_string(),
            nice: "0".to_string(),
        })
    }
}
