//! Run summary and process resource reporting

use super::{ExtractReport, LaneReport, RecoveryReport};
use owo_colors::OwoColorize;
use std::time::Duration;

/// Everything a pipeline run did
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub recovery: RecoveryReport,
    pub extract: ExtractReport,
    /// One entry per lane, in lane order
    pub lanes: Vec<LaneReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn lane(&self, lane: usize) -> Option<&LaneReport> {
        self.lanes.get(lane)
    }

    pub fn delivered(&self) -> usize {
        self.lanes.iter().map(|l| l.delivered).sum()
    }

    pub fn persisted(&self) -> usize {
        self.lanes.iter().map(|l| l.persisted).sum()
    }

    pub fn failed_batches(&self) -> usize {
        self.lanes.iter().map(|l| l.failed_batches).sum()
    }

    /// Write the summary to the log, one line per lane
    pub fn log(&self) {
        log::info!(
            "[Summary] Recovery: {} files, {} records, {} skipped",
            self.recovery.files,
            self.recovery.records,
            self.recovery.skipped
        );
        log::info!(
            "[Summary] Extract: {} sources, {} enqueued, {} failed, {} timed out",
            self.extract.sources,
            self.extract.enqueued,
            self.extract.failed,
            self.extract.timed_out
        );
        for lane in &self.lanes {
            log::info!(
                "[Summary] Lane-{}: received {}, flushes {}, delivered {}, failed batches {}, persisted {}",
                lane.lane,
                lane.received,
                lane.flushes,
                lane.delivered.green(),
                lane.failed_batches,
                lane.persisted.yellow()
            );
            if lane.lost > 0 {
                log::error!("[Summary] Lane-{}: {} records lost", lane.lane, lane.lost.red());
            }
        }
        log::info!(
            "[Summary] Delivered {} records, persisted {} for the next run, in {:?}",
            self.delivered().green(),
            self.persisted().yellow(),
            self.elapsed
        );
    }
}

/// Log process resource usage for a run phase
pub fn log_resource_usage(phase: &str) {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    log::info!("========= [{}] Resource Usage =========", phase.bright_white());
    log::info!("CPU Cores: {}", cores);
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        let metrics = handle.metrics();
        log::info!("Runtime Workers: {}", metrics.num_workers());
        log::info!("Alive Tasks: {}", metrics.num_alive_tasks());
    }
    log::info!("========================================");
}
