//! Replay of failure batches persisted by earlier runs

use super::LaneRouter;
use crate::storage::FailedBatchStore;
use eyre::eyre;
use owo_colors::OwoColorize;

/// Totals for the recovery phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Files fully re-enqueued and deleted
    pub files: usize,
    pub records: usize,
    /// Files left on disk because they could not be decoded or delivered
    pub skipped: usize,
}

/// Re-enqueue every persisted failure batch onto its lane
///
/// Files are processed in (lane, sequence) order. A file is deleted only after
/// all of its records were enqueued. Files that fail to decode are left on disk
/// for inspection. A lane id beyond the current lane count is folded back into
/// range.
pub async fn recover(store: &FailedBatchStore, router: &LaneRouter) -> RecoveryReport {
    let mut report = RecoveryReport::default();

    if let Err(e) = store.remove_partial_writes() {
        log::warn!("[Recovery] Could not clean up partial writes: {:#}", e);
    }

    let files = match store.scan() {
        Ok(files) => files,
        Err(e) => {
            log::error!("[Recovery] Error scanning failed batch files: {:#}", e);
            return report;
        }
    };

    if files.is_empty() {
        log::debug!("[Recovery] No failed batches to reload");
        return report;
    }

    'files: for file in files {
        log::info!(
            "[Recovery] Reloading failed batch: {}",
            file.file_name().bright_black()
        );

        let reader = store.clone();
        let path = file.path.clone();
        let records = match tokio::task::spawn_blocking(move || reader.read(&path))
            .await
            .map_err(|e| eyre!("Read task failed: {}", e))
            .and_then(|result| result)
        {
            Ok(records) => records,
            Err(e) => {
                log::warn!("[Recovery] Skipping {}: {:#}", file.file_name(), e);
                report.skipped += 1;
                continue;
            }
        };

        let lane = if file.lane < router.lanes() {
            file.lane
        } else {
            let folded = file.lane % router.lanes();
            log::warn!(
                "[Recovery] {} names lane {} but only {} lanes exist, using lane {}",
                file.file_name(),
                file.lane,
                router.lanes(),
                folded
            );
            folded
        };

        let count = records.len();
        for record in records {
            if let Err(e) = router.send(lane, record).await {
                log::error!(
                    "[Recovery] Could not re-enqueue {}: {:#}",
                    file.file_name(),
                    e
                );
                report.skipped += 1;
                continue 'files;
            }
        }
        report.records += count;
        report.files += 1;

        match store.remove(&file) {
            Ok(()) => log::info!(
                "[Recovery] Re-enqueued {} records onto lane {} and deleted {}",
                count.cyan(),
                lane,
                file.file_name()
            ),
            Err(e) => log::warn!("[Recovery] {:#}", e),
        }
    }

    report
}
