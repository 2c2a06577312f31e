//! Lanes: bounded queues feeding one buffering load worker each
//!
//! Every lane has one [`mpsc`] queue with many senders (extraction tasks and the
//! recovery loader) and exactly one receiver, its [`LaneWorker`]. The worker
//! appends to its [`LaneBuffer`] and flushes synchronously once the buffer reaches
//! the flush threshold, and once more when the queue closes.

use super::Loader;
use crate::model::NormalizedRecord;
use crate::storage::FailedBatchStore;
use eyre::{Result, eyre};
use owo_colors::OwoColorize;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Sending side of all lane queues
///
/// Dropping the router (or calling [`LaneRouter::close`]) once every clone of
/// its senders is gone closes every queue, which tells the workers to finish.
#[derive(Debug)]
pub struct LaneRouter {
    senders: Vec<mpsc::Sender<NormalizedRecord>>,
}

impl LaneRouter {
    /// Create `lanes` queues of `depth` records each
    ///
    /// Returns the router and the receivers, in lane order.
    pub fn new(lanes: usize, depth: usize) -> (Self, Vec<mpsc::Receiver<NormalizedRecord>>) {
        let (senders, receivers) = (0..lanes).map(|_| mpsc::channel(depth)).unzip();
        (Self { senders }, receivers)
    }

    pub fn lanes(&self) -> usize {
        self.senders.len()
    }

    /// Clone the sender for one lane, for handing to a task
    pub fn sender(&self, lane: usize) -> mpsc::Sender<NormalizedRecord> {
        self.senders[lane].clone()
    }

    /// Enqueue a record, waiting while the lane queue is full
    ///
    /// # Errors
    /// Returns an error if the lane's worker is gone
    pub async fn send(&self, lane: usize, record: NormalizedRecord) -> Result<()> {
        self.senders[lane]
            .send(record)
            .await
            .map_err(|_| eyre!("Lane {} queue is closed", lane))
    }

    /// Close every lane queue
    pub fn close(self) {
        log::debug!("Closing {} lane queues", self.senders.len());
        drop(self.senders);
    }
}

/// Per-lane record buffer, guarded for the append-and-flush critical section
#[derive(Debug, Default)]
pub struct LaneBuffer {
    records: Mutex<Vec<NormalizedRecord>>,
}

impl LaneBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

/// What one lane did during a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaneReport {
    pub lane: usize,
    /// Records taken off the queue
    pub received: usize,
    /// Flush attempts, successful or not
    pub flushes: usize,
    /// Records accepted by the loader
    pub delivered: usize,
    /// Flushes the loader rejected
    pub failed_batches: usize,
    /// Records written to failure files
    pub persisted: usize,
    /// Records lost because their failure file could not be written
    pub lost: usize,
}

/// Long-lived consumer of one lane queue
pub struct LaneWorker<L> {
    lane: usize,
    receiver: mpsc::Receiver<NormalizedRecord>,
    buffer: Arc<LaneBuffer>,
    loader: Arc<L>,
    store: FailedBatchStore,
    threshold: usize,
    report: LaneReport,
}

impl<L> LaneWorker<L>
where
    L: Loader<Item = NormalizedRecord> + 'static,
{
    pub fn new(
        lane: usize,
        receiver: mpsc::Receiver<NormalizedRecord>,
        loader: Arc<L>,
        store: FailedBatchStore,
        threshold: usize,
    ) -> Self {
        Self {
            lane,
            receiver,
            buffer: Arc::new(LaneBuffer::with_capacity(threshold)),
            loader,
            store,
            threshold,
            report: LaneReport {
                lane,
                ..LaneReport::default()
            },
        }
    }

    /// Handle to this worker's buffer, for inspection
    pub fn buffer(&self) -> Arc<LaneBuffer> {
        Arc::clone(&self.buffer)
    }

    pub fn spawn(self) -> JoinHandle<LaneReport> {
        tokio::spawn(self.run())
    }

    /// Consume the queue until it closes, then flush the remainder
    pub async fn run(mut self) -> LaneReport {
        log::debug!("[Lane-{}] worker started", self.lane);

        while let Some(record) = self.receiver.recv().await {
            self.report.received += 1;
            let buffer = Arc::clone(&self.buffer);
            let mut records = buffer.records.lock().await;
            records.push(record);
            if records.len() >= self.threshold {
                self.flush(&mut records).await;
            }
        }

        let buffer = Arc::clone(&self.buffer);
        let mut records = buffer.records.lock().await;
        if !records.is_empty() {
            self.flush(&mut records).await;
        }

        log::debug!(
            "[Lane-{}] worker finished after {} records",
            self.lane,
            self.report.received
        );
        self.report
    }

    /// Submit the buffered records as one batch, persisting them on failure
    ///
    /// The buffer is empty afterwards whatever the outcome.
    async fn flush(&mut self, records: &mut Vec<NormalizedRecord>) {
        let batch = std::mem::take(records);
        self.report.flushes += 1;

        match self.loader.load(&batch).await {
            Ok(_) => {
                self.report.delivered += batch.len();
                log::info!(
                    "[Lane-{}] Successfully flushed {} records",
                    self.lane,
                    batch.len().cyan()
                );
            }
            Err(e) => {
                self.report.failed_batches += 1;
                log::warn!(
                    "[Lane-{}] Load failed: {:#}. Saving {} records.",
                    self.lane,
                    e,
                    batch.len()
                );
                self.persist(batch).await;
            }
        }
    }

    /// Write a rejected batch to disk on the blocking pool
    async fn persist(&mut self, batch: Vec<NormalizedRecord>) {
        let count = batch.len();
        let store = self.store.clone();
        let lane = self.lane;
        let written = tokio::task::spawn_blocking(move || store.persist(lane, &batch))
            .await
            .map_err(|e| eyre!("Persist task failed: {}", e))
            .and_then(|result| result);

        match written {
            Ok(path) => {
                self.report.persisted += count;
                log::info!(
                    "[Lane-{}] Saved failed batch to {}",
                    self.lane,
                    path.display().bright_black()
                );
            }
            Err(e) => {
                self.report.lost += count;
                log::error!(
                    "[Lane-{}] Could not persist failed batch, {} records lost: {:#}",
                    self.lane,
                    count,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Indicator;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    fn record(name: &str) -> NormalizedRecord {
        NormalizedRecord {
            name: name.to_string(),
            cpu_number: "0".to_string(),
            timestamp: 0,
            indicators: vec![Indicator::new("utilization", 1.0)],
        }
    }

    /// Records every batch; fails all of them when `fail` is set
    #[derive(Default)]
    struct RecordingLoader {
        batches: StdMutex<Vec<Vec<NormalizedRecord>>>,
        fail: bool,
    }

    impl Loader for RecordingLoader {
        type Item = NormalizedRecord;

        async fn load(&self, items: &[Self::Item]) -> Result<usize> {
            self.batches.lock().unwrap().push(items.to_vec());
            if self.fail {
                eyre::bail!("endpoint returned 503");
            }
            Ok(items.len())
        }
    }

    impl RecordingLoader {
        fn sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    async fn run_lane(
        loader: Arc<RecordingLoader>,
        store: FailedBatchStore,
        threshold: usize,
        names: &[&str],
    ) -> (LaneReport, Arc<LaneBuffer>) {
        let (router, mut receivers) = LaneRouter::new(1, 16);
        let worker = LaneWorker::new(0, receivers.remove(0), loader, store, threshold);
        let buffer = worker.buffer();
        let handle = worker.spawn();

        for name in names {
            router.send(0, record(name)).await.unwrap();
        }
        router.close();

        (handle.await.unwrap(), buffer)
    }

    #[tokio::test]
    async fn test_flushes_at_threshold_before_next_record() {
        let temp = TempDir::new().unwrap();
        let loader = Arc::new(RecordingLoader::default());

        let (report, _) = run_lane(
            loader.clone(),
            FailedBatchStore::new(temp.path()),
            2,
            &["a", "b", "c"],
        )
        .await;

        assert_eq!(loader.sizes(), vec![2, 1]);
        assert_eq!(report.flushes, 2);
        assert_eq!(report.delivered, 3);
    }

    #[tokio::test]
    async fn test_below_threshold_flushes_once_at_close() {
        let temp = TempDir::new().unwrap();
        let loader = Arc::new(RecordingLoader::default());

        let (report, _) = run_lane(
            loader.clone(),
            FailedBatchStore::new(temp.path()),
            5,
            &["a", "b"],
        )
        .await;

        assert_eq!(loader.sizes(), vec![2]);
        assert_eq!(report.flushes, 1);
    }

    #[tokio::test]
    async fn test_exact_threshold_flushes_once() {
        let temp = TempDir::new().unwrap();
        let loader = Arc::new(RecordingLoader::default());

        let (report, _) = run_lane(
            loader.clone(),
            FailedBatchStore::new(temp.path()),
            2,
            &["a", "b"],
        )
        .await;

        assert_eq!(loader.sizes(), vec![2]);
        assert_eq!(report.flushes, 1);
    }

    #[tokio::test]
    async fn test_empty_lane_never_flushes() {
        let temp = TempDir::new().unwrap();
        let loader = Arc::new(RecordingLoader {
            fail: true,
            ..Default::default()
        });
        let store = FailedBatchStore::new(temp.path());

        let (report, _) = run_lane(loader.clone(), store.clone(), 2, &[]).await;

        assert!(loader.sizes().is_empty());
        assert_eq!(report.flushes, 0);
        assert!(store.scan().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_flush_persists_batch_and_empties_buffer() {
        let temp = TempDir::new().unwrap();
        let loader = Arc::new(RecordingLoader {
            fail: true,
            ..Default::default()
        });
        let store = FailedBatchStore::new(temp.path());

        let (report, buffer) = run_lane(loader, store.clone(), 10, &["x", "y", "z"]).await;

        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.persisted, 3);
        assert!(buffer.is_empty().await);

        let files = store.scan().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].lane, 0);
        let names: Vec<String> = store
            .read(&files[0].path)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn test_two_failed_flushes_keep_both_batches() {
        let temp = TempDir::new().unwrap();
        let loader = Arc::new(RecordingLoader {
            fail: true,
            ..Default::default()
        });
        let store = FailedBatchStore::new(temp.path());

        let (report, _) = run_lane(loader, store.clone(), 2, &["a", "b", "c"]).await;

        assert_eq!(report.failed_batches, 2);
        let files = store.scan().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(store.read(&files[0].path).unwrap().len(), 2);
        assert_eq!(store.read(&files[1].path).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_to_closed_lane_fails() {
        let (router, receivers) = LaneRouter::new(2, 1);
        drop(receivers);

        assert_eq!(router.lanes(), 2);
        assert!(router.send(1, record("a")).await.is_err());
    }

    #[tokio::test]
    async fn test_send_waits_while_queue_is_full() {
        let (router, mut receivers) = LaneRouter::new(1, 2);
        router.send(0, record("a")).await.unwrap();
        router.send(0, record("b")).await.unwrap();

        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            router.send(0, record("c")),
        )
        .await;
        assert!(blocked.is_err(), "send should wait for queue space");

        assert_eq!(receivers[0].recv().await.unwrap().name, "a");
        router.send(0, record("c")).await.unwrap();
        assert_eq!(receivers[0].recv().await.unwrap().name, "b");
        assert_eq!(receivers[0].recv().await.unwrap().name, "c");
    }
}
