//! Integration tests for lane-partitioned pipeline runs
//!
//! These tests drive complete runs with in-memory extractor and loader doubles
//! and real failure batch files in a temporary state directory.

use eyre::Result;
use lane_etl::etl::{CpuTransformer, Extractor, Loader, Pipeline, PipelineOptions};
use lane_etl::model::{Indicator, NormalizedRecord, RawMetricRecord, SourceEntity};
use lane_etl::storage::{FailedBatchFile, FailedBatchStore};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Extractor that answers immediately with fixed percentages
struct InstantExtractor;

impl Extractor for InstantExtractor {
    type Item = RawMetricRecord;

    async fn extract(&self, entity: &SourceEntity) -> Result<Self::Item> {
        Ok(RawMetricRecord {
            name: entity.name.clone(),
            timestamp: 1_700_000_000,
            cpu_number: "0".to_string(),
            idle: "95".to_string(),
            user: "3".to_string(),
            system: "1".to_string(),
            irq: "0.5".to_string(),
            nice: "0".to_string(),
        })
    }
}

/// Loader that records every batch and either accepts or rejects all of them
#[derive(Clone)]
struct ScriptedLoader {
    batches: Arc<Mutex<Vec<Vec<NormalizedRecord>>>>,
    accept: bool,
}

impl ScriptedLoader {
    fn accepting() -> Self {
        Self {
            batches: Arc::default(),
            accept: true,
        }
    }

    fn rejecting() -> Self {
        Self {
            batches: Arc::default(),
            accept: false,
        }
    }

    fn batch_names(&self) -> Vec<BTreeSet<String>> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.iter().map(|r| r.name.clone()).collect())
            .collect()
    }
}

impl Loader for ScriptedLoader {
    type Item = NormalizedRecord;

    async fn load(&self, items: &[Self::Item]) -> Result<usize> {
        self.batches.lock().unwrap().push(items.to_vec());
        if !self.accept {
            eyre::bail!("Ingestion endpoint rejected batch (500 Internal Server Error)");
        }
        Ok(items.len())
    }
}

fn hosts(count: usize) -> Vec<SourceEntity> {
    (0..count)
        .map(|i| SourceEntity::new(format!("10.0.0.{}", i + 1), format!("host-{}", i)))
        .collect()
}

fn options(lanes: usize, threshold: usize) -> PipelineOptions {
    PipelineOptions {
        concurrency: 8,
        lanes,
        queue_depth: 16,
        flush_threshold: threshold,
        extract_timeout: Duration::from_secs(2),
    }
}

fn names(set: &[&str]) -> BTreeSet<String> {
    set.iter().map(|s| s.to_string()).collect()
}

fn read_names(store: &FailedBatchStore, file: &FailedBatchFile) -> Result<BTreeSet<String>> {
    Ok(store.read(&file.path)?.into_iter().map(|r| r.name).collect())
}

fn stale_record(name: String) -> NormalizedRecord {
    NormalizedRecord {
        name,
        cpu_number: "0".to_string(),
        timestamp: 1_600_000_000,
        indicators: vec![Indicator::new("utilization", 42.0)],
    }
}

#[tokio::test]
async fn test_endpoint_accepts_everything() -> Result<()> {
    let temp = TempDir::new()?;
    let store = FailedBatchStore::new(temp.path());
    let loader = ScriptedLoader::accepting();

    let pipeline = Pipeline::new(
        InstantExtractor,
        CpuTransformer::new(),
        loader.clone(),
        store.clone(),
        options(2, 2),
    );
    let summary = pipeline.run(hosts(3)).await?;

    // Lane 0 owns positions 0 and 2, lane 1 owns position 1
    assert_eq!(summary.lanes[0].received, 2);
    assert_eq!(summary.lanes[1].received, 1);
    assert_eq!(summary.lanes[0].flushes, 1);
    assert_eq!(summary.lanes[1].flushes, 1);
    assert_eq!(summary.delivered(), 3);

    let mut batches = loader.batch_names();
    batches.sort();
    assert_eq!(batches, vec![names(&["host-0", "host-2"]), names(&["host-1"])]);

    assert!(store.scan()?.is_empty(), "No failure files expected");
    Ok(())
}

#[tokio::test]
async fn test_endpoint_rejects_everything() -> Result<()> {
    let temp = TempDir::new()?;
    let store = FailedBatchStore::new(temp.path());

    let pipeline = Pipeline::new(
        InstantExtractor,
        CpuTransformer::new(),
        ScriptedLoader::rejecting(),
        store.clone(),
        options(2, 2),
    );
    let summary = pipeline.run(hosts(3)).await?;

    assert_eq!(summary.failed_batches(), 2);
    assert_eq!(summary.persisted(), 3);
    assert_eq!(summary.delivered(), 0);

    let files = store.scan()?;
    assert_eq!(files.len(), 2, "One failure file per lane");
    assert_eq!(files[0].lane, 0);
    assert_eq!(files[1].lane, 1);

    assert_eq!(read_names(&store, &files[0])?, names(&["host-0", "host-2"]));
    assert_eq!(read_names(&store, &files[1])?, names(&["host-1"]));

    // Persisted records keep their transformed indicators
    let record = &store.read(&files[1].path)?[0];
    assert_eq!(record.indicator("utilization"), Some(5.0));
    assert_eq!(record.indicators.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_persisted_batch_is_replayed_next_run() -> Result<()> {
    let temp = TempDir::new()?;
    let store = FailedBatchStore::new(temp.path());

    let leftover = ["old-a", "old-b"].map(|name| stale_record(name.to_string()));
    store.persist(1, &leftover)?;

    let loader = ScriptedLoader::accepting();
    let pipeline = Pipeline::new(
        InstantExtractor,
        CpuTransformer::new(),
        loader.clone(),
        store.clone(),
        options(2, 10),
    );
    let summary = pipeline.run(hosts(3)).await?;

    assert_eq!(summary.recovery.files, 1);
    assert_eq!(summary.recovery.records, 2);

    // Recovered (2) plus freshly extracted (host-1)
    assert_eq!(summary.lanes[1].received, 3);
    assert_eq!(summary.lanes[1].delivered, 3);
    assert_eq!(summary.lanes[0].received, 2);

    let batches = loader.batch_names();
    assert!(batches.contains(&names(&["old-a", "old-b", "host-1"])));

    assert!(store.scan()?.is_empty(), "Replayed file should be deleted");
    Ok(())
}

#[tokio::test]
async fn test_failed_replay_is_persisted_again() -> Result<()> {
    let temp = TempDir::new()?;
    let store = FailedBatchStore::new(temp.path());
    let leftover = NormalizedRecord {
        name: "old".to_string(),
        cpu_number: "0".to_string(),
        timestamp: 1,
        indicators: vec![],
    };
    store.persist(0, &[leftover])?;

    let pipeline = Pipeline::new(
        InstantExtractor,
        CpuTransformer::new(),
        ScriptedLoader::rejecting(),
        store.clone(),
        options(1, 10),
    );
    let summary = pipeline.run(hosts(1)).await?;

    assert_eq!(summary.recovery.files, 1);
    let files = store.scan()?;
    assert_eq!(files.len(), 1);

    assert_eq!(read_names(&store, &files[0])?, names(&["old", "host-0"]));
    Ok(())
}

#[tokio::test]
async fn test_corrupt_failure_file_does_not_stop_the_run() -> Result<()> {
    let temp = TempDir::new()?;
    let corrupt = temp.path().join("buffer_failed_worker0.json.gz");
    std::fs::write(&corrupt, b"definitely not gzip")?;

    let pipeline = Pipeline::new(
        InstantExtractor,
        CpuTransformer::new(),
        ScriptedLoader::accepting(),
        FailedBatchStore::new(temp.path()),
        options(2, 10),
    );
    let summary = pipeline.run(hosts(2)).await?;

    assert_eq!(summary.recovery.skipped, 1);
    assert_eq!(summary.delivered(), 2);
    assert!(corrupt.exists(), "Corrupt file is left for inspection");
    Ok(())
}

#[tokio::test]
async fn test_replay_larger_than_queue_depth_completes() -> Result<()> {
    let temp = TempDir::new()?;
    let store = FailedBatchStore::new(temp.path());
    for lane in 0..2 {
        let leftover: Vec<_> = (0..50)
            .map(|i| stale_record(format!("old-{}-{}", lane, i)))
            .collect();
        store.persist(lane, &leftover)?;
    }

    let loader = ScriptedLoader::accepting();
    let pipeline = Pipeline::new(
        InstantExtractor,
        CpuTransformer::new(),
        loader.clone(),
        store.clone(),
        PipelineOptions {
            queue_depth: 2,
            ..options(2, 3)
        },
    );
    let summary = tokio::time::timeout(Duration::from_secs(10), pipeline.run(hosts(30)))
        .await
        .expect("Run blocked on a full lane queue")?;

    assert_eq!(summary.recovery.files, 2);
    assert_eq!(summary.recovery.records, 100);
    assert_eq!(summary.extract.enqueued, 30);
    assert_eq!(summary.delivered(), 130);

    let delivered: usize = loader.batches.lock().unwrap().iter().map(Vec::len).sum();
    assert_eq!(delivered, 130);
    assert!(store.scan()?.is_empty(), "Replayed files should be deleted");
    Ok(())
}
