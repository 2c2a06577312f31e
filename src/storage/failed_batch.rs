//! Persisted failure batches
//!
//! A batch the ingestion endpoint rejected is written as a gzip-compressed JSON
//! array of [`NormalizedRecord`] into the state directory, named after its lane:
//!
//! - `buffer_failed_worker3.json.gz` for the first failed batch of lane 3
//! - `buffer_failed_worker3_1.json.gz`, `buffer_failed_worker3_2.json.gz`, ... for
//!   later ones, so an unrecovered batch is never overwritten
//!
//! Files are written to a `.tmp` sibling first and renamed into place.

use crate::model::NormalizedRecord;
use eyre::{Context, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use regex::Regex;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const FAILED_BATCH_PREFIX: &str = "buffer_failed_worker";
pub const FAILED_BATCH_SUFFIX: &str = ".json.gz";
const PARTIAL_SUFFIX: &str = ".json.gz.tmp";

static FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^buffer_failed_worker(\d+)(?:_(\d+))?\.json\.gz$")
        .expect("failed batch file name pattern is valid")
});

/// A persisted failure batch found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBatchFile {
    pub path: PathBuf,
    /// Lane parsed from the file name, 0 when the name is malformed
    pub lane: usize,
    pub sequence: u64,
}

impl FailedBatchFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Parse `(lane, sequence)` from a failure batch file name.
///
/// Returns `None` for names outside the `buffer_failed_worker*.json.gz` family.
/// Names inside the family whose lane cannot be parsed fall back to lane 0.
pub fn parse_file_name(name: &str) -> Option<(usize, u64)> {
    if !name.starts_with(FAILED_BATCH_PREFIX) || !name.ends_with(FAILED_BATCH_SUFFIX) {
        return None;
    }

    let parsed = FILE_NAME.captures(name).and_then(|caps| {
        let lane = caps.get(1)?.as_str().parse::<usize>().ok()?;
        let sequence = match caps.get(2) {
            Some(seq) => seq.as_str().parse::<u64>().ok()?,
            None => 0,
        };
        Some((lane, sequence))
    });

    Some(parsed.unwrap_or_else(|| {
        log::warn!("Malformed failed batch file name {}, assigning lane 0", name);
        (0, 0)
    }))
}

/// File name for the given lane and sequence
pub fn file_name_for(lane: usize, sequence: u64) -> String {
    match sequence {
        0 => format!("{}{}{}", FAILED_BATCH_PREFIX, lane, FAILED_BATCH_SUFFIX),
        n => format!("{}{}_{}{}", FAILED_BATCH_PREFIX, lane, n, FAILED_BATCH_SUFFIX),
    }
}

/// Reads and writes persisted failure batches in one directory
#[derive(Debug, Clone)]
pub struct FailedBatchStore {
    dir: PathBuf,
}

impl FailedBatchStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Create the store, creating the directory if needed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List all failure batch files, ordered by lane then sequence
    pub fn scan(&self) -> Result<Vec<FailedBatchFile>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to scan state directory: {}", self.dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some((lane, sequence)) = parse_file_name(&name) {
                files.push(FailedBatchFile {
                    path: entry.path(),
                    lane,
                    sequence,
                });
            }
        }

        files.sort_by(|a, b| {
            (a.lane, a.sequence)
                .cmp(&(b.lane, b.sequence))
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(files)
    }

    /// Delete `.tmp` files left behind by a write that never reached its rename
    ///
    /// Returns the number of files removed.
    pub fn remove_partial_writes(&self) -> Result<usize> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to scan state directory: {}", self.dir.display()))?;

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(FAILED_BATCH_PREFIX) || !name.ends_with(PARTIAL_SUFFIX) {
                continue;
            }
            fs::remove_file(entry.path())
                .with_context(|| format!("Failed to delete partial write {}", name))?;
            log::warn!("Removed incomplete failed batch write {}", name);
            removed += 1;
        }
        Ok(removed)
    }

    /// Persist a batch for `lane` without touching earlier batches of that lane
    ///
    /// Returns the path written.
    pub fn persist(&self, lane: usize, records: &[NormalizedRecord]) -> Result<PathBuf> {
        let sequence = self.next_sequence(lane)?;
        let path = self.dir.join(file_name_for(lane, sequence));
        let tmp = path.with_extension("gz.tmp");

        write_batch(&tmp, records)?;
        fs::rename(&tmp, &path).with_context(|| {
            format!("Failed to move {} into place at {}", tmp.display(), path.display())
        })?;

        Ok(path)
    }

    /// Decode a persisted batch
    pub fn read(&self, path: impl AsRef<Path>) -> Result<Vec<NormalizedRecord>> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open failed batch: {}", path.display()))?;
        let decoder = GzDecoder::new(BufReader::new(file));
        serde_json::from_reader(decoder)
            .with_context(|| format!("Failed to decode failed batch: {}", path.display()))
    }

    pub fn remove(&self, file: &FailedBatchFile) -> Result<()> {
        fs::remove_file(&file.path)
            .with_context(|| format!("Failed to delete {}", file.path.display()))
    }

    fn next_sequence(&self, lane: usize) -> Result<u64> {
        let next = self
            .scan()?
            .iter()
            .filter(|f| f.lane == lane)
            .map(|f| f.sequence + 1)
            .max()
            .unwrap_or(0);
        Ok(next)
    }
}

fn write_batch(path: &Path, records: &[NormalizedRecord]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, records)
        .with_context(|| format!("Failed to encode batch to {}", path.display()))?;

    let mut writer = encoder
        .finish()
        .with_context(|| format!("Failed to finish gzip stream for {}", path.display()))?;
    writer.flush()?;
    writer
        .get_ref()
        .sync_all()
        .with_context(|| format!("Failed to sync {}", path.display()))?;
    Ok(())
}
