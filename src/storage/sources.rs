//! Source list reader
//!
//! Reads `address,name` rows from a headerless CSV file.

use crate::model::SourceEntity;
use eyre::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Read the list of source entities from a CSV file
pub struct SourceListReader {
    path: PathBuf,
}

impl SourceListReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read all entities in file order
    ///
    /// Rows with fewer than two columns, or that fail to parse, are skipped with
    /// a warning. Columns past the second are ignored. Bytes that are not valid
    /// UTF-8 are replaced rather than rejecting the row.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read
    pub fn read(&self) -> Result<Vec<SourceEntity>> {
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open source list: {}", self.path.display()))?;
        parse_sources(file)
            .with_context(|| format!("Failed to read source list: {}", self.path.display()))
    }
}

fn parse_sources(input: impl Read) -> Result<Vec<SourceEntity>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut entities = Vec::new();
    for (i, row) in reader.byte_records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                log::warn!("Skipping unparsable source line {}: {}", i + 1, e);
                continue;
            }
        };

        match (row.get(0), row.get(1)) {
            (Some(address), Some(name)) => {
                let address = String::from_utf8_lossy(address);
                let name = String::from_utf8_lossy(name);
                if std::str::from_utf8(row.as_slice()).is_err() {
                    log::warn!("Source line {} is not valid UTF-8: {}", i + 1, name);
                }
                entities.push(SourceEntity::new(address, name));
            }
            _ => log::warn!("Skipping invalid source line {}", i + 1),
        }
    }

    log::debug!("Read {} source entities", entities.len());
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_sources() {
        let input = "10.0.0.1,edge-01\n10.0.0.2,edge-02,extra\n";
        let entities = parse_sources(input.as_bytes()).unwrap();

        assert_eq!(
            entities,
            vec![
                SourceEntity::new("10.0.0.1", "edge-01"),
                SourceEntity::new("10.0.0.2", "edge-02"),
            ]
        );
    }

    #[test]
    fn test_short_rows_are_skipped() {
        let input = "10.0.0.1,edge-01\nlonely\n10.0.0.3,edge-03\n";
        let entities = parse_sources(input.as_bytes()).unwrap();

        let names: Vec<&str> = entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["edge-01", "edge-03"]);
    }

    #[test]
    fn test_invalid_utf8_does_not_lose_other_rows() {
        let input = b"10.0.0.1,edge-01\n10.0.0.2,caf\xe9\n10.0.0.3,edge-03\n";
        let entities = parse_sources(&input[..]).unwrap();

        let names: Vec<&str> = entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["edge-01", "caf\u{FFFD}", "edge-03"]);
        assert_eq!(entities[1].address, "10.0.0.2");
    }

    #[test]
    fn test_read_file() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "192.168.1.10, core-router").unwrap();

        let entities = SourceListReader::new(temp.path()).read().unwrap();
        assert_eq!(entities, vec![SourceEntity::new("192.168.1.10", "core-router")]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let reader = SourceListReader::new("/nonexistent/appliances.csv");
        assert!(reader.read().is_err());
    }
}
