//! JSONL results file.
//!
//! Each cycle appends one line: the run record plus the wall-clock time it
//! was written. Records are never rewritten in place.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use nanofolio::RunRecord;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One line of the results file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: RunRecord,
}

/// Append-only results writer.
pub struct ResultsLog {
    writer: BufWriter<fs::File>,
}

impl ResultsLog {
    /// Open (or create) the results file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn append(&mut self, record: &RunRecord) -> Result<()> {
        let line = StoredRecord {
            recorded_at: Utc::now(),
            record: record.clone(),
        };
        let json = serde_json::to_string(&line)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Read back every record in file order. A missing file reads as empty.
pub fn read_records(path: &Path) -> Result<Vec<StoredRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(fs::File::open(path)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let stored = serde_json::from_str(&line)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        out.push(stored);
    }
    Ok(out)
}
