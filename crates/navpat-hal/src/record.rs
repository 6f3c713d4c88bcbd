//! Append-only JSON-lines record log.
//!
//! Each line is one [`LogRecord`]: a sequence number and either a command
//! that was sent or a telemetry frame that was received, in the order they
//! crossed the channel.  Floats are written with round-trip precision so a
//! replayed frame is bit-identical to the live one.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;

use navpat_types::{Command, NavError, TelemetryFrame};
use serde::{Deserialize, Serialize};

/// One line of the `can` log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub seq: u64,
    pub entry: LogEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum LogEntry {
    Command(Command),
    Frame(TelemetryFrame),
}

fn io_error(path: &Path, e: std::io::Error) -> NavError {
    NavError::SessionLog(format!("{}: {e}", path.display()))
}

// ────────────────────────────────────────────────────────────────────────────
// Writer
// ────────────────────────────────────────────────────────────────────────────

pub struct LogWriter {
    writer: BufWriter<File>,
    next_seq: u64,
}

impl LogWriter {
    /// Create (or truncate) the log at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, NavError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| io_error(path, e))?;
        Ok(Self {
            writer: BufWriter::new(file),
            next_seq: 0,
        })
    }

    /// Append `entry` and return its sequence number.
    pub fn append(&mut self, entry: LogEntry) -> Result<u64, NavError> {
        let record = LogRecord {
            seq: self.next_seq,
            entry,
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| NavError::SessionLog(format!("encode record {}: {e}", record.seq)))?;
        writeln!(self.writer, "{line}")
            .map_err(|e| NavError::SessionLog(format!("write record {}: {e}", record.seq)))?;
        self.next_seq += 1;
        Ok(record.seq)
    }

    pub fn flush(&mut self) -> Result<(), NavError> {
        self.writer
            .flush()
            .map_err(|e| NavError::SessionLog(format!("flush: {e}")))
    }

    /// Number of records written so far.
    pub fn len(&self) -> u64 {
        self.next_seq
    }

    pub fn is_empty(&self) -> bool {
        self.next_seq == 0
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Reader
// ────────────────────────────────────────────────────────────────────────────

pub struct LogReader {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl LogReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NavError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| io_error(path, e))?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }

    /// Next record, or `None` at end of file.  Blank lines are skipped.
    pub fn next_record(&mut self) -> Result<Option<LogRecord>, NavError> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line =
                line.map_err(|e| NavError::SessionLog(format!("line {}: {e}", self.line_no)))?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .map_err(|e| NavError::SessionLog(format!("line {}: {e}", self.line_no)))?;
            return Ok(Some(record));
        }
        Ok(None)
    }
}
