//! Append-only CSV result table.
//!
//! Rows use CRLF terminators and minimal quoting (fields are quoted only when
//! they contain a delimiter, quote or line break). A running SHA-256 over the
//! written bytes lets two runs be compared for byte identity.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::sampler::OutputRecord;

pub const HEADER: [&str; 4] = ["Timestamp", "Frame", "Detected", "Confidence"];

const LINE_END: &str = "\r\n";

/// Writer for the four-column verdict table.
pub struct CsvTable<W: Write> {
    out: W,
    rows: u64,
    digest: Sha256,
}

/// What a finished table contained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSummary {
    pub rows: u64,
    /// Hex SHA-256 of the complete table bytes.
    pub sha256: String,
}

impl CsvTable<BufWriter<File>> {
    /// Create (truncate) the table at `path`, creating parent directories.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> CsvTable<W> {
    /// Wrap a writer and emit the header row.
    pub fn new(out: W) -> io::Result<Self> {
        let mut table = Self {
            out,
            rows: 0,
            digest: Sha256::new(),
        };
        table.write_row(&HEADER)?;
        Ok(table)
    }

    /// Append one record.
    pub fn append(&mut self, record: &OutputRecord) -> io::Result<()> {
        let fields = record.csv_fields();
        self.write_row(&fields)?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and report.
    pub fn finish(mut self) -> io::Result<TableSummary> {
        self.out.flush()?;
        Ok(TableSummary {
            rows: self.rows,
            sha256: hex::encode(self.digest.finalize()),
        })
    }

    fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> io::Result<()> {
        let mut line = String::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            push_field(&mut line, field.as_ref());
        }
        line.push_str(LINE_END);
        self.out.write_all(line.as_bytes())?;
        self.digest.update(line.as_bytes());
        Ok(())
    }
}

fn push_field(line: &mut String, field: &str) {
    let needs_quotes = field.contains([',', '"', '\r', '\n']);
    if !needs_quotes {
        line.push_str(field);
        return;
    }
    line.push('"');
    for ch in field.chars() {
        if ch == '"' {
            line.push('"');
        }
        line.push(ch);
    }
    line.push('"');
}
