//! CSV record sink
//!
//! Writes a `name,email,reviews` header followed by one row per record. The
//! `reviews` column holds a JSON array such as `[{"rating":4.5},{"rating":null}]`.

use crate::output::{OutputResult, RecordSink};
use crate::records::AccommodationRecord;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Column names of the results file
pub const CSV_HEADER: [&str; 3] = ["name", "email", "reviews"];

/// [`RecordSink`] writing CSV rows
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl CsvSink<File> {
    /// Creates (or truncates) the file at `path` and writes the header
    pub fn create(path: &Path) -> OutputResult<Self> {
        Self::new(File::create(path)?)
    }
}

impl<W: Write> CsvSink<W> {
    /// Wraps `inner` and writes the header right away, so an empty run still
    /// produces a well-formed file
    pub fn new(inner: W) -> OutputResult<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(CSV_HEADER)?;
        Ok(Self { writer, rows: 0 })
    }

    /// Data rows written so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flushes and returns the underlying writer
    pub fn into_inner(self) -> OutputResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| e.into_error().into())
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn write_batch(&mut self, records: &[AccommodationRecord]) -> OutputResult<()> {
        for record in records {
            let reviews = record.reviews_json();
            self.writer
                .write_record([record.name(), record.email(), reviews.as_str()])?;
            self.rows += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes `records` to a fresh CSV file at `path`
pub fn write_csv(path: &Path, records: &[AccommodationRecord]) -> OutputResult<usize> {
    let mut sink = CsvSink::create(path)?;
    sink.write_batch(records)?;
    sink.finish()?;
    Ok(sink.rows())
}
