//! Output module for harvested records and run statistics
//!
//! This module handles:
//! - Writing merged records to CSV
//! - Summarising a run for the terminal

mod csv_sink;
pub mod stats;

pub use csv_sink::{write_csv, CsvSink, CSV_HEADER};
pub use stats::{print_statistics, HarvestStatistics};

use crate::records::AccommodationRecord;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination for harvested records
///
/// Sinks only see records once every session has finished. The supervisor
/// merges successful sessions in session order, so a run arrives as a single
/// batch in which each session's records stay contiguous.
pub trait RecordSink {
    /// Appends one batch of records
    fn write_batch(&mut self, records: &[AccommodationRecord]) -> OutputResult<()>;

    /// Flushes everything written so far
    fn finish(&mut self) -> OutputResult<()>;
}
