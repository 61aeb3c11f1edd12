//! Run statistics
//!
//! This module condenses a [`HarvestReport`] into the figures printed at the
//! end of a run.

use crate::crawler::{HarvestReport, HarvestStatus};
use crate::state::SessionState;
use std::collections::BTreeMap;

/// Harvest statistics summary
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestStatistics {
    /// Overall run status
    pub status: HarvestStatus,

    /// Records written to the output
    pub records_harvested: usize,

    /// Records rejected by validation
    pub records_dropped: usize,

    /// Valid records lost with their failed session
    pub records_discarded: usize,

    pub sessions_succeeded: usize,
    pub sessions_failed: usize,

    pub pages_acquired: usize,
    pub pages_released: usize,

    /// Failed attempts, including ones that later succeeded on retry
    pub failure_reports: usize,

    /// Failed attempts answered with HTTP 429
    pub rate_limit_hits: usize,

    /// Terminal cause per failed session
    pub session_errors: BTreeMap<u32, String>,

    pub duration_seconds: i64,
}

impl HarvestStatistics {
    pub fn from_report(report: &HarvestReport) -> Self {
        let session_errors = report
            .outcomes
            .iter()
            .filter(|o| o.final_state == SessionState::Failed)
            .map(|o| {
                let cause = o
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                (o.session_id, cause)
            })
            .collect();

        Self {
            status: report.status(),
            records_harvested: report.records.len(),
            records_dropped: report.records_dropped(),
            records_discarded: report.records_discarded(),
            sessions_succeeded: report.sessions_succeeded(),
            sessions_failed: report.sessions_failed(),
            pages_acquired: report.pages_acquired(),
            pages_released: report.pages_released(),
            failure_reports: report.failure_reports(),
            rate_limit_hits: report.rate_limit_hits(),
            session_errors,
            duration_seconds: report.duration_seconds(),
        }
    }

    /// Returns the session success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.sessions_succeeded + self.sessions_failed;
        if total == 0 {
            return 0.0;
        }
        (self.sessions_succeeded as f64 / total as f64) * 100.0
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Records:");
    println!("  Harvested: {}", stats.records_harvested);
    println!("  Dropped (invalid): {}", stats.records_dropped);
    if stats.records_discarded > 0 {
        println!("  Discarded (failed sessions): {}", stats.records_discarded);
    }
    println!();

    println!("Sessions:");
    println!("  Succeeded: {}", stats.sessions_succeeded);
    println!("  Failed: {}", stats.sessions_failed);
    for (session_id, cause) in &stats.session_errors {
        println!("    #{}: {}", session_id, cause);
    }
    println!();

    println!("Pages:");
    println!("  Acquired: {}", stats.pages_acquired);
    println!("  Released: {}", stats.pages_released);
    println!();

    println!("Failures:");
    println!("  Failed attempts: {}", stats.failure_reports);
    println!("  Rate limited: {}", stats.rate_limit_hits);
    println!();

    println!(
        "Status: {:?} ({:.1}% of sessions succeeded in {}s)",
        stats.status,
        stats.success_rate(),
        stats.duration_seconds
    );
}
