//! Session supervisor
//!
//! Launches every session at once on a [`JoinSet`], waits for all of them,
//! and merges their records. A failing (or panicking) session never stops the
//! others; only a run in which every session failed is reported as an error.

use crate::config::Config;
use crate::crawler::session::{run_session, SessionError, SessionOutcome, SessionSetup};
use crate::extract::PageSelectors;
use crate::records::AccommodationRecord;
use crate::transport::Transport;
use crate::{ConfigError, HarvestError};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Overall result of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestStatus {
    /// Every session reached `Done`
    Complete,

    /// At least one session succeeded and at least one failed
    Partial,

    /// No session succeeded
    AllSessionsFailed,
}

/// Merged results of every session
#[derive(Debug)]
pub struct HarvestReport {
    /// Per-session outcomes, ordered by session id
    pub outcomes: Vec<SessionOutcome>,

    /// Records of all successful sessions; each session's batch stays in order
    pub records: Vec<AccommodationRecord>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl HarvestReport {
    pub fn status(&self) -> HarvestStatus {
        match (self.sessions_succeeded(), self.sessions_failed()) {
            (0, _) => HarvestStatus::AllSessionsFailed,
            (_, 0) => HarvestStatus::Complete,
            _ => HarvestStatus::Partial,
        }
    }

    pub fn sessions_succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn sessions_failed(&self) -> usize {
        self.outcomes.len() - self.sessions_succeeded()
    }

    /// Records rejected by validation across all sessions
    pub fn records_dropped(&self) -> usize {
        self.outcomes.iter().map(|o| o.dropped).sum()
    }

    /// Valid records lost because their session failed
    pub fn records_discarded(&self) -> usize {
        self.outcomes.iter().map(|o| o.discarded).sum()
    }

    pub fn pages_acquired(&self) -> usize {
        self.outcomes.iter().map(|o| o.pages_acquired).sum()
    }

    pub fn pages_released(&self) -> usize {
        self.outcomes.iter().map(|o| o.pages_released).sum()
    }

    pub fn failure_reports(&self) -> usize {
        self.outcomes.iter().map(|o| o.failures.len()).sum()
    }

    pub fn rate_limit_hits(&self) -> usize {
        self.outcomes
            .iter()
            .flat_map(|o| &o.failures)
            .filter(|f| f.is_rate_limited())
            .count()
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }

    /// Fails with [`HarvestError::AllSessionsFailed`] if no session succeeded
    pub fn ensure_any_succeeded(&self) -> Result<(), HarvestError> {
        if self.status() == HarvestStatus::AllSessionsFailed {
            return Err(HarvestError::AllSessionsFailed {
                sessions: self.outcomes.len(),
            });
        }
        Ok(())
    }
}

/// Spawns and joins the configured number of sessions
pub struct Supervisor {
    setup: SessionSetup,
    sessions: u32,
}

impl Supervisor {
    /// Prepares a supervisor; selectors are compiled once and shared read-only
    pub fn new(config: Arc<Config>, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        let selectors = Arc::new(PageSelectors::compile(&config.selectors)?);
        let sessions = config.harvest.sessions;

        Ok(Self {
            setup: SessionSetup {
                config,
                selectors,
                transport,
            },
            sessions,
        })
    }

    /// Runs all sessions to a terminal state
    pub async fn run(&self) -> HarvestReport {
        let started_at = Utc::now();
        tracing::info!("Starting {} sessions", self.sessions);

        let mut tasks = JoinSet::new();
        for session_id in 1..=self.sessions {
            tasks.spawn(run_session(session_id, self.setup.clone()));
        }

        let mut pending: BTreeSet<u32> = (1..=self.sessions).collect();
        let mut outcomes = Vec::with_capacity(self.sessions as usize);
        let mut aborted = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    pending.remove(&outcome.session_id);
                    tracing::info!(
                        "Session {} finished: {} ({} records)",
                        outcome.session_id,
                        outcome.final_state,
                        outcome.records.len()
                    );
                    outcomes.push(outcome);
                }
                Err(e) => {
                    tracing::error!("Session task join error: {}", e);
                    aborted.push(e.to_string());
                }
            }
        }

        // Join errors carry no session id; pair them with whoever never reported
        for (session_id, reason) in pending.into_iter().zip(aborted) {
            outcomes.push(SessionOutcome::failed(
                session_id,
                SessionError::Aborted(reason),
            ));
        }

        outcomes.sort_by_key(|o| o.session_id);
        let records = outcomes
            .iter_mut()
            .flat_map(|o| std::mem::take(&mut o.records))
            .collect::<Vec<_>>();

        let report = HarvestReport {
            outcomes,
            records,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            "Harvest finished: {} records, {} sessions succeeded, {} failed",
            report.records.len(),
            report.sessions_succeeded(),
            report.sessions_failed()
        );

        report
    }
}
