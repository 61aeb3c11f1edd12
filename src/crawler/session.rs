//! Per-session crawl state machine
//!
//! A session walks `Init → Handshake? → Home → Listing → (Pagination | Detail)* → Done`
//! and drops to `Failed` as soon as a step fails permanently or runs out of
//! retries. Whatever happens, its render context is closed before the
//! outcome is reported.

use crate::config::Config;
use crate::crawler::lifecycle::{PageLease, PageLifecycle, WaitPolicy};
use crate::crawler::retry::{RetryError, RetryPolicy};
use crate::extract::{extract_accommodation, parse_listing, ListingLinks, PageSelectors};
use crate::handshake::{CapabilityProbe, HandshakeBuilder, HandshakeError};
use crate::records::AccommodationRecord;
use crate::report::FailureReport;
use crate::state::SessionState;
use crate::transport::{NavigationRequest, Transport, TransportError, WaitCondition};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use url::Url;

/// Why a session ended in `Failed`
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to open session context: {0}")]
    Init(TransportError),

    #[error("handshake rejected by {url} (HTTP {status})")]
    HandshakeRejected { url: String, status: u16 },

    #[error("handshake payload could not be built: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("gave up on {url} after {attempts} attempts: {source}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        source: TransportError,
    },

    #[error("permanent failure on {url}: {source}")]
    Permanent { url: String, source: TransportError },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("session task aborted: {0}")]
    Aborted(String),
}

/// Everything a session needs from the supervisor
#[derive(Clone)]
pub struct SessionSetup {
    pub config: Arc<Config>,
    pub selectors: Arc<PageSelectors>,
    pub transport: Arc<dyn Transport>,
}

/// Final report of one session
#[derive(Debug)]
pub struct SessionOutcome {
    pub session_id: u32,
    pub final_state: SessionState,

    /// Valid records, in harvest order; empty when the session failed
    pub records: Vec<AccommodationRecord>,

    /// Records rejected by validation
    pub dropped: usize,

    /// Valid records thrown away because the session failed
    pub discarded: usize,

    /// One report per failed attempt
    pub failures: Vec<FailureReport>,

    pub error: Option<SessionError>,
    pub pages_acquired: usize,
    pub pages_released: usize,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        self.final_state == SessionState::Done
    }

    /// Outcome for a session that never got its context
    pub fn failed(session_id: u32, error: SessionError) -> Self {
        Self {
            session_id,
            final_state: SessionState::Failed,
            records: Vec::new(),
            dropped: 0,
            discarded: 0,
            failures: Vec::new(),
            error: Some(error),
            pages_acquired: 0,
            pages_released: 0,
        }
    }
}

/// Runs one session to a terminal state inside a `session` span
pub async fn run_session(session_id: u32, setup: SessionSetup) -> SessionOutcome {
    let span = tracing::info_span!("session", session_id);
    drive(session_id, setup).instrument(span).await
}

async fn drive(session_id: u32, setup: SessionSetup) -> SessionOutcome {
    tracing::info!("Session starting");

    let lifecycle = match PageLifecycle::open(setup.transport.as_ref(), session_id).await {
        Ok(lifecycle) => lifecycle,
        Err(e) => {
            let error = SessionError::Init(e);
            tracing::error!("Session failed: {}", error);
            return SessionOutcome::failed(session_id, error);
        }
    };

    let mut session = Session::new(session_id, setup, lifecycle);
    let result = session.run().await;
    session.finish(result)
}

struct Session {
    id: u32,
    config: Arc<Config>,
    selectors: Arc<PageSelectors>,
    state: SessionState,
    lifecycle: PageLifecycle,
    retry: RetryPolicy,
    waits: WaitPolicy,
    visited: HashSet<Url>,
    records: Vec<AccommodationRecord>,
    dropped: usize,
    failures: Vec<FailureReport>,
}

impl Session {
    fn new(id: u32, setup: SessionSetup, lifecycle: PageLifecycle) -> Self {
        let retry = RetryPolicy::new(&setup.config.retry);
        let waits = WaitPolicy::new(&setup.config.navigation, &setup.config.selectors);

        Self {
            id,
            config: setup.config,
            selectors: setup.selectors,
            state: SessionState::Init,
            lifecycle,
            retry,
            waits,
            visited: HashSet::new(),
            records: Vec::new(),
            dropped: 0,
            failures: Vec::new(),
        }
    }

    async fn run(&mut self) -> Result<(), SessionError> {
        self.handshake().await?;

        self.transition(SessionState::Home)?;
        let start = self.config.start_url()?;
        self.visit_home(&start).await?;

        self.crawl_listings().await?;

        self.transition(SessionState::Done)
    }

    fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        if next != self.state {
            tracing::debug!("{} -> {}", self.state, next);
        }
        self.state = next;
        Ok(())
    }

    fn request(&self, url: Url, wait: WaitCondition) -> NavigationRequest {
        NavigationRequest {
            url,
            wait,
            timeout: self.config.navigation.timeout(),
            session_id: self.id,
            retry_budget: self.retry.max_attempts(),
        }
    }

    async fn handshake(&mut self) -> Result<(), SessionError> {
        let config = Arc::clone(&self.config);
        let (handshake, endpoint) = match (&config.handshake, config.handshake_url()) {
            (Some(handshake), Some(endpoint)) => (handshake, endpoint?),
            _ => return Ok(()),
        };

        self.transition(SessionState::Handshake)?;

        // Built per session so no probe state is ever shared
        let probe = CapabilityProbe::new(handshake.probe.clone());
        let builder = HandshakeBuilder::from_key(&handshake.public_key, probe)?;
        let fields = vec![(handshake.field.clone(), builder.build_payload()?)];
        let timeout = config.navigation.timeout();

        let lifecycle = &self.lifecycle;
        let target = &endpoint;
        let form = &fields;
        let result = self
            .retry
            .run(&endpoint, self.retry.max_attempts(), &mut self.failures, move || {
                lifecycle.submit(target, form, timeout)
            })
            .await;

        match result {
            Ok(page) => {
                tracing::info!("Handshake accepted (HTTP {})", page.status);
                Ok(())
            }
            Err(RetryError::Permanent(TransportError::Http { status, .. })) => {
                Err(SessionError::HandshakeRejected {
                    url: endpoint.to_string(),
                    status,
                })
            }
            Err(e) => Err(step_failure(&endpoint, e)),
        }
    }

    async fn visit_home(&mut self, url: &Url) -> Result<(), SessionError> {
        let request = self.request(url.clone(), self.waits.flow_wait());
        let lease = fetch(&self.lifecycle, &self.retry, &mut self.failures, &request).await?;
        tracing::info!("Reached {} (HTTP {})", lease.url, lease.status);
        drop(lease);

        self.settle().await;
        Ok(())
    }

    async fn crawl_listings(&mut self) -> Result<(), SessionError> {
        let entry = self.config.listing_url(self.id)?;
        self.visited.insert(entry.clone());
        let mut queue = VecDeque::from([entry]);
        let mut next_state = SessionState::Listing;

        while let Some(url) = queue.pop_front() {
            self.transition(next_state)?;
            next_state = SessionState::Pagination;

            let links = self.visit_listing(&url).await?;
            tracing::info!(
                "Listing {}: {} detail links, {} pagination links",
                url,
                links.details.len(),
                links.pagination.len()
            );

            if self.config.harvest.follow_pagination {
                for link in links.pagination {
                    if self.visited.insert(link.clone()) {
                        queue.push_back(link);
                    }
                }
            }

            for detail in links.details {
                if self.visited.insert(detail.clone()) {
                    self.transition(SessionState::Detail)?;
                    self.visit_detail(&detail).await?;
                }
            }
        }

        Ok(())
    }

    async fn visit_listing(&mut self, url: &Url) -> Result<ListingLinks, SessionError> {
        let request = self.request(url.clone(), self.waits.flow_wait());
        let lease = fetch(&self.lifecycle, &self.retry, &mut self.failures, &request).await?;
        let links = parse_listing(&lease.body, &lease.url, &self.selectors);
        drop(lease);

        self.settle().await;
        Ok(links)
    }

    async fn visit_detail(&mut self, url: &Url) -> Result<(), SessionError> {
        let request = self.request(url.clone(), self.waits.detail_wait());
        let lease = match fetch(&self.lifecycle, &self.retry, &mut self.failures, &request).await {
            Ok(lease) => lease,
            // The name element never showed up: a record without a name
            Err(SessionError::RetriesExhausted {
                source: TransportError::ContentNotReady { selector },
                ..
            }) => {
                self.dropped += 1;
                tracing::warn!("Dropping record from {}: no element matches `{}`", url, selector);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match extract_accommodation(&lease.body, &self.selectors) {
            Ok(record) => {
                tracing::debug!("Harvested '{}' from {}", record.name(), url);
                self.records.push(record);
            }
            Err(failure) => {
                self.dropped += 1;
                tracing::warn!("Dropping record from {}: {}", url, failure);
            }
        }

        Ok(())
    }

    /// Pauses after the first successful flow navigation, if configured
    async fn settle(&mut self) {
        if let Some(delay) = self.waits.mark_established() {
            tracing::debug!("Settling for {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    fn finish(mut self, result: Result<(), SessionError>) -> SessionOutcome {
        self.lifecycle.close();

        let error = match result {
            Ok(()) => None,
            Err(error) => {
                if self.state.is_active() {
                    tracing::debug!("{} -> {}", self.state, SessionState::Failed);
                    self.state = SessionState::Failed;
                }
                tracing::error!("Session failed: {}", error);
                Some(error)
            }
        };

        let (records, discarded) = if error.is_some() {
            let discarded = self.records.len();
            if discarded > 0 {
                tracing::warn!("Discarding {} records from failed session", discarded);
            }
            (Vec::new(), discarded)
        } else {
            (std::mem::take(&mut self.records), 0)
        };

        tracing::info!(
            "Session finished in state {} with {} records ({} dropped)",
            self.state,
            records.len(),
            self.dropped
        );

        SessionOutcome {
            session_id: self.id,
            final_state: self.state,
            records,
            dropped: self.dropped,
            discarded,
            failures: std::mem::take(&mut self.failures),
            error,
            pages_acquired: self.lifecycle.acquired(),
            pages_released: self.lifecycle.released(),
        }
    }
}

/// Navigates through the retry policy
async fn fetch<'a>(
    lifecycle: &'a PageLifecycle,
    retry: &RetryPolicy,
    failures: &mut Vec<FailureReport>,
    request: &NavigationRequest,
) -> Result<PageLease<'a>, SessionError> {
    tracing::debug!("Navigating to {} (wait: {})", request.url, request.wait);
    retry
        .run(&request.url, request.retry_budget, failures, move || {
            lifecycle.acquire(request)
        })
        .await
        .map_err(|e| step_failure(&request.url, e))
}

fn step_failure(url: &Url, error: RetryError) -> SessionError {
    match error {
        RetryError::Exhausted { attempts, last } => SessionError::RetriesExhausted {
            url: url.to_string(),
            attempts,
            source: last,
        },
        RetryError::Permanent(source) => SessionError::Permanent {
            url: url.to_string(),
            source,
        },
    }
}
