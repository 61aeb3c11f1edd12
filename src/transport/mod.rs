//! Page transport contract
//!
//! The orchestration core never talks to the network directly. It asks a
//! [`Transport`] for one isolated [`RenderContext`] per session and drives all
//! navigations through it. Two flavours fit behind these traits: plain HTTP
//! fetching (see [`http`]) and headless-browser rendering. Only the meaning of
//! [`WaitCondition`] differs between them.
//!
//! Failures are resolved into [`TransportError`] variants at this boundary so
//! that retry classification downstream never has to inspect raw client
//! errors.

pub mod http;
#[cfg(test)]
pub(crate) mod scripted;

pub use http::{build_http_client, HttpTransport};

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Readiness signal a navigation waits for before its content is snapshotted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// The response has been committed; content may still be loading
    ContentCommitted,

    /// Network activity has settled and scripts have run
    NetworkIdle,

    /// The given CSS selector matches at least one element
    SelectorVisible(String),
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentCommitted => write!(f, "commit"),
            Self::NetworkIdle => write!(f, "network-idle"),
            Self::SelectorVisible(selector) => write!(f, "selector-visible({})", selector),
        }
    }
}

/// A single navigation to perform on behalf of a session
#[derive(Debug, Clone)]
pub struct NavigationRequest {
    /// Target URL
    pub url: Url,

    /// Readiness condition to wait for
    pub wait: WaitCondition,

    /// Upper bound for this navigation, independent of the retry budget
    pub timeout: Duration,

    /// Owning session
    pub session_id: u32,

    /// Attempts allowed for this navigation
    pub retry_budget: u32,
}

/// Opaque handle for a page/tab allocated inside a render context
///
/// Handles are not `Clone`: each one is released exactly once by giving it
/// back to [`RenderContext::close_page`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct PageHandle {
    id: u64,
}

impl PageHandle {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Markup snapshot produced by a successful navigation
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Final URL after redirects
    pub url: Url,

    /// HTTP status of the main document
    pub status: u16,

    /// Serialized markup
    pub body: String,
}

/// Failure of a navigation or form submission, resolved at the transport
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("HTTP {status}")]
    Http {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    #[error("navigation timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("content not ready: no element matches `{selector}`")]
    ContentNotReady { selector: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// HTTP status, if this failure came from an HTTP response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-requested delay before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Factory for isolated per-session render contexts
#[async_trait]
pub trait Transport: Send + Sync {
    /// Allocates a fresh cookie/storage scope (and rendering context, if any)
    async fn open_context(&self, session_id: u32) -> Result<Box<dyn RenderContext>, TransportError>;
}

/// One session's isolated browsing scope
///
/// Every page returned by [`open_page`](RenderContext::open_page) must be
/// handed back to [`close_page`](RenderContext::close_page), and the context
/// itself must be closed with [`close`](RenderContext::close) once. The
/// lifecycle manager in `crawler::lifecycle` enforces both.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Allocates a page inside this context
    fn open_page(&self) -> Result<PageHandle, TransportError>;

    /// Navigates `page` and snapshots its content once `request.wait` holds
    async fn navigate(
        &self,
        page: &PageHandle,
        request: &NavigationRequest,
    ) -> Result<RenderedPage, TransportError>;

    /// Submits a url-encoded form from `page`
    async fn submit_form(
        &self,
        page: &PageHandle,
        url: &Url,
        fields: &[(String, String)],
        timeout: Duration,
    ) -> Result<RenderedPage, TransportError>;

    /// Releases a page allocated by `open_page`
    fn close_page(&self, page: PageHandle);

    /// Releases the context and its cookie/storage scope
    fn close(&self);
}
