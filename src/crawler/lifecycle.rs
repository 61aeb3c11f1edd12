//! Render/fetch lifecycle management
//!
//! A [`PageLifecycle`] owns one session's [`RenderContext`]. Pages are only
//! handed out wrapped in a [`PageLease`], which gives the page back to the
//! context when dropped. The context itself is closed when the lifecycle is
//! closed or dropped. Release therefore happens exactly once on success,
//! failure, timeout and cancellation alike.

use crate::config::{NavigationConfig, SelectorConfig};
use crate::transport::{
    NavigationRequest, PageHandle, RenderContext, RenderedPage, Transport, TransportError,
    WaitCondition,
};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

/// Scoped owner of one session's render context
pub struct PageLifecycle {
    session_id: u32,
    context: Box<dyn RenderContext>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    closed: AtomicBool,
}

impl PageLifecycle {
    /// Opens an isolated context for `session_id`
    pub async fn open(transport: &dyn Transport, session_id: u32) -> Result<Self, TransportError> {
        let context = transport.open_context(session_id).await?;
        Ok(Self {
            session_id,
            context,
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Navigates a fresh page and returns it leased to the caller
    ///
    /// The navigation is bounded by `request.timeout`; on expiry the page is
    /// released and [`TransportError::Timeout`] is returned.
    pub async fn acquire(&self, request: &NavigationRequest) -> Result<PageLease<'_>, TransportError> {
        let guard = self.open_page()?;
        let handle = guard.handle()?;

        let navigation = self.context.navigate(handle, request);
        let page = match tokio::time::timeout(request.timeout, navigation).await {
            Ok(result) => result?,
            Err(_) => return Err(TransportError::Timeout(request.timeout)),
        };

        Ok(PageLease {
            _guard: guard,
            page,
        })
    }

    /// Submits a form from a fresh page, releasing the page before returning
    pub async fn submit(
        &self,
        url: &Url,
        fields: &[(String, String)],
        timeout: Duration,
    ) -> Result<RenderedPage, TransportError> {
        let guard = self.open_page()?;
        let handle = guard.handle()?;

        let submission = self.context.submit_form(handle, url, fields, timeout);
        match tokio::time::timeout(timeout, submission).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    fn open_page(&self) -> Result<PageGuard<'_>, TransportError> {
        let handle = self.context.open_page()?;
        self.acquired.fetch_add(1, Ordering::Relaxed);
        Ok(PageGuard {
            lifecycle: self,
            handle: Some(handle),
        })
    }

    fn release(&self, handle: PageHandle) {
        self.context.close_page(handle);
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    /// Pages handed out so far
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::Relaxed)
    }

    /// Pages given back so far
    pub fn released(&self) -> usize {
        self.released.load(Ordering::Relaxed)
    }

    /// Closes the context; later calls are no-ops
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.context.close();
            tracing::debug!(
                "Session {} released its context ({} pages acquired, {} released)",
                self.session_id,
                self.acquired(),
                self.released()
            );
        }
    }
}

impl Drop for PageLifecycle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Releases its page when dropped
struct PageGuard<'a> {
    lifecycle: &'a PageLifecycle,
    handle: Option<PageHandle>,
}

impl PageGuard<'_> {
    fn handle(&self) -> Result<&PageHandle, TransportError> {
        self.handle
            .as_ref()
            .ok_or_else(|| TransportError::Other("page already released".to_string()))
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.lifecycle.release(handle);
        }
    }
}

/// A rendered page that stays open until the lease is dropped
pub struct PageLease<'a> {
    _guard: PageGuard<'a>,
    page: RenderedPage,
}

impl Deref for PageLease<'_> {
    type Target = RenderedPage;

    fn deref(&self) -> &RenderedPage {
        &self.page
    }
}

/// Per-session choice of readiness signal
///
/// Until the session has reached real content once, navigations wait for
/// the heavy signal. Afterwards the cheaper one is used.
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    initial: WaitCondition,
    subsequent: WaitCondition,
    detail_selector: Option<String>,
    settle_delay: Duration,
    established: bool,
}

impl WaitPolicy {
    pub fn new(navigation: &NavigationConfig, selectors: &SelectorConfig) -> Self {
        Self {
            initial: navigation.initial_wait.to_condition(),
            subsequent: navigation.subsequent_wait.to_condition(),
            detail_selector: navigation
                .detail_wait_for_selector
                .then(|| selectors.name.clone()),
            settle_delay: navigation.settle_delay(),
            established: false,
        }
    }

    /// Wait for home, listing and pagination navigations
    pub fn flow_wait(&self) -> WaitCondition {
        if self.established {
            self.subsequent.clone()
        } else {
            self.initial.clone()
        }
    }

    /// Wait for detail navigations
    pub fn detail_wait(&self) -> WaitCondition {
        match &self.detail_selector {
            Some(selector) => WaitCondition::SelectorVisible(selector.clone()),
            None => self.flow_wait(),
        }
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Records a successful navigation; returns the settle delay to apply if
    /// this was the first one
    pub fn mark_established(&mut self) -> Option<Duration> {
        if self.established {
            return None;
        }
        self.established = true;
        (!self.settle_delay.is_zero()).then_some(self.settle_delay)
    }
}
