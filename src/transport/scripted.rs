//! In-memory transport for unit tests
//!
//! Replies are scripted per URL (optionally per session). The last reply in a
//! script repeats forever; unscripted URLs answer 404. Every page and context
//! allocation is counted so tests can check that nothing leaks.

use crate::transport::{
    NavigationRequest, PageHandle, RenderContext, RenderedPage, Transport, TransportError,
    WaitCondition,
};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// One scripted response
#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    body: String,
    delay: Option<Duration>,
    retry_after: Option<Duration>,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: None,
            retry_after: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            delay: None,
            retry_after: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

type ScriptKey = (Option<u32>, String);

#[derive(Default)]
struct Shared {
    scripts: Mutex<HashMap<ScriptKey, VecDeque<Reply>>>,
    navigations: Mutex<Vec<(u32, String)>>,
    submissions: Mutex<Vec<Vec<(String, String)>>>,
    failing_contexts: Mutex<Vec<u32>>,
    pages_opened: AtomicUsize,
    pages_closed: AtomicUsize,
    contexts_opened: AtomicUsize,
    contexts_closed: AtomicUsize,
}

impl Shared {
    fn next_reply(&self, session_id: u32, url: &str) -> Reply {
        let mut scripts = match self.scripts.lock() {
            Ok(scripts) => scripts,
            Err(poisoned) => poisoned.into_inner(),
        };

        let session_key = (Some(session_id), url.to_string());
        let key = if scripts.contains_key(&session_key) {
            session_key
        } else {
            (None, url.to_string())
        };

        match scripts.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| Reply::status(404)),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| Reply::status(404)),
            None => Reply::status(404),
        }
    }
}

/// Scripted [`Transport`] with allocation counters
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    shared: Arc<Shared>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts replies for `url` in every session
    pub fn script(&self, url: &str, replies: Vec<Reply>) {
        self.insert(None, url, replies);
    }

    /// Scripts replies for `url` in one session only
    pub fn script_for(&self, session_id: u32, url: &str, replies: Vec<Reply>) {
        self.insert(Some(session_id), url, replies);
    }

    /// Makes `open_context` fail for `session_id`
    pub fn fail_context(&self, session_id: u32) {
        self.shared.failing_contexts.lock().unwrap().push(session_id);
    }

    fn insert(&self, session_id: Option<u32>, url: &str, replies: Vec<Reply>) {
        let url = Url::parse(url).unwrap().to_string();
        self.shared
            .scripts
            .lock()
            .unwrap()
            .insert((session_id, url), replies.into());
    }

    pub fn pages_opened(&self) -> usize {
        self.shared.pages_opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.shared.pages_closed.load(Ordering::SeqCst)
    }

    pub fn contexts_opened(&self) -> usize {
        self.shared.contexts_opened.load(Ordering::SeqCst)
    }

    pub fn contexts_closed(&self) -> usize {
        self.shared.contexts_closed.load(Ordering::SeqCst)
    }

    /// Navigated URLs for one session, in order
    pub fn navigations(&self, session_id: u32) -> Vec<String> {
        self.shared
            .navigations
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == session_id)
            .map(|(_, url)| url.clone())
            .collect()
    }

    /// Submitted form bodies, in order
    pub fn submissions(&self) -> Vec<Vec<(String, String)>> {
        self.shared.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open_context(&self, session_id: u32) -> Result<Box<dyn RenderContext>, TransportError> {
        if self
            .shared
            .failing_contexts
            .lock()
            .unwrap()
            .contains(&session_id)
        {
            return Err(TransportError::Connection("browser unavailable".to_string()));
        }

        self.shared.contexts_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedContext {
            session_id,
            shared: Arc::clone(&self.shared),
            next_page: AtomicU64::new(1),
        }))
    }
}

struct ScriptedContext {
    session_id: u32,
    shared: Arc<Shared>,
    next_page: AtomicU64,
}

impl ScriptedContext {
    async fn respond(&self, url: &Url) -> Result<RenderedPage, TransportError> {
        self.shared
            .navigations
            .lock()
            .unwrap()
            .push((self.session_id, url.to_string()));

        let reply = self.shared.next_reply(self.session_id, url.as_str());
        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }

        if !(200..300).contains(&reply.status) {
            return Err(TransportError::Http {
                status: reply.status,
                body: reply.body,
                retry_after: reply.retry_after,
            });
        }

        Ok(RenderedPage {
            url: url.clone(),
            status: reply.status,
            body: reply.body,
        })
    }
}

#[async_trait]
impl RenderContext for ScriptedContext {
    fn open_page(&self) -> Result<PageHandle, TransportError> {
        self.shared.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(PageHandle::new(self.next_page.fetch_add(1, Ordering::SeqCst)))
    }

    async fn navigate(
        &self,
        _page: &PageHandle,
        request: &NavigationRequest,
    ) -> Result<RenderedPage, TransportError> {
        let page = self.respond(&request.url).await?;

        if let WaitCondition::SelectorVisible(selector) = &request.wait {
            let parsed = Selector::parse(selector)
                .map_err(|e| TransportError::Malformed(format!("{:?}", e)))?;
            let found = Html::parse_document(&page.body).select(&parsed).next().is_some();
            if !found {
                return Err(TransportError::ContentNotReady {
                    selector: selector.clone(),
                });
            }
        }

        Ok(page)
    }

    async fn submit_form(
        &self,
        _page: &PageHandle,
        url: &Url,
        fields: &[(String, String)],
        _timeout: Duration,
    ) -> Result<RenderedPage, TransportError> {
        self.shared.submissions.lock().unwrap().push(fields.to_vec());
        self.respond(url).await
    }

    fn close_page(&self, _page: PageHandle) {
        self.shared.pages_closed.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.shared.contexts_closed.fetch_add(1, Ordering::SeqCst);
    }
}
