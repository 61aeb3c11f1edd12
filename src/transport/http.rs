//! Plain HTTP transport
//!
//! Each session gets its own [`reqwest::Client`] with a private cookie jar, so
//! a cookie granted by the capability gate to one session is never visible to
//! another. There is no script execution here: `NetworkIdle` and
//! `ContentCommitted` both resolve once the full body has been read, while
//! `SelectorVisible` is checked against the received markup.

use crate::config::ClientConfig;
use crate::transport::{
    NavigationRequest, PageHandle, RenderContext, RenderedPage, Transport, TransportError,
    WaitCondition,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Proxy, RequestBuilder, Response};
use scraper::{Html, Selector};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

/// Builds an HTTP client for one session
///
/// The client keeps its own cookie store and sends the configured identity
/// headers with every request.
///
/// # Example
///
/// ```no_run
/// use trekky_harvest::config::ClientConfig;
/// use trekky_harvest::transport::build_http_client;
///
/// let client = build_http_client(&ClientConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &ClientConfig) -> Result<Client, TransportError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Other(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Other(format!("Invalid value for header '{}': {}", name, e)))?;
        headers.insert(name, value);
    }

    let mut builder = Client::builder()
        .cookie_store(true)
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .gzip(true)
        .brotli(true);

    if let Some(user_agent) = &config.user_agent {
        builder = builder.user_agent(user_agent.as_str());
    }

    if let Some(proxy_url) = &config.proxy_url {
        let mut proxy = Proxy::all(proxy_url.as_str()).map_err(client_error)?;
        if let Some(username) = &config.proxy_username {
            proxy = proxy.basic_auth(
                username,
                config.proxy_password.as_deref().unwrap_or_default(),
            );
        }
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(client_error)
}

fn client_error(e: reqwest::Error) -> TransportError {
    TransportError::Other(format!("Failed to build HTTP client: {}", e))
}

/// [`Transport`] backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open_context(&self, session_id: u32) -> Result<Box<dyn RenderContext>, TransportError> {
        let client = build_http_client(&self.config)?;
        tracing::debug!("Opened HTTP context for session {}", session_id);
        Ok(Box::new(HttpContext::new(session_id, client)))
    }
}

/// One session's cookie scope
#[derive(Debug)]
pub struct HttpContext {
    session_id: u32,
    client: Client,
    next_page: AtomicU64,
    closed: AtomicBool,
}

impl HttpContext {
    fn new(session_id: u32, client: Client) -> Self {
        Self {
            session_id,
            client,
            next_page: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Other(format!(
                "context for session {} is closed",
                self.session_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RenderContext for HttpContext {
    fn open_page(&self) -> Result<PageHandle, TransportError> {
        self.ensure_open()?;
        Ok(PageHandle::new(self.next_page.fetch_add(1, Ordering::Relaxed)))
    }

    async fn navigate(
        &self,
        page: &PageHandle,
        request: &NavigationRequest,
    ) -> Result<RenderedPage, TransportError> {
        self.ensure_open()?;
        tracing::trace!(
            "Session {} page {} GET {} (wait: {})",
            self.session_id,
            page.id(),
            request.url,
            request.wait
        );

        let builder = self
            .client
            .get(request.url.clone())
            .timeout(request.timeout);
        let rendered = send(builder, request.timeout).await?;

        if let WaitCondition::SelectorVisible(selector) = &request.wait {
            if !selector_matches(&rendered.body, selector)? {
                return Err(TransportError::ContentNotReady {
                    selector: selector.clone(),
                });
            }
        }

        Ok(rendered)
    }

    async fn submit_form(
        &self,
        page: &PageHandle,
        url: &Url,
        fields: &[(String, String)],
        timeout: Duration,
    ) -> Result<RenderedPage, TransportError> {
        self.ensure_open()?;
        tracing::trace!(
            "Session {} page {} POST {}",
            self.session_id,
            page.id(),
            url
        );

        let builder = self.client.post(url.clone()).form(fields).timeout(timeout);
        send(builder, timeout).await
    }

    fn close_page(&self, page: PageHandle) {
        tracing::trace!("Session {} closed page {}", self.session_id, page.id());
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Closed HTTP context for session {}", self.session_id);
        }
    }
}

/// Sends a request and resolves the response into a page or a classified error
async fn send(builder: RequestBuilder, timeout: Duration) -> Result<RenderedPage, TransportError> {
    let response = builder
        .send()
        .await
        .map_err(|e| classify_error(e, timeout))?;

    let status = response.status();
    let url = response.url().clone();
    let retry_after = parse_retry_after(&response);

    let body = response.text().await.map_err(|e| {
        if e.is_timeout() {
            TransportError::Timeout(timeout)
        } else {
            TransportError::Malformed(format!("Failed to read body: {}", e))
        }
    })?;

    if !status.is_success() {
        return Err(TransportError::Http {
            status: status.as_u16(),
            body,
            retry_after,
        });
    }

    Ok(RenderedPage {
        url,
        status: status.as_u16(),
        body,
    })
}

fn classify_error(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else if e.is_connect() {
        TransportError::Connection(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

/// Reads `Retry-After` as either delta-seconds or an HTTP date
fn parse_retry_after(response: &Response) -> Option<Duration> {
    let value = response.headers().get(RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after_value(value, Utc::now())
}

fn parse_retry_after_value(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

fn selector_matches(body: &str, selector: &str) -> Result<bool, TransportError> {
    let selector = Selector::parse(selector)
        .map_err(|e| TransportError::Malformed(format!("Invalid selector '{}': {:?}", selector, e)))?;
    let document = Html::parse_document(body);
    let found = document.select(&selector).next().is_some();
    Ok(found)
}
