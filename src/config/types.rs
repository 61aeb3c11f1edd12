use crate::transport::WaitCondition;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Main configuration structure for a harvest run
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Capability gate; absent when the catalog is not protected
    #[serde(default)]
    pub handshake: Option<HandshakeConfig>,
    #[serde(default)]
    pub selectors: SelectorConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Start URL with a guaranteed trailing slash so relative paths join under it
    pub fn start_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.harvest.start_url)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Listing entry point for one session's partition
    pub fn listing_url(&self, session_id: u32) -> Result<Url, url::ParseError> {
        let path = self
            .harvest
            .listing_path
            .replace("{city}", &self.harvest.city)
            .replace("{session}", &session_id.to_string());
        self.start_url()?.join(&path)
    }

    /// Capability gate submission URL, if a gate is configured
    pub fn handshake_url(&self) -> Option<Result<Url, url::ParseError>> {
        self.handshake.as_ref().map(|handshake| {
            self.start_url()
                .and_then(|start| start.join(&handshake.endpoint))
        })
    }
}

/// What to harvest and how to partition it
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// Root of the catalog, visited first by every session
    #[serde(rename = "start-url")]
    pub start_url: String,

    /// Number of concurrent sessions
    #[serde(default = "default_sessions")]
    pub sessions: u32,

    /// City filter substituted into the listing path
    #[serde(default = "default_city")]
    pub city: String,

    /// Listing entry point relative to the start URL.
    /// `{city}` and `{session}` are substituted per session.
    #[serde(rename = "listing-path", default = "default_listing_path")]
    pub listing_path: String,

    /// Follow pagination links found on listing pages
    #[serde(rename = "follow-pagination", default = "default_true")]
    pub follow_pagination: bool,
}

/// Readiness signal selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitKind {
    NetworkIdle,
    Commit,
}

impl WaitKind {
    pub fn to_condition(self) -> WaitCondition {
        match self {
            Self::NetworkIdle => WaitCondition::NetworkIdle,
            Self::Commit => WaitCondition::ContentCommitted,
        }
    }
}

/// Navigation readiness and timing
#[derive(Debug, Clone, Deserialize)]
pub struct NavigationConfig {
    /// Wait used until the session has reached content once
    #[serde(rename = "initial-wait", default = "default_initial_wait")]
    pub initial_wait: WaitKind,

    /// Cheaper wait used afterwards
    #[serde(rename = "subsequent-wait", default = "default_subsequent_wait")]
    pub subsequent_wait: WaitKind,

    /// Detail pages wait for the name selector to be present
    #[serde(rename = "detail-wait-for-selector", default = "default_true")]
    pub detail_wait_for_selector: bool,

    /// Per-navigation timeout (milliseconds)
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Pause after a heavy navigation (milliseconds)
    #[serde(rename = "settle-delay-ms", default)]
    pub settle_delay_ms: u64,
}

impl NavigationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            initial_wait: default_initial_wait(),
            subsequent_wait: default_subsequent_wait(),
            detail_wait_for_selector: true,
            timeout_ms: default_timeout_ms(),
            settle_delay_ms: 0,
        }
    }
}

/// Retry and backoff settings
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per step, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling for a single backoff delay (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Factor applied to backoff after HTTP 429
    #[serde(
        rename = "rate-limit-multiplier",
        default = "default_rate_limit_multiplier"
    )]
    pub rate_limit_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            rate_limit_multiplier: default_rate_limit_multiplier(),
        }
    }
}

/// Capability gate settings
#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeConfig {
    /// Submission endpoint, joined onto the start URL
    pub endpoint: String,

    /// Server public key, PEM or bare base64 SubjectPublicKeyInfo
    #[serde(rename = "public-key", default = "default_public_key")]
    pub public_key: String,

    /// Form field carrying the encrypted probe
    #[serde(default = "default_field")]
    pub field: String,

    /// Declared client capabilities
    #[serde(default = "default_probe")]
    pub probe: serde_json::Map<String, serde_json::Value>,
}

/// CSS selectors for listing and detail pages
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    #[serde(rename = "detail-link", default = "default_detail_link")]
    pub detail_link: String,

    #[serde(rename = "pagination-link", default = "default_pagination_link")]
    pub pagination_link: String,

    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_email")]
    pub email: String,

    #[serde(default = "default_review")]
    pub review: String,

    #[serde(default = "default_rating")]
    pub rating: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            detail_link: default_detail_link(),
            pagination_link: default_pagination_link(),
            name: default_name(),
            email: default_email(),
            review: default_review(),
            rating: default_rating(),
        }
    }
}

/// HTTP client identity and routing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    #[serde(rename = "user-agent", default)]
    pub user_agent: Option<String>,

    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Tolerate invalid TLS certificates (needed behind intercepting proxies)
    #[serde(rename = "accept-invalid-certs", default)]
    pub accept_invalid_certs: bool,

    #[serde(rename = "proxy-url", default)]
    pub proxy_url: Option<String>,

    #[serde(rename = "proxy-username", default)]
    pub proxy_username: Option<String>,

    #[serde(rename = "proxy-password", default)]
    pub proxy_password: Option<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the CSV results file
    #[serde(rename = "csv-path", default = "default_csv_path")]
    pub csv_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: default_csv_path(),
        }
    }
}

fn default_sessions() -> u32 {
    9
}

fn default_city() -> String {
    "paris".to_string()
}

fn default_listing_path() -> String {
    "cities?city={city}&page={session}".to_string()
}

fn default_true() -> bool {
    true
}

fn default_initial_wait() -> WaitKind {
    WaitKind::NetworkIdle
}

fn default_subsequent_wait() -> WaitKind {
    WaitKind::Commit
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_rate_limit_multiplier() -> f64 {
    4.0
}

fn default_public_key() -> String {
    crate::handshake::DEFAULT_PUBLIC_KEY.to_string()
}

fn default_field() -> String {
    "payload".to_string()
}

fn default_probe() -> serde_json::Map<String, serde_json::Value> {
    crate::handshake::CapabilityProbe::default().into_fields()
}

fn default_detail_link() -> String {
    ".hotel-link".to_string()
}

fn default_pagination_link() -> String {
    ".pagination li a".to_string()
}

fn default_name() -> String {
    ".hotel-name".to_string()
}

fn default_email() -> String {
    ".hotel-email".to_string()
}

fn default_review() -> String {
    ".hotel-review".to_string()
}

fn default_rating() -> String {
    ".review-rating".to_string()
}

fn default_csv_path() -> String {
    "results.csv".to_string()
}
