//! Failure reports for transport errors
//!
//! Every failed attempt is turned into a [`FailureReport`] before it is
//! logged. The report separates four shapes of failure:
//!
//! | Failure | Message | Details |
//! |---------|---------|---------|
//! | HTTP 429 | fixed `Too many requests` label | raw response body |
//! | HTTP error with a JSON body | body `message` | body `description` |
//! | HTTP error with any other body | body text, tags stripped | - |
//! | Non-HTTP transport error | error description | - |

use crate::transport::TransportError;
use scraper::Html;
use serde::Deserialize;
use std::fmt;
use url::Url;

/// Label used for every rate-limited response
pub const TOO_MANY_REQUESTS: &str = "Too many requests";

/// Which shape of failure a report was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    JsonError,
    HtmlError,
    Transport,
}

/// Structured, human-readable description of one failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub url: String,
    pub kind: FailureKind,
    pub message: String,
    pub details: Option<String>,
}

#[derive(Deserialize)]
struct JsonErrorBody {
    message: serde_json::Value,
    description: serde_json::Value,
}

impl FailureReport {
    /// Builds the report for `error` raised while fetching `url`
    pub fn from_transport_error(url: &Url, error: &TransportError) -> Self {
        let url = url.to_string();

        match error {
            TransportError::Http { status: 429, body, .. } => Self {
                url,
                kind: FailureKind::RateLimited,
                message: TOO_MANY_REQUESTS.to_string(),
                details: Some(body.clone()),
            },
            TransportError::Http { status, body, .. } => {
                let text = strip_tags(body);
                match serde_json::from_str::<JsonErrorBody>(&text) {
                    Ok(parsed) => Self {
                        url,
                        kind: FailureKind::JsonError,
                        message: json_text(parsed.message),
                        details: Some(json_text(parsed.description)),
                    },
                    Err(_) => {
                        let message = if text.is_empty() {
                            format!("HTTP {}", status)
                        } else {
                            text
                        };
                        Self {
                            url,
                            kind: FailureKind::HtmlError,
                            message,
                            details: None,
                        }
                    }
                }
            }
            other => Self {
                url,
                kind: FailureKind::Transport,
                message: other.to_string(),
                details: None,
            },
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == FailureKind::RateLimited
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "URL: {} | Error: {}", self.url, self.message)?;
        if let Some(details) = &self.details {
            write!(f, " | Details: {}", details)?;
        }
        Ok(())
    }
}

/// Removes markup, keeping only text content
pub fn strip_tags(body: &str) -> String {
    let fragment = Html::parse_fragment(body);
    fragment
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}

fn json_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}
