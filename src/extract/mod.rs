//! Extraction of links and accommodation records from rendered markup
//!
//! Listing pages yield pagination and detail links; detail pages yield one
//! [`AccommodationRecord`]. Everything here is synchronous and never leaves
//! the calling session: a record that fails validation is reported as a
//! [`ValidationFailure`] for the caller to log and skip.

use crate::config::SelectorConfig;
use crate::records::{AccommodationRecord, ReviewRecord, ValidationFailure};
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Compiled CSS selectors for one session
#[derive(Debug, Clone)]
pub struct PageSelectors {
    detail_link: Selector,
    pagination_link: Selector,
    name: Selector,
    email: Selector,
    review: Selector,
    rating: Selector,
}

impl PageSelectors {
    /// Compiles every selector in `config`
    pub fn compile(config: &SelectorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            detail_link: compile(&config.detail_link)?,
            pagination_link: compile(&config.pagination_link)?,
            name: compile(&config.name)?,
            email: compile(&config.email)?,
            review: compile(&config.review)?,
            rating: compile(&config.rating)?,
        })
    }
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

/// Links found on a listing page, each list in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingLinks {
    pub pagination: Vec<Url>,
    pub details: Vec<Url>,
}

/// Extracts pagination and detail links from a listing page
///
/// Links are resolved against `base_url`. Elements without a usable `href`
/// are skipped.
pub fn parse_listing(html: &str, base_url: &Url, selectors: &PageSelectors) -> ListingLinks {
    let document = Html::parse_document(html);

    ListingLinks {
        pagination: collect_links(&document, &selectors.pagination_link, base_url),
        details: collect_links(&document, &selectors.detail_link, base_url),
    }
}

fn collect_links(document: &Html, selector: &Selector, base_url: &Url) -> Vec<Url> {
    document
        .select(selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_link(href, base_url))
        .collect()
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) if matches!(absolute_url.scheme(), "http" | "https") => {
            Some(absolute_url)
        }
        _ => None,
    }
}

/// Extracts and validates the accommodation described by a detail page
///
/// Every element matching the review selector becomes one review, even when
/// its rating is missing or unparsable.
pub fn extract_accommodation(
    html: &str,
    selectors: &PageSelectors,
) -> Result<AccommodationRecord, ValidationFailure> {
    let document = Html::parse_document(html);

    let reviews = document
        .select(&selectors.review)
        .map(|review| extract_review(review, selectors))
        .collect();

    let name = first_text(&document, &selectors.name).unwrap_or_default();
    let email = first_text(&document, &selectors.email).unwrap_or_default();

    AccommodationRecord::new(name, email, reviews)
}

fn extract_review(review: ElementRef<'_>, selectors: &PageSelectors) -> ReviewRecord {
    let text = review
        .select(&selectors.rating)
        .next()
        .map(|rating| rating.text().collect::<String>());

    ReviewRecord::new(parse_rating(text.as_deref()))
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|element| normalize_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

/// Parses a rating, yielding `None` for missing, non-numeric or non-finite text
pub fn parse_rating(text: Option<&str>) -> Option<f64> {
    let text = text?.trim();
    if text.is_empty() {
        return None;
    }

    match text.parse::<f64>() {
        Ok(rating) if rating.is_finite() => Some(rating),
        _ => {
            tracing::warn!("Invalid rating value: {:?}", text);
            None
        }
    }
}

/// Collapses runs of whitespace (including newlines) into single spaces
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
