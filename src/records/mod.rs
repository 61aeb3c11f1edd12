//! Harvested domain records
//!
//! An `AccommodationRecord` is only ever constructed through
//! [`AccommodationRecord::new`], which refuses a record without a name or an
//! email. Anything holding one can rely on both fields being non-empty.

use serde::Serialize;
use std::fmt;

/// A single guest review attached to an accommodation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReviewRecord {
    /// Parsed rating, `None` when the rating text was missing or not a number
    pub rating: Option<f64>,
}

impl ReviewRecord {
    pub fn new(rating: Option<f64>) -> Self {
        Self { rating }
    }
}

/// An accommodation harvested from a detail page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccommodationRecord {
    name: String,
    email: String,
    reviews: Vec<ReviewRecord>,
}

/// Why an extracted accommodation was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationFailure {
    #[error("accommodation has no name")]
    MissingName,

    #[error("accommodation has no email")]
    MissingEmail,
}

impl AccommodationRecord {
    /// Builds a validated record
    ///
    /// Name and email are trimmed first; an empty value after trimming counts
    /// as missing. The name is checked before the email.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        reviews: Vec<ReviewRecord>,
    ) -> Result<Self, ValidationFailure> {
        let name = name.into().trim().to_string();
        let email = email.into().trim().to_string();

        if name.is_empty() {
            return Err(ValidationFailure::MissingName);
        }
        if email.is_empty() {
            return Err(ValidationFailure::MissingEmail);
        }

        Ok(Self {
            name,
            email,
            reviews,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Reviews in page order
    pub fn reviews(&self) -> &[ReviewRecord] {
        &self.reviews
    }

    /// Renders the reviews as a JSON array of `{"rating": ...}` objects
    pub fn reviews_json(&self) -> String {
        serde_json::to_string(&self.reviews).unwrap_or_else(|_| "[]".to_string())
    }
}

impl fmt::Display for AccommodationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}> ({} reviews)",
            self.name,
            self.email,
            self.reviews.len()
        )
    }
}
