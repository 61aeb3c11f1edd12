//! Trekky-Harvest: a concurrent accommodation review harvester
//!
//! This crate harvests accommodation records and their guest reviews from a
//! paginated, bot-protected catalog. Work is partitioned over independent
//! concurrent sessions; each one solves the capability handshake, walks the
//! listing and detail pages, and hands back validated records.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod handshake;
pub mod output;
pub mod records;
pub mod report;
pub mod state;
pub mod transport;

use thiserror::Error;

/// Main error type for Trekky-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("All {sessions} sessions failed")]
    AllSessionsFailed { sessions: usize },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),
}

/// Result type alias for Trekky-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{harvest, HarvestReport, HarvestStatus, Supervisor};
pub use records::{AccommodationRecord, ReviewRecord, ValidationFailure};
pub use state::SessionState;
pub use transport::{HttpTransport, Transport, TransportError};
