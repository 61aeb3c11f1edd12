//! Configuration module for trekky-harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use trekky_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvesting with {} sessions", config.harvest.sessions);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ClientConfig, Config, HandshakeConfig, HarvestConfig, NavigationConfig, OutputConfig,
    RetryConfig, SelectorConfig, WaitKind,
};
pub use validation::MAX_SESSIONS;

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
