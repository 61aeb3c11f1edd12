use crate::config::types::{
    ClientConfig, Config, HandshakeConfig, HarvestConfig, NavigationConfig, OutputConfig,
    RetryConfig, SelectorConfig,
};
use crate::handshake::HandshakeBuilder;
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Upper bound on concurrent sessions
pub const MAX_SESSIONS: u32 = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvest_config(&config.harvest)?;
    validate_navigation_config(&config.navigation)?;
    validate_retry_config(&config.retry)?;
    if let Some(handshake) = &config.handshake {
        validate_handshake_config(handshake)?;
    }
    validate_selector_config(&config.selectors)?;
    validate_client_config(&config.client)?;
    validate_output_config(&config.output)?;

    // Every session's listing URL must be derivable up front
    config
        .listing_url(1)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid listing-path: {}", e)))?;
    if let Some(Err(e)) = config.handshake_url() {
        return Err(ConfigError::InvalidUrl(format!(
            "Invalid handshake endpoint: {}",
            e
        )));
    }

    Ok(())
}

fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.start_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid start-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "start-url must use http or https, got '{}'",
            config.start_url
        )));
    }

    if config.sessions < 1 || config.sessions > MAX_SESSIONS {
        return Err(ConfigError::Validation(format!(
            "sessions must be between 1 and {}, got {}",
            MAX_SESSIONS, config.sessions
        )));
    }

    if config.listing_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "listing-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_navigation_config(config: &NavigationConfig) -> Result<(), ConfigError> {
    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "timeout-ms must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max-delay-ms ({}) must be >= base-delay-ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

    // A 429 must never back off less than a generic transient failure
    if !config.rate_limit_multiplier.is_finite() || config.rate_limit_multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "rate-limit-multiplier must be a finite number >= 1.0, got {}",
            config.rate_limit_multiplier
        )));
    }

    Ok(())
}

fn validate_handshake_config(config: &HandshakeConfig) -> Result<(), ConfigError> {
    if config.endpoint.trim().is_empty() {
        return Err(ConfigError::Validation(
            "handshake endpoint cannot be empty".to_string(),
        ));
    }

    if config.field.trim().is_empty() {
        return Err(ConfigError::Validation(
            "handshake field cannot be empty".to_string(),
        ));
    }

    if config.probe.is_empty() {
        return Err(ConfigError::Validation(
            "handshake probe must declare at least one capability".to_string(),
        ));
    }

    HandshakeBuilder::from_key(&config.public_key, config.probe.clone().into())
        .map_err(|e| ConfigError::Validation(format!("Invalid handshake public-key: {}", e)))?;

    Ok(())
}

fn validate_selector_config(config: &SelectorConfig) -> Result<(), ConfigError> {
    for (name, selector) in [
        ("detail-link", &config.detail_link),
        ("pagination-link", &config.pagination_link),
        ("name", &config.name),
        ("email", &config.email),
        ("review", &config.review),
        ("rating", &config.rating),
    ] {
        validate_selector(name, selector)?;
    }
    Ok(())
}

fn validate_selector(name: &str, selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("{} selector '{}': {:?}", name, selector, e)))
}

fn validate_client_config(config: &ClientConfig) -> Result<(), ConfigError> {
    if let Some(proxy) = &config.proxy_url {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy-url: {}", e)))?;
    }

    if config.proxy_url.is_none()
        && (config.proxy_username.is_some() || config.proxy_password.is_some())
    {
        return Err(ConfigError::Validation(
            "proxy credentials given without proxy-url".to_string(),
        ));
    }

    for name in config.headers.keys() {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ConfigError::Validation(format!(
                "Invalid header name '{}'",
                name
            )));
        }
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.csv_path.is_empty() {
        return Err(ConfigError::Validation(
            "csv-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
