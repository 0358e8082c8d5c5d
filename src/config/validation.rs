//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check that the admin surface is not mounted without a key
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs after command-line overrides are applied

use crate::config::schema::ServiceConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("http.bind_address `{0}` must be a non-empty host without whitespace")]
    BindAddress(String),
    #[error("http.max_connections must be greater than 0")]
    MaxConnections,
    #[error("{0} must be greater than 0")]
    ZeroDuration(&'static str),
    #[error("admin.api_key must be set when admin.enabled is true")]
    MissingAdminKey,
}

/// Validate a fully assembled configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let host = config.http.bind_address.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        errors.push(ValidationError::BindAddress(config.http.bind_address.clone()));
    }

    if config.http.max_connections == 0 {
        errors.push(ValidationError::MaxConnections);
    }

    let durations = [
        ("http.request_timeout_secs", config.http.request_timeout_secs),
        ("lifecycle.startup_timeout_secs", config.lifecycle.startup_timeout_secs),
        ("lifecycle.probe_interval_ms", config.lifecycle.probe_interval_ms),
        ("lifecycle.drain_timeout_secs", config.lifecycle.drain_timeout_secs),
        ("lifecycle.cleanup_timeout_secs", config.lifecycle.cleanup_timeout_secs),
    ];
    for (field, value) in durations {
        if value == 0 {
            errors.push(ValidationError::ZeroDuration(field));
        }
    }

    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::MissingAdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
