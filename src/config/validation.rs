//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes and timeouts > 0, addresses parse)
//! - Detect route and security sections pointing at the same directory
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{BundleDirConfig, ServerConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_content_length == 0 {
        errors.push(ValidationError::new("listener.max_content_length", "must be greater than 0"));
    }
    if config.listener.read_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.read_timeout_secs", "must be greater than 0"));
    }

    validate_bundle_dir("routes", &config.routes, &mut errors);
    validate_bundle_dir("security", &config.security, &mut errors);

    if config.routes.enabled && config.security.enabled && config.route_dir() == config.security_dir() {
        errors.push(ValidationError::new(
            "security.directory",
            "must differ from routes.directory",
        ));
    }

    if config.watcher.use_polling && config.watcher.poll_interval_secs == 0 {
        errors.push(ValidationError::new("watcher.poll_interval_secs", "must be greater than 0"));
    }

    if config.ping.enabled && !config.ping.path.starts_with('/') {
        errors.push(ValidationError::new("ping.path", "must start with '/'"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_bundle_dir(section: &str, dir: &BundleDirConfig, errors: &mut Vec<ValidationError>) {
    if !dir.enabled {
        return;
    }
    if dir.bundle_glob.trim().is_empty() || dir.bundle_glob.contains('/') {
        errors.push(ValidationError::new(
            format!("{section}.bundle_glob"),
            "must be a non-empty file-name pattern",
        ));
    }
    if dir.scan_timeout_secs == 0 {
        errors.push(ValidationError::new(
            format!("{section}.scan_timeout_secs"),
            "must be greater than 0",
        ));
    }
    if dir.metadata_dir.as_deref().is_some_and(|m| m.trim_matches('/').is_empty()) {
        errors.push(ValidationError::new(
            format!("{section}.metadata_dir"),
            "must name a directory inside the bundle",
        ));
    }
}
