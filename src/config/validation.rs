//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Refuse to start without the primary credential
//! - Validate value ranges (ports, prefixes, header syntax)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use axum::http::{HeaderName, HeaderValue};
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `backup.model`.
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

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check every semantic constraint and report all violations at once.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.primary.oauth_token.trim().is_empty() {
        errors.push(ValidationError::new(
            "primary.oauth_token",
            "missing OAuth token (set ANTHROPIC_OAUTH_TOKEN)",
        ));
    }

    check_endpoint(
        &mut errors,
        "primary",
        &config.primary.scheme,
        &config.primary.host,
        config.primary.port,
        &config.primary.path_prefix,
    );

    for (name, value) in &config.primary.client_headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                format!("primary.client_headers.{name}"),
                "invalid header name",
            ));
        }
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::new(
                format!("primary.client_headers.{name}"),
                "invalid header value",
            ));
        }
    }

    if HeaderValue::from_str(&config.primary.oauth_token).is_err() {
        errors.push(ValidationError::new(
            "primary.oauth_token",
            "token contains characters not allowed in a header",
        ));
    }

    if config.backup.enabled() {
        check_endpoint(
            &mut errors,
            "backup",
            &config.backup.scheme,
            &config.backup.host,
            config.backup.port,
            &config.backup.path_prefix,
        );
        if config.backup.model.trim().is_empty() {
            errors.push(ValidationError::new(
                "backup.model",
                "backup model must be set when the backup is enabled",
            ));
        }
        if HeaderValue::from_str(&config.backup.api_key).is_err() {
            errors.push(ValidationError::new(
                "backup.api_key",
                "key contains characters not allowed in a header",
            ));
        }
    }

    if let Some(proxy_url) = &config.egress.proxy_url {
        if let Err(e) = Url::parse(proxy_url) {
            errors.push(ValidationError::new(
                "egress.proxy_url",
                format!("invalid URL: {e}"),
            ));
        }
    }

    if config.timeouts.attempt_secs == Some(0) {
        errors.push(ValidationError::new(
            "timeouts.attempt_secs",
            "must be greater than zero when set",
        ));
    }

    if config.failover.state_file.trim().is_empty() {
        errors.push(ValidationError::new(
            "failover.state_file",
            "state file path must not be empty",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_endpoint(
    errors: &mut Vec<ValidationError>,
    section: &str,
    scheme: &str,
    host: &str,
    port: u16,
    path_prefix: &str,
) {
    if scheme != "https" && scheme != "http" {
        errors.push(ValidationError::new(
            format!("{section}.scheme"),
            format!("unsupported scheme '{scheme}'"),
        ));
    }
    if host.trim().is_empty() {
        errors.push(ValidationError::new(format!("{section}.host"), "host must not be empty"));
    }
    if port == 0 {
        errors.push(ValidationError::new(format!("{section}.port"), "port must be non-zero"));
    }
    if !path_prefix.is_empty() && !path_prefix.starts_with('/') {
        errors.push(ValidationError::new(
            format!("{section}.path_prefix"),
            "path prefix must start with '/'",
        ));
    }
}
