//! Upstream definitions.
//!
//! # Responsibilities
//! - Name the two upstreams (primary, backup)
//! - Hold the immutable per-upstream connection parameters
//! - Resolve the outbound URL for an inbound path
//!
//! # Design Decisions
//! - Built once from `ProxyConfig` at startup; never mutated
//! - Header overrides are parsed at build time so dispatch cannot fail on them
//! - The backup is absent (not disabled) when no API key is configured

use std::fmt;
use std::str::FromStr;

use axum::http::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{BackupConfig, ConfigError, PrimaryConfig};

/// Which upstream a request is (or was) sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Upstream {
    Primary,
    Backup,
}

impl Upstream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Upstream::Primary => "primary",
            Upstream::Backup => "backup",
        }
    }

    /// The upstream a failover from `self` lands on.
    pub fn other(&self) -> Upstream {
        match self {
            Upstream::Primary => Upstream::Backup,
            Upstream::Backup => Upstream::Primary,
        }
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Upstream {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Upstream::Primary),
            "backup" => Ok(Upstream::Backup),
            other => Err(format!("unknown upstream '{other}'")),
        }
    }
}

/// How an upstream authenticates the proxy.
///
/// Each variant holds the ready-to-send header value, marked sensitive.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// `authorization: Bearer <token>`.
    Bearer(HeaderValue),
    /// `x-api-key: <key>`.
    ApiKey(HeaderValue),
}

impl fmt::Debug for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            AuthScheme::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

/// Connection parameters for one upstream.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub upstream: Upstream,
    pub origin: Url,
    pub host: String,
    pub path_prefix: String,
    pub auth: AuthScheme,
    /// Headers forced onto every request to this upstream.
    pub fixed_headers: Vec<(HeaderName, HeaderValue)>,
    /// Replaces the request's model identifier (backup only).
    pub model_override: Option<String>,
}

impl UpstreamConfig {
    /// Build the bearer-token primary upstream.
    pub fn primary(config: &PrimaryConfig) -> Result<Self, ConfigError> {
        let mut fixed_headers = Vec::new();

        if !config.beta_features.is_empty() {
            let beta = config.beta_features.join(",");
            fixed_headers.push((
                HeaderName::from_static("anthropic-beta"),
                header_value("anthropic-beta", &beta)?,
            ));
        }

        for (name, value) in &config.client_headers {
            let header = HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes())
                .map_err(|_| ConfigError::Upstream(format!("invalid header name '{name}'")))?;
            fixed_headers.push((header, header_value(name, value)?));
        }

        Ok(Self {
            upstream: Upstream::Primary,
            origin: origin(&config.scheme, &config.host, config.port)?,
            host: config.host.clone(),
            path_prefix: config.path_prefix.clone(),
            auth: AuthScheme::Bearer(secret_value(&format!("Bearer {}", config.oauth_token))?),
            fixed_headers,
            model_override: None,
        })
    }

    /// Build the API-key backup upstream, or `None` when no key is set.
    pub fn backup(config: &BackupConfig) -> Result<Option<Self>, ConfigError> {
        if !config.enabled() {
            return Ok(None);
        }

        Ok(Some(Self {
            upstream: Upstream::Backup,
            origin: origin(&config.scheme, &config.host, config.port)?,
            host: config.host.clone(),
            path_prefix: config.path_prefix.clone(),
            auth: AuthScheme::ApiKey(secret_value(&config.api_key)?),
            fixed_headers: Vec::new(),
            model_override: Some(config.model.clone()),
        }))
    }

    /// Path sent upstream for an inbound path-and-query.
    pub fn target_path(&self, inbound: &str) -> String {
        format!("{}{}", self.path_prefix, inbound)
    }

    /// Absolute URL for an inbound path-and-query.
    pub fn target_url(&self, inbound: &str) -> String {
        let origin = self.origin.as_str().trim_end_matches('/');
        format!("{}{}", origin, self.target_path(inbound))
    }
}

fn origin(scheme: &str, host: &str, port: u16) -> Result<Url, ConfigError> {
    Url::parse(&format!("{scheme}://{host}:{port}"))
        .map_err(|e| ConfigError::Upstream(format!("{scheme}://{host}:{port}: {e}")))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value)
        .map_err(|_| ConfigError::Upstream(format!("invalid value for header '{name}'")))
}

fn secret_value(value: &str) -> Result<HeaderValue, ConfigError> {
    let mut value = HeaderValue::from_str(value)
        .map_err(|_| ConfigError::Upstream("credential is not a valid header value".into()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// The primary and (optional) backup upstream.
#[derive(Debug, Clone)]
pub struct UpstreamSet {
    primary: UpstreamConfig,
    backup: Option<UpstreamConfig>,
}

impl UpstreamSet {
    pub fn new(primary: UpstreamConfig, backup: Option<UpstreamConfig>) -> Self {
        Self { primary, backup }
    }

    pub fn from_config(
        primary: &PrimaryConfig,
        backup: &BackupConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            UpstreamConfig::primary(primary)?,
            UpstreamConfig::backup(backup)?,
        ))
    }

    pub fn backup_enabled(&self) -> bool {
        self.backup.is_some()
    }

    /// Connection parameters for `upstream`. Asking for a missing backup
    /// yields the primary, which is the only upstream that can be active then.
    pub fn get(&self, upstream: Upstream) -> &UpstreamConfig {
        match upstream {
            Upstream::Backup => self.backup.as_ref().unwrap_or(&self.primary),
            Upstream::Primary => &self.primary,
        }
    }

    pub fn backup(&self) -> Option<&UpstreamConfig> {
        self.backup.as_ref()
    }
}
