//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the failover proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Primary upstream, authenticated with an OAuth bearer token.
    pub primary: PrimaryConfig,

    /// Backup upstream, authenticated with an API key header.
    pub backup: BackupConfig,

    /// Failover cooldown and state persistence.
    pub failover: FailoverConfig,

    /// Outbound relay for restrictive egress networks.
    pub egress: EgressConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8089").
    pub bind_address: String,

    /// Largest inbound body the front door will buffer.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8089".to_string(),
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Primary upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PrimaryConfig {
    /// "https" in production; "http" is accepted for local upstreams.
    pub scheme: String,

    pub host: String,

    pub port: u16,

    /// Prepended to every inbound path. Empty for the primary by default.
    pub path_prefix: String,

    /// OAuth access token sent as `authorization: Bearer <token>`.
    pub oauth_token: String,

    /// Feature flags joined into the `anthropic-beta` header.
    pub beta_features: Vec<String>,

    /// Client identification headers sent with every primary request.
    pub client_headers: BTreeMap<String, String>,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        let client_headers = BTreeMap::from([
            ("x-app".to_string(), "cli".to_string()),
            (
                "user-agent".to_string(),
                "claude-cli/2.1.2 (external, cli)".to_string(),
            ),
        ]);

        Self {
            scheme: "https".to_string(),
            host: "api.anthropic.com".to_string(),
            port: 443,
            path_prefix: String::new(),
            oauth_token: String::new(),
            beta_features: vec![
                "claude-code-20250219".to_string(),
                "oauth-2025-04-20".to_string(),
                "fine-grained-tool-streaming-2025-05-14".to_string(),
                "interleaved-thinking-2025-05-14".to_string(),
            ],
            client_headers,
        }
    }
}

/// Backup upstream configuration.
///
/// The backup is enabled if and only if `api_key` is non-empty.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupConfig {
    pub scheme: String,

    pub host: String,

    pub port: u16,

    /// Path of the wire-compatible shim on the backup host.
    pub path_prefix: String,

    /// Secret sent in the `x-api-key` header.
    pub api_key: String,

    /// Model identifier substituted into every request sent to the backup.
    pub model: String,
}

impl BackupConfig {
    /// Whether a backup upstream is configured at all.
    pub fn enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            host: "api.minimaxi.com".to_string(),
            port: 443,
            path_prefix: "/anthropic".to_string(),
            api_key: String::new(),
            model: "MiniMax-M2.5".to_string(),
        }
    }
}

/// Failover behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Time after a primary rate limit before traffic returns to the primary.
    pub cooldown_ms: u64,

    /// JSON file holding the failover state across restarts.
    pub state_file: String,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 5 * 60 * 1000,
            state_file: "brain-state.json".to_string(),
        }
    }
}

/// Outbound relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EgressConfig {
    /// Forward proxy URL (e.g., "http://proxy.corp:3128"). Unset = direct.
    pub proxy_url: Option<String>,

    /// Hosts that bypass the relay. Supports "*" and domain suffixes.
    pub no_proxy: Vec<String>,
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a single upstream attempt in seconds. Unset = transport default.
    pub attempt_secs: Option<u64>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
