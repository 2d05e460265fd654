//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid upstream setting: {0}")]
    Upstream(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: defaults, then the optional TOML file, then the
/// process environment. The result is validated before it is returned.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ProxyConfig::default(),
    };

    apply_env(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment variables onto `config`.
///
/// `lookup` abstracts the environment so tests never touch process state.
/// Empty values are treated as unset.
pub fn apply_env<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(token) = get("ANTHROPIC_OAUTH_TOKEN") {
        config.primary.oauth_token = token;
    }

    if let Some(key) = get("MINIMAX_API_KEY") {
        config.backup.api_key = key;
    }
    if let Some(host) = get("MINIMAX_HOST") {
        config.backup.host = host;
    }
    if let Some(port) = get("MINIMAX_PORT") {
        config.backup.port = parse_var("MINIMAX_PORT", port)?;
    }
    if let Some(prefix) = get("MINIMAX_PATH_PREFIX") {
        config.backup.path_prefix = prefix;
    }
    if let Some(model) = get("MINIMAX_MODEL") {
        config.backup.model = model;
    }

    let host = get("PROXY_HOST");
    let port = get("PROXY_PORT")
        .map(|p| parse_var::<u16>("PROXY_PORT", p))
        .transpose()?;
    if host.is_some() || port.is_some() {
        let (current_host, current_port) = split_bind_address(&config.listener.bind_address);
        let host = host.unwrap_or(current_host);
        let port = port.unwrap_or(current_port);
        config.listener.bind_address = format!("{host}:{port}");
    }

    if let Some(ms) = get("COOLDOWN_MS") {
        config.failover.cooldown_ms = parse_var("COOLDOWN_MS", ms)?;
    }
    if let Some(path) = get("STATE_FILE") {
        config.failover.state_file = path;
    }

    if let Some(proxy) = ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy"]
        .iter()
        .find_map(|key| get(*key))
    {
        config.egress.proxy_url = Some(proxy);
    }
    if let Some(list) = get("NO_PROXY").or_else(|| get("no_proxy")) {
        config.egress.no_proxy = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }

    if let Some(secs) = get("UPSTREAM_TIMEOUT_SECS") {
        config.timeouts.attempt_secs = Some(parse_var("UPSTREAM_TIMEOUT_SECS", secs)?);
    }
    if let Some(level) = get("LOG_LEVEL") {
        config.observability.log_level = level;
    }

    Ok(())
}

fn parse_var<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}

fn split_bind_address(addr: &str) -> (String, u16) {
    match addr.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(8089)),
        None => (addr.to_string(), 8089),
    }
}
