//! Outbound relay selection.
//!
//! # Responsibilities
//! - Build a direct client and, when configured, a relayed client
//! - Pick the client for a destination host using the exclusion list
//!
//! # Design Decisions
//! - Both clients are built once; selection is a cheap list scan
//! - Process proxy variables are never read implicitly by the HTTP client;
//!   only the loaded configuration decides

use std::time::Duration;

use reqwest::{Client, Proxy};

use crate::config::{ConfigError, EgressConfig};

/// Exclusion list for the outbound relay.
#[derive(Debug, Clone, Default)]
pub struct BypassList {
    entries: Vec<String>,
}

impl BypassList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|e| e.as_ref().trim().to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// True if `host` should be reached directly.
    ///
    /// `*` matches every host. Any other entry matches the exact host, and
    /// with one leading dot removed, that domain and all of its subdomains.
    pub fn bypasses(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.entries.iter().any(|entry| {
            if entry == "*" || *entry == host {
                return true;
            }
            let domain = entry.strip_prefix('.').unwrap_or(entry);
            host == domain
                || host
                    .strip_suffix(domain)
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }
}

/// HTTP clients for upstream calls.
#[derive(Debug, Clone)]
pub struct OutboundClients {
    direct: Client,
    relayed: Option<Client>,
    bypass: BypassList,
}

impl OutboundClients {
    pub fn from_config(config: &EgressConfig, connect_timeout: Option<Duration>) -> Result<Self, ConfigError> {
        let builder = || {
            let builder = Client::builder().no_proxy();
            match connect_timeout {
                Some(timeout) => builder.connect_timeout(timeout),
                None => builder,
            }
        };

        let direct = builder().build()?;
        let relayed = match &config.proxy_url {
            Some(url) => Some(builder().proxy(Proxy::all(url.as_str())?).build()?),
            None => None,
        };

        Ok(Self {
            direct,
            relayed,
            bypass: BypassList::new(&config.no_proxy),
        })
    }

    pub fn relay_enabled(&self) -> bool {
        self.relayed.is_some()
    }

    /// Client to use for `host`.
    pub fn for_host(&self, host: &str) -> &Client {
        match &self.relayed {
            Some(relayed) if !self.bypass.bypasses(host) => relayed,
            _ => &self.direct,
        }
    }

    /// Whether requests to `host` go through the relay.
    pub fn is_relayed(&self, host: &str) -> bool {
        self.relayed.is_some() && !self.bypass.bypasses(host)
    }
}
