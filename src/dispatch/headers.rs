//! Outbound header construction.
//!
//! # Responsibilities
//! - Apply the upstream's auth scheme and fixed headers
//! - Default the protocol-version header
//! - Recompute framing for the fully buffered body
//! - Strip hop-by-hop headers in both directions
//!
//! # Design Decisions
//! - The inbound map is copied, never mutated in place
//! - Credentials for the other upstream are always removed

use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::upstream::{AuthScheme, UpstreamConfig};

pub const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");
pub const ANTHROPIC_VERSION: HeaderName = HeaderName::from_static("anthropic-version");
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

/// Connection-scoped headers that must not be forwarded (RFC 9110 §7.6.1).
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Build the header set for one attempt against `upstream`.
pub fn upstream_headers(inbound: &HeaderMap, upstream: &UpstreamConfig, body_len: usize) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);

    match HeaderValue::from_str(&upstream.host) {
        Ok(host) => {
            headers.insert(HOST, host);
        }
        Err(_) => {
            headers.remove(HOST);
        }
    }

    match &upstream.auth {
        AuthScheme::Bearer(value) => {
            headers.insert(AUTHORIZATION, value.clone());
            headers.remove(X_API_KEY);
        }
        AuthScheme::ApiKey(value) => {
            headers.insert(X_API_KEY, value.clone());
            headers.remove(AUTHORIZATION);
        }
    }

    for (name, value) in &upstream.fixed_headers {
        headers.insert(name.clone(), value.clone());
    }

    if !headers.contains_key(ANTHROPIC_VERSION) {
        headers.insert(
            ANTHROPIC_VERSION,
            HeaderValue::from_static(DEFAULT_ANTHROPIC_VERSION),
        );
    }

    headers.remove(TRANSFER_ENCODING);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body_len));

    headers
}

/// Remove connection-scoped headers, including any listed in `connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all("connection")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
