//! Response relay.
//!
//! # Responsibilities
//! - Relay the upstream's status, headers, and body to the caller
//! - Map unrecoverable upstream failures to 502
//!
//! # Design Decisions
//! - The body is streamed chunk by chunk, never buffered
//! - Hop-by-hop headers are stripped; everything else passes through verbatim
//! - A stream that breaks mid-body is logged; the caller sees a truncated body

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;

use crate::dispatch::headers::strip_hop_by_hop;
use crate::upstream::Upstream;

/// Turn an upstream response into the caller's response.
pub fn relay(upstream_response: reqwest::Response, upstream: Upstream, request_id: &str) -> Response {
    let status = upstream_response.status();
    let mut headers = upstream_response.headers().clone();
    strip_hop_by_hop(&mut headers);

    let request_id = request_id.to_string();
    let stream = upstream_response.bytes_stream().inspect_err(move |e| {
        tracing::warn!(
            request_id = %request_id,
            upstream = %upstream,
            error = %e,
            "Upstream body stream failed"
        );
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Plain-text 502 for a request neither upstream could serve.
pub fn bad_gateway(message: &str) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        [(CONTENT_TYPE, "text/plain")],
        format!("Proxy error: {message}"),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bad_gateway_is_plain_text() {
        let response = bad_gateway("connection refused");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Proxy error: connection refused");
    }
}
