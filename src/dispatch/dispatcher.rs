//! Upstream dispatch with retry-once failover.

use std::error::Error as StdError;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

use crate::config::{ConfigError, ProxyConfig};
use crate::dispatch::egress::OutboundClients;
use crate::dispatch::headers::upstream_headers;
use crate::failover::{Attempt, FailoverMachine, FailureSignal};
use crate::transform::transform_body;
use crate::upstream::{Upstream, UpstreamSet};

/// Non-standard "overloaded" status some providers use alongside 429.
pub const STATUS_OVERLOADED: u16 = 529;

/// True for statuses that signal the upstream is rate limiting us.
pub fn is_rate_limited(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == STATUS_OVERLOADED
}

/// A fully buffered inbound request.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Path plus query string, exactly as received.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub request_id: String,
}

/// One attempt's worth of outbound request.
#[derive(Debug)]
pub struct OutboundRequest {
    pub target: Upstream,
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub attempt: Attempt,
}

/// Why an attempt produced no response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// No response headers within the per-attempt timeout.
    #[error("no response from upstream within {}s", .0.as_secs())]
    Timeout(Duration),
}

/// What one attempt produced.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Any response that is not a rate limit.
    Response(reqwest::Response),
    RateLimited(reqwest::Response),
    Transport(DispatchError),
}

impl AttemptOutcome {
    fn failure_signal(&self) -> Option<FailureSignal> {
        match self {
            AttemptOutcome::Response(_) => None,
            AttemptOutcome::RateLimited(response) => {
                Some(FailureSignal::RateLimited(response.status().as_u16()))
            }
            AttemptOutcome::Transport(e) => Some(FailureSignal::Transport(error_chain(e))),
        }
    }

    fn into_result(self) -> Result<reqwest::Response, DispatchError> {
        match self {
            AttemptOutcome::Response(response) | AttemptOutcome::RateLimited(response) => {
                Ok(response)
            }
            AttemptOutcome::Transport(e) => Err(e),
        }
    }
}

/// Final result of dispatching one inbound request.
#[derive(Debug)]
pub struct Dispatched {
    /// Upstream that handled the last attempt.
    pub upstream: Upstream,
    pub attempt: Attempt,
    /// The upstream response to relay, or the transport error to surface.
    pub outcome: Result<reqwest::Response, DispatchError>,
}

struct AttemptReport {
    upstream: Upstream,
    outcome: AttemptOutcome,
    retry_target: Option<Upstream>,
}

impl AttemptReport {
    fn finish(self, attempt: Attempt) -> Dispatched {
        Dispatched {
            upstream: self.upstream,
            attempt,
            outcome: self.outcome.into_result(),
        }
    }
}

/// Builds outbound requests and drives the retry-once policy.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    upstreams: UpstreamSet,
    clients: OutboundClients,
    attempt_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        upstreams: UpstreamSet,
        clients: OutboundClients,
        attempt_timeout: Option<Duration>,
    ) -> Self {
        Self {
            upstreams,
            clients,
            attempt_timeout,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let attempt_timeout = config.timeouts.attempt_secs.map(Duration::from_secs);
        Ok(Self::new(
            UpstreamSet::from_config(&config.primary, &config.backup)?,
            OutboundClients::from_config(&config.egress, attempt_timeout)?,
            attempt_timeout,
        ))
    }

    pub fn upstreams(&self) -> &UpstreamSet {
        &self.upstreams
    }

    pub fn clients(&self) -> &OutboundClients {
        &self.clients
    }

    /// Build the request for one attempt. The body is transformed from the
    /// original inbound bytes every time, so a retry never inherits the
    /// other upstream's rewrites.
    pub fn build(&self, inbound: &InboundRequest, target: Upstream, attempt: Attempt) -> OutboundRequest {
        let upstream = self.upstreams.get(target);
        let body = transform_body(&inbound.body, upstream);
        let headers = upstream_headers(&inbound.headers, upstream, body.len());

        OutboundRequest {
            target: upstream.upstream,
            method: inbound.method.clone(),
            url: upstream.target_url(&inbound.path_and_query),
            headers,
            body,
            attempt,
        }
    }

    /// Issue one outbound request. The per-attempt timeout bounds the wait
    /// for response headers only; the body streams without a deadline.
    pub async fn send(&self, request: OutboundRequest) -> AttemptOutcome {
        let host = &self.upstreams.get(request.target).host;
        let pending = self
            .clients
            .for_host(host)
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body)
            .send();

        let sent = match self.attempt_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, pending).await {
                Ok(sent) => sent,
                Err(_) => return AttemptOutcome::Transport(DispatchError::Timeout(timeout)),
            },
            None => pending.await,
        };

        match sent {
            Ok(response) if is_rate_limited(response.status()) => AttemptOutcome::RateLimited(response),
            Ok(response) => AttemptOutcome::Response(response),
            Err(e) => AttemptOutcome::Transport(e.into()),
        }
    }

    /// Dispatch `inbound` to `target`, failing over and retrying at most once.
    pub async fn dispatch(
        &self,
        failover: &FailoverMachine,
        inbound: &InboundRequest,
        target: Upstream,
    ) -> Dispatched {
        let first = self.attempt(failover, inbound, target, Attempt::First).await;
        let Some(retry_target) = first.retry_target else {
            return first.finish(Attempt::First);
        };

        self.attempt(failover, inbound, retry_target, Attempt::Retry)
            .await
            .finish(Attempt::Retry)
    }

    async fn attempt(
        &self,
        failover: &FailoverMachine,
        inbound: &InboundRequest,
        target: Upstream,
        attempt: Attempt,
    ) -> AttemptReport {
        let request = self.build(inbound, target, attempt);
        let upstream = request.target;

        tracing::info!(
            request_id = %inbound.request_id,
            upstream = %upstream,
            method = %request.method,
            url = %request.url,
            retry = attempt.is_retry(),
            relayed = self.clients.is_relayed(&self.upstreams.get(upstream).host),
            "Dispatching request"
        );

        failover.record_attempt(upstream);
        let outcome = self.send(request).await;

        let retry_target = match outcome.failure_signal() {
            Some(signal) => {
                match &signal {
                    FailureSignal::RateLimited(status) => tracing::warn!(
                        request_id = %inbound.request_id,
                        upstream = %upstream,
                        status = *status,
                        "Upstream rate limited"
                    ),
                    FailureSignal::Transport(message) => tracing::error!(
                        request_id = %inbound.request_id,
                        upstream = %upstream,
                        error = %message,
                        "Upstream transport error"
                    ),
                }
                failover.report_failure(upstream, &signal, attempt)
            }
            None => None,
        };

        AttemptReport {
            upstream,
            outcome,
            retry_target,
        }
    }
}

/// Render an error with its source chain, e.g.
/// `error sending request: connection refused`.
pub fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
