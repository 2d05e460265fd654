//! Health and status reports.
//!
//! Both are read-only views of a state snapshot; neither triggers cooldown
//! recovery.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::failover::{ProxyState, UpstreamCounters};
use crate::upstream::Upstream;

/// Body of `GET /health` and `GET /healthz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub ok: bool,
    pub brain: Upstream,
    pub backup_enabled: bool,
    pub request_count: UpstreamCounters,
    pub error_count: UpstreamCounters,
    pub last_switch: Option<String>,
}

impl HealthReport {
    pub fn new(state: &ProxyState, backup_enabled: bool) -> Self {
        Self {
            ok: true,
            brain: state.active,
            backup_enabled,
            request_count: state.request_count,
            error_count: state.error_count,
            last_switch: iso(state.last_switch_at),
        }
    }
}

/// Body of `GET /brain-status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrainStatus {
    pub current_brain: Upstream,
    pub backup_enabled: bool,
    pub backup_model: Option<String>,
    pub primary_rate_limited_at: Option<String>,
    pub backup_rate_limited_at: Option<String>,
    pub last_switch_time: Option<String>,
    pub request_count: UpstreamCounters,
    pub error_count: UpstreamCounters,
    pub cooldown_ms: u64,
}

impl BrainStatus {
    pub fn new(state: &ProxyState, backup_model: Option<String>, cooldown_ms: u64) -> Self {
        Self {
            current_brain: state.active,
            backup_enabled: backup_model.is_some(),
            backup_model,
            primary_rate_limited_at: iso(state.primary_rate_limited_at),
            backup_rate_limited_at: iso(state.backup_rate_limited_at),
            last_switch_time: iso(state.last_switch_at),
            request_count: state.request_count,
            error_count: state.error_count,
            cooldown_ms,
        }
    }
}

fn iso(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
}
