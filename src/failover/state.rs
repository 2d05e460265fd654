//! In-memory failover state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::upstream::Upstream;

/// Monotonic per-upstream counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamCounters {
    pub primary: u64,
    pub backup: u64,
}

impl UpstreamCounters {
    pub fn get(&self, upstream: Upstream) -> u64 {
        match upstream {
            Upstream::Primary => self.primary,
            Upstream::Backup => self.backup,
        }
    }

    pub fn increment(&mut self, upstream: Upstream) {
        let slot = match upstream {
            Upstream::Primary => &mut self.primary,
            Upstream::Backup => &mut self.backup,
        };
        *slot = slot.saturating_add(1);
    }
}

/// Process-wide failover state. Owned by [`FailoverMachine`](super::FailoverMachine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyState {
    /// Upstream that receives new requests.
    pub active: Upstream,
    pub last_switch_at: Option<DateTime<Utc>>,
    pub primary_rate_limited_at: Option<DateTime<Utc>>,
    pub backup_rate_limited_at: Option<DateTime<Utc>>,
    pub request_count: UpstreamCounters,
    pub error_count: UpstreamCounters,
}

impl Default for ProxyState {
    fn default() -> Self {
        Self {
            active: Upstream::Primary,
            last_switch_at: None,
            primary_rate_limited_at: None,
            backup_rate_limited_at: None,
            request_count: UpstreamCounters::default(),
            error_count: UpstreamCounters::default(),
        }
    }
}

impl ProxyState {
    pub fn rate_limited_at(&self, upstream: Upstream) -> Option<DateTime<Utc>> {
        match upstream {
            Upstream::Primary => self.primary_rate_limited_at,
            Upstream::Backup => self.backup_rate_limited_at,
        }
    }

    pub(crate) fn mark_rate_limited(&mut self, upstream: Upstream, at: DateTime<Utc>) {
        match upstream {
            Upstream::Primary => self.primary_rate_limited_at = Some(at),
            Upstream::Backup => self.backup_rate_limited_at = Some(at),
        }
    }
}

/// Current time truncated to the millisecond precision the state file keeps.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
