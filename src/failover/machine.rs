//! Failover state machine.
//!
//! # States
//! ```text
//! PrimaryActive ──(primary 429/529 or transport error)──▶ BackupActive
//! BackupActive  ──(backup 429/529 or transport error)───▶ PrimaryActive
//! BackupActive  ──(request arrives, cooldown elapsed)───▶ PrimaryActive
//! ```
//!
//! # Design Decisions
//! - Single writer: every mutation happens under one mutex, and a transition
//!   (flip, timestamp) completes before the lock is released
//! - Persisting snapshots the state and numbers it under the state lock, then
//!   writes with only the writer lock held; a snapshot older than the last one
//!   written is dropped, so the file always ends on the latest transition
//! - A failure only flips state if it came from the upstream that is still
//!   active; a stale report from a request dispatched before a concurrent
//!   switch leaves state alone
//! - Without a backup every transition is a no-op
//! - Recovery is checked on the request path, never on a timer

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::failover::persistence::StateStore;
use crate::failover::state::{now_millis, ProxyState};
use crate::observability::metrics;
use crate::upstream::Upstream;

/// Whether a dispatch is the first try or the single permitted retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retry,
}

impl Attempt {
    pub fn is_retry(&self) -> bool {
        matches!(self, Attempt::Retry)
    }
}

/// A failure observed from an upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureSignal {
    /// 429 or 529 status.
    RateLimited(u16),
    /// Connection refused, DNS failure, timeout and friends.
    Transport(String),
}

impl FailureSignal {
    pub fn kind(&self) -> &'static str {
        match self {
            FailureSignal::RateLimited(_) => "rate_limit",
            FailureSignal::Transport(_) => "transport",
        }
    }
}

/// Why the active upstream changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchReason {
    RateLimited(u16),
    ConnectionError(String),
    CooldownExpired,
}

impl SwitchReason {
    /// Low-cardinality label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SwitchReason::RateLimited(_) => "rate_limit",
            SwitchReason::ConnectionError(_) => "connection_error",
            SwitchReason::CooldownExpired => "cooldown_expired",
        }
    }
}

impl From<&FailureSignal> for SwitchReason {
    fn from(signal: &FailureSignal) -> Self {
        match signal {
            FailureSignal::RateLimited(status) => SwitchReason::RateLimited(*status),
            FailureSignal::Transport(message) => SwitchReason::ConnectionError(message.clone()),
        }
    }
}

impl fmt::Display for SwitchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchReason::RateLimited(status) => write!(f, "{status}_rate_limit"),
            SwitchReason::ConnectionError(message) => write!(f, "connection_error: {message}"),
            SwitchReason::CooldownExpired => f.write_str("cooldown_expired"),
        }
    }
}

/// Owner of [`ProxyState`]; the only code that mutates it.
#[derive(Debug)]
pub struct FailoverMachine {
    state: Mutex<ProxyState>,
    /// Bumped under the `state` lock for every snapshot taken for disk.
    revision: AtomicU64,
    /// Serializes state-file writes; holds the last revision written.
    writer: Mutex<u64>,
    store: StateStore,
    backup_enabled: bool,
    cooldown: Duration,
}

impl FailoverMachine {
    /// Load persisted state and enforce the "backup only if configured" rule.
    pub fn new(store: StateStore, backup_enabled: bool, cooldown: Duration) -> Self {
        let mut state = store.load();
        if state.active == Upstream::Backup && !backup_enabled {
            tracing::warn!("Persisted state selects the backup but none is configured, using primary");
            state.active = Upstream::Primary;
        }
        metrics::set_active_upstream(state.active);

        Self {
            state: Mutex::new(state),
            revision: AtomicU64::new(0),
            writer: Mutex::new(0),
            store,
            backup_enabled,
            cooldown,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProxyState> {
        // Critical sections never leave the state half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release `state` and write its snapshot to disk.
    fn persist(&self, state: MutexGuard<'_, ProxyState>) {
        let snapshot = state.clone();
        let revision = self.revision.fetch_add(1, Ordering::Relaxed) + 1;
        drop(state);

        let mut written = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if revision > *written {
            self.store.save(&snapshot);
            *written = revision;
        }
    }

    pub fn backup_enabled(&self) -> bool {
        self.backup_enabled
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Copy of the current state for status reporting.
    pub fn snapshot(&self) -> ProxyState {
        self.lock().clone()
    }

    pub fn active(&self) -> Upstream {
        self.lock().active
    }

    /// Pick the upstream for a new request, recovering to the primary first
    /// if the cooldown since its last rate limit has elapsed.
    pub fn select_target(&self) -> Upstream {
        self.select_target_at(now_millis())
    }

    pub fn select_target_at(&self, now: DateTime<Utc>) -> Upstream {
        let mut state = self.lock();
        if state.active == Upstream::Backup && self.cooldown_elapsed(&state, now) {
            if let Some(limited_at) = state.primary_rate_limited_at {
                tracing::info!(
                    elapsed_secs = (now - limited_at).num_seconds(),
                    "Primary cooldown expired"
                );
            }
            if self.transition(&mut state, Upstream::Primary, SwitchReason::CooldownExpired, now) {
                self.persist(state);
                return Upstream::Primary;
            }
        }
        state.active
    }

    fn cooldown_elapsed(&self, state: &ProxyState, now: DateTime<Utc>) -> bool {
        let Some(limited_at) = state.primary_rate_limited_at else {
            return true;
        };
        let cooldown_ms = i64::try_from(self.cooldown.as_millis()).unwrap_or(i64::MAX);
        (now - limited_at).num_milliseconds() >= cooldown_ms
    }

    /// Count one dispatch attempt against `upstream`.
    pub fn record_attempt(&self, upstream: Upstream) {
        self.lock().request_count.increment(upstream);
        metrics::record_attempt(upstream);
    }

    /// Report a failed attempt. Returns the upstream to retry against, which
    /// is only ever offered for a first attempt when a backup exists.
    pub fn report_failure(
        &self,
        upstream: Upstream,
        signal: &FailureSignal,
        attempt: Attempt,
    ) -> Option<Upstream> {
        self.report_failure_at(upstream, signal, attempt, now_millis())
    }

    pub fn report_failure_at(
        &self,
        upstream: Upstream,
        signal: &FailureSignal,
        attempt: Attempt,
        now: DateTime<Utc>,
    ) -> Option<Upstream> {
        let mut state = self.lock();

        state.error_count.increment(upstream);
        if let FailureSignal::RateLimited(_) = signal {
            state.mark_rate_limited(upstream, now);
        }
        metrics::record_upstream_error(upstream, signal.kind());

        if attempt.is_retry() || !self.backup_enabled {
            return None;
        }

        if state.active == upstream {
            if self.transition(&mut state, upstream.other(), SwitchReason::from(signal), now) {
                self.persist(state);
            }
        } else {
            tracing::debug!(
                failed = %upstream,
                active = %state.active,
                "Failure from an upstream that is no longer active, not switching"
            );
        }
        Some(upstream.other())
    }

    fn transition(
        &self,
        state: &mut ProxyState,
        to: Upstream,
        reason: SwitchReason,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.backup_enabled || state.active == to {
            return false;
        }

        let from = state.active;
        state.active = to;
        state.last_switch_at = Some(now);

        tracing::warn!(from = %from, to = %to, reason = %reason, at = %now, "Upstream switched");
        metrics::record_switch(to, reason.label());
        metrics::set_active_upstream(to);
        true
    }

    /// Write the current state to disk, e.g. on shutdown.
    pub fn flush(&self) {
        self.persist(self.lock());
    }
}
