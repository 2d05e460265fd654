//! Failover state persistence.
//!
//! # File Format
//! ```json
//! {
//!   "currentBrain": "backup",
//!   "lastSwitchTime": 1718000000000,
//!   "primaryRateLimitedAt": 1718000000000,
//!   "requestCount": { "primary": 10, "backup": 3 },
//!   "errorCount": { "primary": 1, "backup": 0 },
//!   "updatedAt": "2024-06-10T06:13:20.000Z"
//! }
//! ```
//!
//! # Design Decisions
//! - Loading never fails: absent fields, a missing file and a corrupt file
//!   all fall back to defaults
//! - Saving replaces the whole file via a sibling temp file and rename
//! - Timestamps of `0` (written by older deployments) mean "unset"

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::failover::state::{ProxyState, UpstreamCounters};
use crate::upstream::Upstream;

/// Error type for state file operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("state file I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk representation of [`ProxyState`].
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StateDocument {
    current_brain: Option<String>,

    #[serde(
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    last_switch_time: Option<DateTime<Utc>>,

    #[serde(
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    primary_rate_limited_at: Option<DateTime<Utc>>,

    #[serde(
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    backup_rate_limited_at: Option<DateTime<Utc>>,

    request_count: UpstreamCounters,

    error_count: UpstreamCounters,

    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl StateDocument {
    fn from_state(state: &ProxyState, updated_at: DateTime<Utc>) -> Self {
        Self {
            current_brain: Some(state.active.to_string()),
            last_switch_time: state.last_switch_at,
            primary_rate_limited_at: state.primary_rate_limited_at,
            backup_rate_limited_at: state.backup_rate_limited_at,
            request_count: state.request_count,
            error_count: state.error_count,
            updated_at: Some(updated_at),
        }
    }

    fn into_state(self) -> ProxyState {
        let active = match self.current_brain.as_deref().map(str::parse::<Upstream>) {
            Some(Ok(upstream)) => upstream,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Ignoring unknown upstream in state file");
                Upstream::Primary
            }
            None => Upstream::Primary,
        };

        ProxyState {
            active,
            last_switch_at: set_or_none(self.last_switch_time),
            primary_rate_limited_at: set_or_none(self.primary_rate_limited_at),
            backup_rate_limited_at: set_or_none(self.backup_rate_limited_at),
            request_count: self.request_count,
            error_count: self.error_count,
        }
    }
}

fn set_or_none(ts: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    ts.filter(|t| t.timestamp_millis() > 0)
}

/// Reads and writes the failover state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state, falling back to defaults on any problem.
    pub fn load(&self) -> ProxyState {
        match self.try_load() {
            Ok(Some(state)) => {
                tracing::info!(
                    path = %self.path.display(),
                    active = %state.active,
                    "Failover state loaded"
                );
                state
            }
            Ok(None) => {
                tracing::info!(path = %self.path.display(), "No state file, starting on primary");
                ProxyState::default()
            }
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to load state file, starting on primary"
                );
                ProxyState::default()
            }
        }
    }

    /// Load the persisted state. `Ok(None)` if the file does not exist.
    pub fn try_load(&self) -> Result<Option<ProxyState>, PersistError> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let document: StateDocument = serde_json::from_slice(&content)?;
        Ok(Some(document.into_state()))
    }

    /// Persist `state`, logging (never returning) any failure.
    pub fn save(&self, state: &ProxyState) {
        if let Err(e) = self.try_save(state) {
            tracing::error!(path = %self.path.display(), error = %e, "Failed to save state file");
        }
    }

    /// Persist `state` as a full-file replace.
    pub fn try_save(&self, state: &ProxyState) -> Result<(), PersistError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let document = StateDocument::from_state(state, Utc::now());
        let encoded = serde_json::to_vec_pretty(&document)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
