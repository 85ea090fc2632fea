//! Transfer state persistence
//!
//! The state file records which Mastodon statuses were already transferred,
//! plus where each one landed on Bluesky so later replies can be threaded
//! under it. It is rewritten after every successful post, so an interrupted
//! run can be resumed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::bluesky::PostedThread;

/// Default state file name, relative to the working directory
pub const DEFAULT_STATE_FILE: &str = ".mastodon-to-bluesky-state.json";

/// Error type for state file operations
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Could not read state file {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Could not parse state file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferState {
    #[serde(default)]
    pub last_mastodon_id: Option<String>,
    #[serde(default)]
    pub transferred_ids: BTreeSet<String>,
    #[serde(default = "Utc::now", deserialize_with = "deserialize_timestamp")]
    pub last_updated: DateTime<Utc>,
    /// Bluesky thread of every transferred status, keyed by Mastodon id
    #[serde(default)]
    pub threads: BTreeMap<String, PostedThread>,
}

impl Default for TransferState {
    fn default() -> Self {
        Self {
            last_mastodon_id: None,
            transferred_ids: BTreeSet::new(),
            last_updated: Utc::now(),
            threads: BTreeMap::new(),
        }
    }
}

/// Accepts RFC 3339 timestamps as well as naive ISO timestamps (read as UTC)
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// Whether the status was already transferred
pub fn is_transferred(state: &TransferState, mastodon_id: &str) -> bool {
    state.transferred_ids.contains(mastodon_id)
}

/// Record a successful transfer
pub fn record_transfer(
    state: &mut TransferState,
    mastodon_id: &str,
    thread: Option<PostedThread>,
    now: DateTime<Utc>,
) {
    state.transferred_ids.insert(mastodon_id.to_string());
    state.last_mastodon_id = Some(mastodon_id.to_string());
    state.last_updated = now;

    if let Some(thread) = thread {
        state.threads.insert(mastodon_id.to_string(), thread);
    }
}

/// Load the state file
///
/// A missing file yields a fresh state.
pub fn load_state(path: &Path) -> Result<TransferState, StateError> {
    if !path.exists() {
        return Ok(TransferState::default());
    }

    let contents = fs::read_to_string(path).map_err(|e| StateError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    serde_json::from_str(&contents).map_err(|e| StateError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Save the state file
///
/// Written to a sibling temporary file first and renamed into place, so an
/// interrupted write never leaves a truncated state file behind.
pub fn save_state(path: &Path, state: &TransferState) -> Result<(), StateError> {
    let io_error = |e: std::io::Error| StateError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let json = serde_json::to_string_pretty(state).map_err(|e| StateError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, json).map_err(io_error)?;
    fs::rename(&tmp_path, path).map_err(io_error)?;

    Ok(())
}
