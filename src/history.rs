//! Durable sent-image history.
//!
//! Tracks which pool images have already been delivered so the selector
//! never repeats one. The full set is persisted to a JSON record after
//! every mutation using a temp-file → fsync → rename sequence, so a crash
//! mid-write never leaves a torn record on disk.

use crate::error::{DripError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persisted record shape.
#[derive(Debug, Serialize)]
struct HistoryRecord<'a> {
    images: Vec<&'a str>,
    last_updated: DateTime<Utc>,
    total_count: usize,
}

/// On-disk formats accepted on load. Early deployments stored a bare list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredHistory {
    Record { images: Vec<String> },
    Bare(Vec<String>),
}

/// Set of image ids that have been delivered, backed by a JSON file.
///
/// The store is the only writer of its backing file. When a persist fails
/// the in-memory set stays authoritative for the rest of the process run;
/// the next successful write reconciles the file.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    sent: HashSet<String>,
}

/// Summary of the history state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStats {
    /// Number of images recorded as sent.
    pub total_sent: usize,
    /// Backing file location.
    pub path: PathBuf,
}

impl HistoryStore {
    /// Open a history store backed by `path`, loading any existing record.
    ///
    /// A missing, unreadable, or unparseable file loads as an empty
    /// history; the store must stay usable even when the record is
    /// damaged.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sent = Self::load(&path);
        Self { path, sent }
    }

    fn load(path: &Path) -> HashSet<String> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("history file not found, starting empty");
                return HashSet::new();
            }
            Err(e) => {
                warn!("cannot read history file {}: {e}", path.display());
                return HashSet::new();
            }
        };

        match serde_json::from_slice::<StoredHistory>(&bytes) {
            Ok(StoredHistory::Record { images } | StoredHistory::Bare(images)) => {
                let sent: HashSet<String> = images.into_iter().collect();
                info!("loaded history of {} sent images", sent.len());
                sent
            }
            Err(e) => {
                warn!(
                    "cannot parse history file {}: {e}; starting empty",
                    path.display()
                );
                HashSet::new()
            }
        }
    }

    /// Persist the full set (temp file → fsync → rename).
    fn persist(&self) -> Result<()> {
        let mut images: Vec<&str> = self.sent.iter().map(String::as_str).collect();
        images.sort_unstable();
        let record = HistoryRecord {
            images,
            last_updated: Utc::now(),
            total_count: self.sent.len(),
        };
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| DripError::History(format!("cannot serialize history: {e}")))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DripError::History(format!(
                    "cannot create history dir '{}': {e}",
                    parent.display()
                ))
            })?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = std::fs::File::create(&tmp_path).map_err(|e| {
            DripError::History(format!(
                "cannot create temp file '{}': {e}",
                tmp_path.display()
            ))
        })?;
        file.write_all(json.as_bytes())
            .map_err(|e| DripError::History(format!("cannot write temp file: {e}")))?;
        file.sync_all()
            .map_err(|e| DripError::History(format!("cannot sync temp file: {e}")))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            DripError::History(format!(
                "cannot rename '{}' to '{}': {e}",
                tmp_path.display(),
                self.path.display()
            ))
        })?;

        debug!("history saved ({} images)", self.sent.len());
        Ok(())
    }

    /// Returns `true` if `id` has been delivered before.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.sent.contains(id)
    }

    /// Record `id` as delivered and persist the updated set.
    ///
    /// The id stays in the in-memory set even when persistence fails.
    pub fn add(&mut self, id: impl Into<String>) -> Result<()> {
        self.sent.insert(id.into());
        self.persist()
    }

    /// Remove `id` from the history. Returns whether it was present.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        if !self.sent.remove(id) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Clear the history. Returns the number of entries cleared.
    pub fn reset(&mut self) -> Result<usize> {
        let cleared = self.sent.len();
        self.sent.clear();
        self.persist()?;
        info!("history reset, cleared {cleared} entries");
        Ok(cleared)
    }

    /// Number of sent images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sent.len()
    }

    /// Whether nothing has been sent yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }

    /// Summary for the stats command.
    #[must_use]
    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            total_sent: self.sent.len(),
            path: self.path.clone(),
        }
    }
}
