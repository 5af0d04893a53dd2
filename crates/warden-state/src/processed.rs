use std::collections::HashSet;
use std::path::{Path, PathBuf};

use warden_core::WardenError;

use crate::atomic;

/// Agents the orchestrator has already acted on.
///
/// Persisted as a JSON array in insertion order. Ids are never removed, which
/// is what makes processing at-most-once across restarts.
///
/// # Examples
///
/// ```
/// use warden_state::ProcessedSet;
///
/// let dir = tempfile::tempdir().unwrap();
/// let mut set = ProcessedSet::open(dir.path().join("processed-agents.json")).unwrap();
/// assert!(set.insert("bc_1"));
/// assert!(!set.insert("bc_1"));
/// assert!(set.contains("bc_1"));
/// ```
#[derive(Debug)]
pub struct ProcessedSet {
    path: PathBuf,
    order: Vec<String>,
    seen: HashSet<String>,
}

impl ProcessedSet {
    /// Load the set from `path`, empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is not a JSON array of strings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WardenError> {
        let path = path.into();
        let ids: Vec<String> = atomic::read_json(&path)?.unwrap_or_default();

        let mut set = Self {
            path,
            order: Vec::with_capacity(ids.len()),
            seen: HashSet::with_capacity(ids.len()),
        };
        for id in ids {
            if set.seen.insert(id.clone()) {
                set.order.push(id);
            }
        }
        Ok(set)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Record `id`. Returns `true` if it was not already present, in which
    /// case the set is checkpointed to disk.
    pub fn insert(&mut self, id: &str) -> bool {
        if !self.seen.insert(id.to_string()) {
            return false;
        }
        self.order.push(id.to_string());
        if let Err(e) = self.flush() {
            tracing::error!(path = %self.path.display(), agent_id = id, error = %e, "failed to persist processed agents");
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in the order they were first recorded.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// # Errors
    ///
    /// Returns [`WardenError::Persistence`] if the checkpoint cannot be
    /// written.
    pub fn flush(&self) -> Result<(), WardenError> {
        atomic::write_json(&self.path, &self.order)
    }
}
