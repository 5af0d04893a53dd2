//! Revision lineage of agents.
//!
//! A [`Chain`] is keyed by the agent that started it and records one
//! [`Iteration`] per agent that worked on the task. Every agent id belongs to
//! at most one chain, and [`ChainStore`] keeps an in-memory index from any
//! participant id to its chain key.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use warden_core::WardenError;

use crate::atomic;

/// Review status of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    Pending,
    Reviewing,
    Approved,
    NeedsRevision,
}

impl fmt::Display for IterationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IterationStatus::Pending => "pending",
            IterationStatus::Reviewing => "reviewing",
            IterationStatus::Approved => "approved",
            IterationStatus::NeedsRevision => "needs_revision",
        };
        f.write_str(s)
    }
}

/// One agent's attempt within a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    pub agent_id: String,
    pub branch: String,
    pub status: IterationStatus,
    /// Reviewer feedback that triggered this iteration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// RFC 3339 UTC.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_run_id: Option<u64>,
}

impl Iteration {
    fn new(agent_id: &str, branch: &str, feedback: Option<String>) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            branch: branch.to_string(),
            status: IterationStatus::Pending,
            feedback,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            check_run_id: None,
        }
    }
}

/// Full revision history of one task.
///
/// # Examples
///
/// ```
/// use warden_state::Chain;
///
/// let json = r#"{
///     "originalAgentId": "bc_1",
///     "currentAgentId": "bc_2",
///     "iterations": [
///         { "agentId": "bc_1", "branch": "feat/a", "status": "needs_revision",
///           "timestamp": "2025-01-01T00:00:00.000Z" },
///         { "agentId": "bc_2", "branch": "feat/a-2", "status": "pending",
///           "feedback": "add tests", "timestamp": "2025-01-01T01:00:00.000Z" }
///     ]
/// }"#;
/// let chain: Chain = serde_json::from_str(json).unwrap();
/// assert_eq!(chain.iteration_count(), 2);
/// assert!(chain.contains("bc_2"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    /// Agent that started the chain. Never changes.
    #[serde(rename = "originalAgentId")]
    pub original_id: String,
    /// Agent of the latest iteration.
    #[serde(rename = "currentAgentId")]
    pub current_id: String,
    pub iterations: Vec<Iteration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_pr_url: Option<String>,
}

impl Chain {
    pub fn iteration_count(&self) -> usize {
        self.iterations.len()
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.original_id == agent_id || self.iterations.iter().any(|i| i.agent_id == agent_id)
    }

    pub fn iteration(&self, agent_id: &str) -> Option<&Iteration> {
        self.iterations.iter().find(|i| i.agent_id == agent_id)
    }

    fn iteration_mut(&mut self, agent_id: &str) -> Option<&mut Iteration> {
        self.iterations.iter_mut().find(|i| i.agent_id == agent_id)
    }
}

/// Persistent map of chains plus an identity index.
///
/// Mutations checkpoint the whole map to disk. A failed checkpoint is logged
/// and the in-memory state is kept; call [`ChainStore::flush`] to surface the
/// error.
#[derive(Debug)]
pub struct ChainStore {
    path: PathBuf,
    chains: BTreeMap<String, Chain>,
    index: HashMap<String, String>,
}

impl ChainStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WardenError> {
        let path = path.into();
        let chains = atomic::read_json(&path)?.unwrap_or_default();
        Ok(Self::from_chains(path, chains))
    }

    /// Like [`ChainStore::open`], but falls back to `legacy` when `path` does
    /// not exist. Subsequent writes always go to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if whichever file is chosen cannot be read or parsed.
    pub fn open_with_legacy(
        path: impl Into<PathBuf>,
        legacy: impl AsRef<Path>,
    ) -> Result<Self, WardenError> {
        let path = path.into();
        let chains = match atomic::read_json(&path)? {
            Some(chains) => chains,
            None => {
                let legacy = legacy.as_ref();
                match atomic::read_json(legacy)? {
                    Some(chains) => {
                        tracing::info!(
                            from = %legacy.display(),
                            to = %path.display(),
                            "loaded legacy chain state, next write migrates it"
                        );
                        chains
                    }
                    None => BTreeMap::new(),
                }
            }
        };
        Ok(Self::from_chains(path, chains))
    }

    fn from_chains(path: PathBuf, chains: BTreeMap<String, Chain>) -> Self {
        let mut store = Self {
            path,
            chains,
            index: HashMap::new(),
        };
        store.rebuild_index();
        store
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (key, chain) in &self.chains {
            self.index.insert(chain.original_id.clone(), key.clone());
            for iteration in &chain.iterations {
                self.index.insert(iteration.agent_id.clone(), key.clone());
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Number of agent ids the index resolves.
    pub fn indexed_ids(&self) -> usize {
        self.index.len()
    }

    /// Start a chain with a single pending iteration for `agent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::DuplicateChain`] if `agent_id` already keys a
    /// chain or participates in one.
    pub fn create_chain(&mut self, agent_id: &str, branch: &str) -> Result<&Chain, WardenError> {
        if self.chains.contains_key(agent_id) || self.locate(agent_id).is_some() {
            return Err(WardenError::DuplicateChain(agent_id.to_string()));
        }

        let chain = Chain {
            original_id: agent_id.to_string(),
            current_id: agent_id.to_string(),
            iterations: vec![Iteration::new(agent_id, branch, None)],
            final_pr_url: None,
        };
        self.chains.insert(agent_id.to_string(), chain);
        self.index.insert(agent_id.to_string(), agent_id.to_string());
        self.persist();
        tracing::debug!(chain = agent_id, branch, "created chain");

        self.chains
            .get(agent_id)
            .ok_or_else(|| WardenError::ChainNotFound(agent_id.to_string()))
    }

    /// Append an iteration for `new_agent_id` to the chain keyed by
    /// `original_id` and make it current.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::ChainNotFound`] if `original_id` is not a chain
    /// key, or [`WardenError::DuplicateAgent`] if `new_agent_id` already
    /// participates in a chain. The store is unchanged in both cases.
    pub fn add_iteration(
        &mut self,
        original_id: &str,
        new_agent_id: &str,
        branch: &str,
        feedback: &str,
    ) -> Result<&Chain, WardenError> {
        if !self.chains.contains_key(original_id) {
            return Err(WardenError::ChainNotFound(original_id.to_string()));
        }
        if self.locate(new_agent_id).is_some() {
            return Err(WardenError::DuplicateAgent(new_agent_id.to_string()));
        }

        let chain = self
            .chains
            .get_mut(original_id)
            .ok_or_else(|| WardenError::ChainNotFound(original_id.to_string()))?;
        chain
            .iterations
            .push(Iteration::new(new_agent_id, branch, Some(feedback.to_string())));
        chain.current_id = new_agent_id.to_string();
        let iterations = chain.iterations.len();

        self.index
            .insert(new_agent_id.to_string(), original_id.to_string());
        self.persist();
        tracing::debug!(
            chain = original_id,
            agent_id = new_agent_id,
            branch,
            iterations,
            "added iteration"
        );

        self.chains
            .get(original_id)
            .ok_or_else(|| WardenError::ChainNotFound(original_id.to_string()))
    }

    /// Chain containing `agent_id`, whether as the original or a later
    /// iteration.
    pub fn get_chain(&mut self, agent_id: &str) -> Option<&Chain> {
        let key = self.locate(agent_id)?;
        self.chains.get(&key)
    }

    /// Resolve `agent_id` to its chain key, repairing the index by a full
    /// scan when it has no entry.
    fn locate(&mut self, agent_id: &str) -> Option<String> {
        if let Some(key) = self.index.get(agent_id) {
            if self.chains.contains_key(key) {
                return Some(key.clone());
            }
        }

        let key = self
            .chains
            .iter()
            .find(|(_, chain)| chain.contains(agent_id))
            .map(|(key, _)| key.clone())?;
        tracing::debug!(agent_id, chain = %key, "repaired chain index");
        self.index.insert(agent_id.to_string(), key.clone());
        Some(key)
    }

    fn chain_mut(&mut self, agent_id: &str) -> Option<&mut Chain> {
        let key = self.locate(agent_id)?;
        self.chains.get_mut(&key)
    }

    /// Mark `agent_id`'s iteration approved and record the pull request.
    /// Returns `false` if the agent is in no chain.
    pub fn approve_agent(&mut self, agent_id: &str, pr_url: &str) -> bool {
        let Some(chain) = self.chain_mut(agent_id) else {
            return false;
        };
        let Some(iteration) = chain.iteration_mut(agent_id) else {
            return false;
        };
        iteration.status = IterationStatus::Approved;
        chain.final_pr_url = Some(pr_url.to_string());
        self.persist();
        true
    }

    pub fn set_final_pr_url(&mut self, agent_id: &str, pr_url: &str) -> bool {
        let Some(chain) = self.chain_mut(agent_id) else {
            return false;
        };
        chain.final_pr_url = Some(pr_url.to_string());
        self.persist();
        true
    }

    pub fn set_check_run_id(&mut self, agent_id: &str, check_run_id: u64) -> bool {
        let updated = self
            .chain_mut(agent_id)
            .and_then(|chain| chain.iteration_mut(agent_id))
            .map(|iteration| iteration.check_run_id = Some(check_run_id))
            .is_some();
        if updated {
            self.persist();
        }
        updated
    }

    pub fn get_check_run_id(&mut self, agent_id: &str) -> Option<u64> {
        self.get_chain(agent_id)?
            .iteration(agent_id)?
            .check_run_id
    }

    pub fn set_iteration_status(&mut self, agent_id: &str, status: IterationStatus) -> bool {
        let updated = self
            .chain_mut(agent_id)
            .and_then(|chain| chain.iteration_mut(agent_id))
            .map(|iteration| iteration.status = status)
            .is_some();
        if updated {
            self.persist();
        }
        updated
    }

    /// Snapshot of every chain, ordered by key.
    pub fn get_all_chains(&self) -> Vec<Chain> {
        self.chains.values().cloned().collect()
    }

    /// Write the current state to disk.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Persistence`] if the checkpoint cannot be
    /// written.
    pub fn flush(&self) -> Result<(), WardenError> {
        atomic::write_json(&self.path, &self.chains)
    }

    fn persist(&self) {
        if let Err(e) = self.flush() {
            tracing::error!(path = %self.path.display(), error = %e, "failed to persist chain state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ChainStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path().join("agent-chains.json")).unwrap();
        (dir, store)
    }

    fn assert_current_is_last(store: &ChainStore) {
        for chain in store.get_all_chains() {
            let last = chain.iterations.last().unwrap();
            assert_eq!(chain.current_id, last.agent_id);
        }
    }

    #[test]
    fn create_chain_starts_pending() {
        let (_dir, mut store) = store();
        let chain = store.create_chain("bc_1", "feat/login").unwrap();
        assert_eq!(chain.original_id, "bc_1");
        assert_eq!(chain.current_id, "bc_1");
        assert_eq!(chain.iterations.len(), 1);
        assert_eq!(chain.iterations[0].status, IterationStatus::Pending);
        assert!(chain.iterations[0].feedback.is_none());
        assert!(chain.final_pr_url.is_none());
        assert_current_is_last(&store);
    }

    #[test]
    fn create_chain_rejects_existing_key() {
        let (_dir, mut store) = store();
        store.create_chain("bc_1", "feat/a").unwrap();
        let err = store.create_chain("bc_1", "feat/b").unwrap_err();
        assert!(matches!(err, WardenError::DuplicateChain(id) if id == "bc_1"));
        assert_eq!(store.get_chain("bc_1").unwrap().iterations[0].branch, "feat/a");
    }

    #[test]
    fn create_chain_rejects_participant() {
        let (_dir, mut store) = store();
        store.create_chain("bc_1", "feat/a").unwrap();
        store.add_iteration("bc_1", "bc_2", "feat/a-2", "fix it").unwrap();
        let err = store.create_chain("bc_2", "feat/a-2").unwrap_err();
        assert!(matches!(err, WardenError::DuplicateChain(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn add_iteration_moves_current() {
        let (_dir, mut store) = store();
        store.create_chain("bc_1", "feat/a").unwrap();
        let chain = store
            .add_iteration("bc_1", "bc_2", "feat/a-2", "missing tests")
            .unwrap();
        assert_eq!(chain.current_id, "bc_2");
        assert_eq!(chain.original_id, "bc_1");
        assert_eq!(chain.iterations.len(), 2);
        assert_eq!(chain.iterations[1].feedback.as_deref(), Some("missing tests"));
        assert_eq!(chain.iterations[1].status, IterationStatus::Pending);
        assert_current_is_last(&store);
    }

    #[test]
    fn get_chain_resolves_every_participant() {
        let (_dir, mut store) = store();
        store.create_chain("bc_1", "feat/a").unwrap();
        store.add_iteration("bc_1", "bc_2", "feat/a", "again").unwrap();
        store.add_iteration("bc_1", "bc_3", "feat/a", "again").unwrap();

        let first = store.get_chain("bc_1").unwrap().clone();
        assert_eq!(store.get_chain("bc_2").unwrap(), &first);
        assert_eq!(store.get_chain("bc_3").unwrap(), &first);
        assert!(store.get_chain("bc_4").is_none());
    }

    #[test]
    fn add_iteration_unknown_chain_leaves_store_unchanged() {
        let (_dir, mut store) = store();
        store.create_chain("bc_1", "feat/a").unwrap();
        let before = store.get_all_chains();

        let err = store
            .add_iteration("bc_missing", "bc_2", "feat/b", "x")
            .unwrap_err();
        assert!(matches!(err, WardenError::ChainNotFound(id) if id == "bc_missing"));
        assert_eq!(store.get_all_chains(), before);
        assert!(store.get_chain("bc_2").is_none());
    }

    #[test]
    fn add_iteration_by_participant_id_is_not_a_key() {
        let (_dir, mut store) = store();
        store.create_chain("bc_1", "feat/a").unwrap();
        store.add_iteration("bc_1", "bc_2", "feat/a", "x").unwrap();
        let err = store.add_iteration("bc_2", "bc_3", "feat/a", "x").unwrap_err();
        assert!(matches!(err, WardenError::ChainNotFound(_)));
    }

    #[test]
    fn add_iteration_rejects_known_agent() {
        let (_dir, mut store) = store();
        store.create_chain("bc_1", "feat/a").unwrap();
        store.create_chain("bc_9", "feat/z").unwrap();
        let err = store.add_iteration("bc_1", "bc_9", "feat/a", "x").unwrap_err();
        assert!(matches!(err, WardenError::DuplicateAgent(id) if id == "bc_9"));
        assert_eq!(store.get_chain("bc_1").unwrap().iterations.len(), 1);
    }

    #[test]
    fn approve_agent_sets_status_and_url() {
        let (_dir, mut store) = store();
        store.create_chain("bc_1", "feat/a").unwrap();
        store.add_iteration("bc_1", "bc_2", "feat/a", "x").unwrap();

        assert!(store.approve_agent("bc_2", "https://github.com/acme/app/pull/7"));
        let chain = store.get_chain("bc_1").unwrap();
        assert_eq!(chain.iterations[1].status, IterationStatus::Approved);
        assert_eq!(chain.iterations[0].status, IterationStatus::Pending);
        assert_eq!(
            chain.final_pr_url.as_deref(),
            Some("https://github.com/acme/app/pull/7")
        );
    }

    #[test]
    fn approve_unknown_agent_is_noop() {
        let (_dir, mut store) = store();
        assert!(!store.approve_agent("bc_nobody", "url"));
        assert!(store.is_empty());
    }

    #[test]
    fn check_run_id_round_trip() {
        let (_dir, mut store) = store();
        store.create_chain("bc_1", "feat/a").unwrap();
        assert_eq!(store.get_check_run_id("bc_1"), None);
        assert!(store.set_check_run_id("bc_1", 4242));
        assert_eq!(store.get_check_run_id("bc_1"), Some(4242));
        assert!(!store.set_check_run_id("bc_x", 1));
    }

    #[test]
    fn set_iteration_status_targets_one_iteration() {
        let (_dir, mut store) = store();
        store.create_chain("bc_1", "feat/a").unwrap();
        store.add_iteration("bc_1", "bc_2", "feat/a", "x").unwrap();
        assert!(store.set_iteration_status("bc_1", IterationStatus::NeedsRevision));
        assert!(store.set_iteration_status("bc_2", IterationStatus::Reviewing));

        let chain = store.get_chain("bc_2").unwrap();
        assert_eq!(chain.iterations[0].status, IterationStatus::NeedsRevision);
        assert_eq!(chain.iterations[1].status, IterationStatus::Reviewing);
    }

    #[test]
    fn set_final_pr_url_without_approval() {
        let (_dir, mut store) = store();
        store.create_chain("bc_1", "feat/a").unwrap();
        assert!(store.set_final_pr_url("bc_1", "https://github.com/acme/app/pull/1"));
        let chain = store.get_chain("bc_1").unwrap();
        assert_eq!(chain.iterations[0].status, IterationStatus::Pending);
        assert!(chain.final_pr_url.is_some());
    }

    #[test]
    fn missing_index_entry_is_repaired_by_scan() {
        let (_dir, mut store) = store();
        store.create_chain("bc_1", "feat/a").unwrap();
        store.add_iteration("bc_1", "bc_2", "feat/a", "x").unwrap();
        store.index.remove("bc_2");

        let chain = store.get_chain("bc_2").unwrap();
        assert_eq!(chain.original_id, "bc_1");
        assert_eq!(store.index.get("bc_2").map(String::as_str), Some("bc_1"));
    }

    #[test]
    fn every_mutation_is_on_disk() {
        let (dir, mut store) = store();
        store.create_chain("bc_1", "feat/a").unwrap();
        store.set_check_run_id("bc_1", 9);

        let reopened = ChainStore::open(dir.path().join("agent-chains.json")).unwrap();
        assert_eq!(reopened.get_all_chains(), store.get_all_chains());
    }

    #[test]
    fn persisted_json_uses_camel_case_names() {
        let (dir, mut store) = store();
        store.create_chain("bc_1", "feat/a").unwrap();
        store.set_check_run_id("bc_1", 5);
        store.approve_agent("bc_1", "https://github.com/acme/app/pull/2");

        let raw = std::fs::read_to_string(dir.path().join("agent-chains.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let chain = &value["bc_1"];
        assert_eq!(chain["originalAgentId"], "bc_1");
        assert_eq!(chain["currentAgentId"], "bc_1");
        assert_eq!(chain["finalPrUrl"], "https://github.com/acme/app/pull/2");
        assert_eq!(chain["iterations"][0]["agentId"], "bc_1");
        assert_eq!(chain["iterations"][0]["checkRunId"], 5);
        assert_eq!(chain["iterations"][0]["status"], "approved");
    }

    #[test]
    fn write_failure_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes every rename fail.
        let path = dir.path().join("agent-chains.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("blocker"), "x").unwrap();
        let mut store = ChainStore {
            path: path.clone(),
            chains: BTreeMap::new(),
            index: HashMap::new(),
        };

        store.create_chain("bc_1", "feat/a").unwrap();
        assert!(store.get_chain("bc_1").is_some());
        assert!(matches!(
            store.flush(),
            Err(WardenError::Persistence { .. })
        ));
    }
}
