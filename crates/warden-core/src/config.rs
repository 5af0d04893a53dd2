use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WardenError;

/// Top-level configuration loaded from `.warden.toml`.
///
/// Supports layered resolution: CLI flags > local config > env vars (for
/// secrets) > defaults.
///
/// # Examples
///
/// ```
/// use warden_core::WardenConfig;
///
/// let config = WardenConfig::default();
/// assert_eq!(config.orchestrator.max_review_iterations, 3);
/// assert!(config.review.safe_mode);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Polling loop and decision policy.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Review pipeline toggles.
    #[serde(default)]
    pub review: ReviewConfig,
    /// Commands run against a checkout of the agent's branch.
    #[serde(default)]
    pub checks: ChecksConfig,
    /// LLM reviewer settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Coding-agent API settings.
    #[serde(default)]
    pub agents: AgentsConfig,
    /// GitHub settings.
    #[serde(default)]
    pub github: GitHubConfig,
}

impl WardenConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Io`] if the file cannot be read, or
    /// [`WardenError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use warden_core::WardenConfig;
    /// use std::path::Path;
    ///
    /// let config = WardenConfig::from_file(Path::new(".warden.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, WardenError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use warden_core::WardenConfig;
    ///
    /// let toml = r#"
    /// [orchestrator]
    /// max_review_iterations = 5
    /// "#;
    /// let config = WardenConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.orchestrator.max_review_iterations, 5);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, WardenError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Fill unset secrets from `CURSOR_API_KEY`, `GITHUB_TOKEN` (or
    /// `GH_TOKEN`), and `XAI_API_KEY`.
    pub fn with_env_secrets(mut self) -> Self {
        self.apply_secrets(|name| std::env::var(name).ok());
        self
    }

    fn apply_secrets(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.agents.api_key.is_none() {
            self.agents.api_key = lookup("CURSOR_API_KEY");
        }
        if self.github.token.is_none() {
            self.github.token = lookup("GITHUB_TOKEN").or_else(|| lookup("GH_TOKEN"));
        }
        if self.llm.api_key.is_none() {
            self.llm.api_key = lookup("XAI_API_KEY");
        }
    }

    /// Reject values the orchestrator cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Config`] naming the offending key.
    pub fn validate(&self) -> Result<(), WardenError> {
        if self.orchestrator.max_review_iterations < 1 {
            return Err(WardenError::Config(
                "orchestrator.max_review_iterations must be at least 1".into(),
            ));
        }
        if self.orchestrator.poll_interval_ms == 0 {
            return Err(WardenError::Config(
                "orchestrator.poll_interval_ms must be greater than 0".into(),
            ));
        }
        if self.orchestrator.page_size == 0 {
            return Err(WardenError::Config(
                "orchestrator.page_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Polling loop and decision policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Delay between the end of one tick and the start of the next (default: 15000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Revision rounds allowed before acceptance is forced (default: 3).
    #[serde(default = "default_max_review_iterations")]
    pub max_review_iterations: usize,
    /// Agents requested per listing page (default: 50).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Upper bound on listing pages per tick (default: 20).
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Directory for chain and processed-agent state and log files (default: `logs`).
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Merge the pull request once the review approves it (default: false).
    #[serde(default)]
    pub auto_merge_on_approval: bool,
    /// Open an issue instead of a followup when the branch has no changes (default: false).
    #[serde(default)]
    pub issue_on_empty_diff: bool,
}

fn default_poll_interval_ms() -> u64 {
    15_000
}

fn default_max_review_iterations() -> usize {
    3
}

fn default_page_size() -> usize {
    50
}

fn default_max_pages() -> usize {
    20
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Path of the chain ledger.
    pub fn chains_path(&self) -> PathBuf {
        self.state_dir.join("agent-chains.json")
    }

    /// Path of the processed-agent set.
    pub fn processed_path(&self) -> PathBuf {
        self.state_dir.join("processed-agents.json")
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_review_iterations: default_max_review_iterations(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            state_dir: default_state_dir(),
            auto_merge_on_approval: false,
            issue_on_empty_diff: false,
        }
    }
}

/// Review pipeline toggles.
///
/// # Examples
///
/// ```
/// use warden_core::ReviewConfig;
///
/// let config = ReviewConfig::default();
/// assert!(config.safe_mode);
/// assert!(config.checks_enabled);
/// assert!(config.comments_enabled);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Never clone or execute agent code; all checks count as failed (default: true).
    #[serde(default = "default_true")]
    pub safe_mode: bool,
    /// Publish a check run or commit status for each review (default: true).
    #[serde(default = "default_true")]
    pub checks_enabled: bool,
    /// Comment the verdict on the pull request (default: true).
    #[serde(default = "default_true")]
    pub comments_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            safe_mode: true,
            checks_enabled: true,
            comments_enabled: true,
        }
    }
}

/// Commands run against a checkout of the agent's branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksConfig {
    /// File that must exist in the checkout for checks to run (default: `package.json`).
    #[serde(default = "default_marker_file")]
    pub marker_file: Option<String>,
    /// Build commands, run in order (default: `npm install`, `npm run build`).
    #[serde(default = "default_build")]
    pub build: Vec<String>,
    /// Test commands (default: `npm test`).
    #[serde(default = "default_test")]
    pub test: Vec<String>,
    /// Lint commands (default: `npm run lint`).
    #[serde(default = "default_lint")]
    pub lint: Vec<String>,
    /// Timeout per step in seconds (default: 600).
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
}

fn default_marker_file() -> Option<String> {
    Some("package.json".into())
}

fn default_build() -> Vec<String> {
    vec!["npm install".into(), "npm run build".into()]
}

fn default_test() -> Vec<String> {
    vec!["npm test".into()]
}

fn default_lint() -> Vec<String> {
    vec!["npm run lint".into()]
}

fn default_step_timeout_secs() -> u64 {
    600
}

impl ChecksConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            marker_file: default_marker_file(),
            build: default_build(),
            test: default_test(),
            lint: default_lint(),
            step_timeout_secs: default_step_timeout_secs(),
        }
    }
}

/// LLM reviewer configuration.
///
/// # Examples
///
/// ```
/// use warden_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "grok-4");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests (default: `https://api.x.ai`).
    pub base_url: Option<String>,
    /// Request timeout in seconds (default: 20).
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "grok-4".into()
}

fn default_llm_timeout_secs() -> u64 {
    20
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

/// Coding-agent API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Bearer token for the agent API.
    pub api_key: Option<String>,
    /// Base URL (default: `https://api.cursor.com/v0`).
    pub base_url: Option<String>,
    /// Model used for launched agents (default: `grok-code-fast-1`).
    #[serde(default = "default_agent_model")]
    pub model: String,
    /// Fixed branch for every launched agent instead of a generated one.
    pub target_branch: Option<String>,
    /// Webhook the agent API should notify.
    pub webhook_url: Option<String>,
    /// Secret sent along with the webhook URL.
    pub webhook_secret: Option<String>,
    /// Request timeout in seconds (default: 15).
    #[serde(default = "default_agents_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_agent_model() -> String {
    "grok-code-fast-1".into()
}

fn default_agents_timeout_secs() -> u64 {
    15
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: default_agent_model(),
            target_branch: None,
            webhook_url: None,
            webhook_secret: None,
            timeout_secs: default_agents_timeout_secs(),
        }
    }
}

/// GitHub configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Token with `repo` scope; `checks:write` enables check runs.
    pub token: Option<String>,
    /// API base URL for GitHub Enterprise (default: `https://api.github.com`).
    pub base_url: Option<String>,
}
