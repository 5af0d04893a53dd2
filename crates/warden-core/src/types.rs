use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WardenError;

/// Lifecycle status of a coding agent as reported by the agent API.
///
/// # Examples
///
/// ```
/// use warden_core::AgentStatus;
///
/// let status: AgentStatus = serde_json::from_str("\"FINISHED\"").unwrap();
/// assert!(status.is_terminal());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Creating,
    Running,
    Finished,
    Error,
    Expired,
    /// A status this version does not know about.
    #[serde(other)]
    Unknown,
}

impl AgentStatus {
    /// `FINISHED` and `ERROR` are final; the agent will not change again on
    /// its own.
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentStatus::Finished | AgentStatus::Error)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Creating => "CREATING",
            AgentStatus::Running => "RUNNING",
            AgentStatus::Finished => "FINISHED",
            AgentStatus::Error => "ERROR",
            AgentStatus::Expired => "EXPIRED",
            AgentStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Where an agent started from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSource {
    /// Repository URL, e.g. `https://github.com/owner/repo`.
    pub repository: String,
    /// Git ref the agent branched from.
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
}

/// Where an agent pushes its work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTarget {
    pub branch_name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub auto_create_pr: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
}

/// A coding agent.
///
/// # Examples
///
/// ```
/// use warden_core::{Agent, AgentStatus};
///
/// let json = r#"{
///     "id": "bc_123",
///     "name": "fix login",
///     "status": "RUNNING",
///     "source": { "repository": "https://github.com/acme/app", "ref": "main" },
///     "target": { "branchName": "cursor/fix-login" },
///     "createdAt": "2025-01-01T00:00:00Z"
/// }"#;
/// let agent: Agent = serde_json::from_str(json).unwrap();
/// assert_eq!(agent.status, AgentStatus::Running);
/// assert_eq!(agent.branch(), "cursor/fix-login");
/// assert_eq!(agent.base_ref(), "main");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: AgentStatus,
    pub source: AgentSource,
    pub target: AgentTarget,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Agent {
    /// Branch the agent pushes to.
    pub fn branch(&self) -> &str {
        &self.target.branch_name
    }

    /// Base ref for reviews and pull requests, `main` when unset.
    pub fn base_ref(&self) -> &str {
        match self.source.git_ref.as_deref() {
            Some(r) if !r.is_empty() => r,
            _ => "main",
        }
    }
}

/// One page of [`Agent`]s.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPage {
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Parameters for launching an agent with the configured defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub prompt_text: String,
    pub repository: String,
    /// Ref to start from, `main` when unset.
    pub git_ref: Option<String>,
    /// Prefix for the generated branch name.
    pub branch_slug: Option<String>,
}

/// Acknowledgement of a followup message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowupAck {
    pub id: String,
}

/// `owner/repo` pair on GitHub.
///
/// # Examples
///
/// ```
/// use warden_core::RepoSlug;
///
/// let slug = RepoSlug::parse("https://github.com/rust-lang/rust.git").unwrap();
/// assert_eq!(slug.owner, "rust-lang");
/// assert_eq!(slug.repo, "rust");
/// assert_eq!(slug.to_string(), "rust-lang/rust");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    pub owner: String,
    pub repo: String,
}

impl RepoSlug {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Extract `owner/repo` from anything containing `github.com/<owner>/<repo>`.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::InvalidRepository`] if the URL does not name a
    /// GitHub repository.
    pub fn parse(url: &str) -> Result<Self, WardenError> {
        let invalid = || WardenError::InvalidRepository(url.to_string());

        let lower = url.to_ascii_lowercase();
        let idx = lower.find("github.com").ok_or_else(invalid)?;
        let rest = &url[idx + "github.com".len()..];
        let rest = rest.strip_prefix(['/', ':']).unwrap_or(rest);

        let mut parts = rest.split('/');
        let owner = parts.next().unwrap_or_default();
        let repo = parts.next().unwrap_or_default();
        let repo = repo.split(['#', '?']).next().unwrap_or_default();
        let repo = repo.strip_suffix(".git").unwrap_or(repo);

        if owner.is_empty() || repo.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(owner, repo))
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoSlug {
    type Err = WardenError;

    /// Accepts both `owner/repo` and full GitHub URLs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains("github.com") {
            return Self::parse(s);
        }
        match s.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok(Self::new(owner, repo))
            }
            _ => Err(WardenError::InvalidRepository(s.to_string())),
        }
    }
}

/// A file entry from a branch comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareFile {
    pub filename: String,
    /// `added`, `modified`, `removed`, `renamed`, ...
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub changes: u64,
}

impl CompareFile {
    pub fn is_removed(&self) -> bool {
        self.status == "removed"
    }
}

/// An open or newly created pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}

/// Parameters for opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

/// A newly created issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub html_url: String,
}

/// Final conclusion of a check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
    Success,
    Failure,
    Neutral,
    ActionRequired,
}

/// Completion payload for a check run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRunUpdate {
    pub conclusion: CheckConclusion,
    pub title: String,
    pub summary: String,
    pub text: String,
}

/// State of a commit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Success,
    Failure,
}

/// A commit status, the fallback when check runs are not permitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitStatus {
    pub state: CommitState,
    pub context: String,
    pub description: String,
}

/// How bad the reviewer thinks the problems are.
///
/// # Examples
///
/// ```
/// use warden_core::Severity;
///
/// let s: Severity = "HIGH".parse().unwrap();
/// assert_eq!(s, Severity::High);
/// assert_eq!(s.to_string(), "high");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Structured answer from the AI reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewFinding {
    pub has_critical_issues: bool,
    pub feedback: String,
    #[serde(default)]
    pub severity: Severity,
}

/// Pass/fail of the automated build, test, and lint steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcomes {
    pub build: bool,
    pub tests: bool,
    pub lint: bool,
}

impl CheckOutcomes {
    /// All checks failed or were skipped.
    pub const NONE: CheckOutcomes = CheckOutcomes {
        build: false,
        tests: false,
        lint: false,
    };
}

/// Outcome of one pass of the review pipeline.
///
/// # Examples
///
/// ```
/// use warden_core::{CheckOutcomes, Severity, Verdict};
///
/// let verdict = Verdict {
///     approved: false,
///     feedback: "build is red".into(),
///     severity: Severity::High,
///     checks: CheckOutcomes::NONE,
///     files_changed: 2,
/// };
/// assert!(!verdict.approved);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub approved: bool,
    pub feedback: String,
    pub severity: Severity,
    pub checks: CheckOutcomes,
    /// Files in the diff that were not removed.
    pub files_changed: usize,
}

/// Output format for CLI results.
///
/// # Examples
///
/// ```
/// use warden_core::OutputFormat;
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// GitHub-flavored Markdown.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
