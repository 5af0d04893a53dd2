//! Seams between the review engine and the services it talks to.
//!
//! Concrete clients live in `warden-agents` and `warden-review`; tests swap in
//! in-memory fakes.

use async_trait::async_trait;

use crate::error::WardenError;
use crate::types::{
    Agent, AgentPage, CheckOutcomes, CheckRunUpdate, CommitStatus, CompareFile, FollowupAck,
    Issue, LaunchRequest, NewPullRequest, PullRequest, RepoSlug, ReviewFinding,
};

/// The coding-agent API.
#[async_trait]
pub trait AgentGateway: Send + Sync {
    /// One page of agents, newest first. Pass the previous page's
    /// `next_cursor` to continue.
    async fn list_agents(&self, limit: usize, cursor: Option<&str>)
        -> Result<AgentPage, WardenError>;

    async fn get_agent(&self, id: &str) -> Result<Agent, WardenError>;

    /// Launch an agent with the configured model, branch naming, and
    /// auto-created pull request.
    async fn launch_agent_with_defaults(&self, req: LaunchRequest)
        -> Result<Agent, WardenError>;

    /// Ask an existing agent to keep working on its branch.
    async fn send_followup(&self, id: &str, text: &str) -> Result<FollowupAck, WardenError>;
}

/// The source-control host.
#[async_trait]
pub trait RepoGateway: Send + Sync {
    async fn get_branch_head_sha(&self, repo: &RepoSlug, branch: &str)
        -> Result<String, WardenError>;

    /// Create an in-progress check run on `head_sha`, returning its id.
    async fn create_check_run(
        &self,
        repo: &RepoSlug,
        name: &str,
        head_sha: &str,
    ) -> Result<u64, WardenError>;

    async fn update_check_run(
        &self,
        repo: &RepoSlug,
        check_run_id: u64,
        update: &CheckRunUpdate,
    ) -> Result<(), WardenError>;

    async fn set_commit_status(
        &self,
        repo: &RepoSlug,
        sha: &str,
        status: &CommitStatus,
    ) -> Result<(), WardenError>;

    /// Files changed between `base` and `head`.
    async fn get_compare_files(
        &self,
        repo: &RepoSlug,
        base: &str,
        head: &str,
    ) -> Result<Vec<CompareFile>, WardenError>;

    async fn create_pr(&self, repo: &RepoSlug, pr: &NewPullRequest)
        -> Result<PullRequest, WardenError>;

    async fn find_open_pr_for_branch(
        &self,
        repo: &RepoSlug,
        branch: &str,
    ) -> Result<Option<PullRequest>, WardenError>;

    async fn merge_pr(&self, repo: &RepoSlug, number: u64) -> Result<(), WardenError>;

    async fn create_issue(
        &self,
        repo: &RepoSlug,
        title: &str,
        body: &str,
    ) -> Result<Issue, WardenError>;

    async fn create_pr_comment(
        &self,
        repo: &RepoSlug,
        number: u64,
        body: &str,
    ) -> Result<(), WardenError>;
}

/// The AI reviewer.
#[async_trait]
pub trait ReviewerGateway: Send + Sync {
    /// Submit a review prompt and parse the structured answer.
    ///
    /// # Errors
    ///
    /// Transport and HTTP failures, and answers that do not parse into a
    /// [`ReviewFinding`], are errors. They must never be read as a verdict.
    async fn review_diff(&self, prompt: &str) -> Result<ReviewFinding, WardenError>;
}

/// Runs build, test, and lint steps against a branch.
#[async_trait]
pub trait CheckRunner: Send + Sync {
    /// Run all checks for `branch` of `repo`.
    ///
    /// Failing steps are reported as `false`; only an inability to run
    /// anything at all is an error.
    async fn run_checks(&self, repo: &RepoSlug, branch: &str)
        -> Result<CheckOutcomes, WardenError>;
}

#[async_trait]
impl<T: AgentGateway + ?Sized> AgentGateway for std::sync::Arc<T> {
    async fn list_agents(
        &self,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<AgentPage, WardenError> {
        (**self).list_agents(limit, cursor).await
    }

    async fn get_agent(&self, id: &str) -> Result<Agent, WardenError> {
        (**self).get_agent(id).await
    }

    async fn launch_agent_with_defaults(
        &self,
        req: LaunchRequest,
    ) -> Result<Agent, WardenError> {
        (**self).launch_agent_with_defaults(req).await
    }

    async fn send_followup(&self, id: &str, text: &str) -> Result<FollowupAck, WardenError> {
        (**self).send_followup(id, text).await
    }
}
