//! Check-run reporting with a commit-status fallback.
//!
//! Check runs need a token with `checks:write`. When GitHub answers 401/403
//! the report is downgraded to a commit status on the branch head. Failures
//! here are logged and never affect the review decision.

use warden_core::{
    CheckConclusion, CheckRunUpdate, CommitState, CommitStatus, RepoGateway, RepoSlug, Verdict,
    WardenError,
};
use warden_state::ChainStore;

use crate::prompts;

/// Name of the check run and commit-status context for an agent.
///
/// # Examples
///
/// ```
/// assert_eq!(warden_orchestrator::check_name("bc_42"), "Cursor Agent: bc_42");
/// ```
pub fn check_name(agent_id: &str) -> String {
    format!("Cursor Agent: {agent_id}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Channel {
    /// Reporting is turned off.
    Disabled,
    CheckRun(u64),
    CommitStatus,
}

/// An in-flight status report for one agent's review.
#[derive(Debug)]
pub(crate) struct StatusReport {
    channel: Channel,
    name: String,
    head_sha: Option<String>,
}

impl StatusReport {
    pub(crate) fn disabled(agent_id: &str) -> Self {
        Self {
            channel: Channel::Disabled,
            name: check_name(agent_id),
            head_sha: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn check_run_id(&self) -> Option<u64> {
        match self.channel {
            Channel::CheckRun(id) => Some(id),
            _ => None,
        }
    }

    /// Open an in-progress check run on the branch head, or a pending commit
    /// status if check runs are not permitted.
    pub(crate) async fn begin(
        repo: &dyn RepoGateway,
        slug: &RepoSlug,
        agent_id: &str,
        branch: &str,
        chains: &mut ChainStore,
    ) -> Self {
        let name = check_name(agent_id);
        let head_sha = match repo.get_branch_head_sha(slug, branch).await {
            Ok(sha) => sha,
            Err(e) => {
                tracing::warn!(agent_id, branch, error = %e, "failed to resolve branch head, status will be retried on finish");
                return Self {
                    channel: Channel::CommitStatus,
                    name,
                    head_sha: None,
                };
            }
        };

        let channel = match repo.create_check_run(slug, &name, &head_sha).await {
            Ok(id) => {
                chains.set_check_run_id(agent_id, id);
                tracing::debug!(agent_id, check_run = id, "created check run");
                Channel::CheckRun(id)
            }
            Err(e) if e.is_authorization() => {
                tracing::info!(agent_id, "check runs not permitted, using commit status");
                let pending = CommitStatus {
                    state: CommitState::Pending,
                    context: name.clone(),
                    description: "Agent review in progress".into(),
                };
                if let Err(e) = repo.set_commit_status(slug, &head_sha, &pending).await {
                    tracing::warn!(agent_id, error = %e, "failed to set pending commit status");
                }
                Channel::CommitStatus
            }
            Err(e) => {
                tracing::warn!(agent_id, error = %e, "failed to create check run");
                Channel::CommitStatus
            }
        };

        Self {
            channel,
            name,
            head_sha: Some(head_sha),
        }
    }

    /// Complete the report with the review outcome.
    pub(crate) async fn finish(
        &self,
        repo: &dyn RepoGateway,
        slug: &RepoSlug,
        branch: &str,
        verdict: &Verdict,
    ) {
        let status = if verdict.approved {
            CommitStatus {
                state: CommitState::Success,
                context: self.name.clone(),
                description: "Agent passed".into(),
            }
        } else {
            CommitStatus {
                state: CommitState::Failure,
                context: self.name.clone(),
                description: "Agent needs changes".into(),
            }
        };
        self.complete(repo, slug, branch, check_run_update(verdict), status)
            .await;
    }

    /// Close the report when no verdict could be produced, so the check does
    /// not stay in progress.
    pub(crate) async fn abort(
        &self,
        repo: &dyn RepoGateway,
        slug: &RepoSlug,
        branch: &str,
        reason: &str,
    ) {
        let update = CheckRunUpdate {
            conclusion: CheckConclusion::Neutral,
            title: "Agent review could not run".into(),
            summary: "The review pipeline failed before reaching a decision.".into(),
            text: reason.to_string(),
        };
        let status = CommitStatus {
            state: CommitState::Failure,
            context: self.name.clone(),
            description: "Agent review failed to run".into(),
        };
        self.complete(repo, slug, branch, update, status).await;
    }

    async fn complete(
        &self,
        repo: &dyn RepoGateway,
        slug: &RepoSlug,
        branch: &str,
        update: CheckRunUpdate,
        status: CommitStatus,
    ) {
        let result = match self.channel {
            Channel::Disabled => return,
            Channel::CheckRun(id) => match repo.update_check_run(slug, id, &update).await {
                Err(e) if e.is_authorization() => {
                    tracing::info!(check_run = id, "check run update not permitted, using commit status");
                    self.set_commit_status(repo, slug, branch, &status).await
                }
                other => other,
            },
            Channel::CommitStatus => self.set_commit_status(repo, slug, branch, &status).await,
        };

        if let Err(e) = result {
            tracing::warn!(check = %self.name, error = %e, "failed to report review status");
        }
    }

    async fn set_commit_status(
        &self,
        repo: &dyn RepoGateway,
        slug: &RepoSlug,
        branch: &str,
        status: &CommitStatus,
    ) -> Result<(), WardenError> {
        let sha = match &self.head_sha {
            Some(sha) => sha.clone(),
            None => repo.get_branch_head_sha(slug, branch).await?,
        };
        repo.set_commit_status(slug, &sha, status).await
    }
}

fn check_run_update(verdict: &Verdict) -> CheckRunUpdate {
    let mut text = prompts::checks_summary(&verdict.checks);
    if !verdict.feedback.is_empty() {
        text.push_str("\n\n");
        text.push_str(&verdict.feedback);
    }

    if verdict.approved {
        CheckRunUpdate {
            conclusion: CheckConclusion::Success,
            title: "Agent review passed".into(),
            summary: "All automated checks passed.".into(),
            text,
        }
    } else {
        CheckRunUpdate {
            conclusion: CheckConclusion::ActionRequired,
            title: "Agent review requires changes".into(),
            summary: format!("See feedback (severity: {}).", verdict.severity),
            text,
        }
    }
}
