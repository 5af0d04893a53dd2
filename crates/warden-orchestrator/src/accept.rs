use warden_core::{NewPullRequest, PullRequest, RepoGateway, RepoSlug, Verdict, WardenError};

use crate::prompts;

/// What happened when a change was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Acceptance {
    pub pr: PullRequest,
    pub created: bool,
    pub merged: bool,
}

pub(crate) struct AcceptPolicy {
    pub comments_enabled: bool,
    pub auto_merge: bool,
}

/// Make sure a pull request exists for `branch`, comment the verdict, and
/// merge when policy and verdict allow it.
///
/// Only finding or creating the pull request can fail; commenting and
/// merging are best effort.
pub(crate) async fn accept(
    repo: &dyn RepoGateway,
    slug: &RepoSlug,
    agent_id: &str,
    branch: &str,
    base: &str,
    verdict: &Verdict,
    policy: &AcceptPolicy,
) -> Result<Acceptance, WardenError> {
    let (pr, created) = match repo.find_open_pr_for_branch(slug, branch).await? {
        Some(pr) => {
            tracing::info!(agent_id, branch, pr = pr.number, "reusing open pull request");
            (pr, false)
        }
        None => {
            let new_pr = NewPullRequest {
                head: branch.to_string(),
                base: base.to_string(),
                title: prompts::pr_title(branch, verdict.approved),
                body: prompts::pr_body(agent_id, branch, verdict),
            };
            let pr = repo.create_pr(slug, &new_pr).await?;
            tracing::info!(agent_id, branch, pr = pr.number, url = %pr.html_url, "created pull request");
            (pr, true)
        }
    };

    if policy.comments_enabled {
        let body = prompts::verdict_comment(agent_id, branch, verdict);
        if let Err(e) = repo.create_pr_comment(slug, pr.number, &body).await {
            tracing::warn!(agent_id, pr = pr.number, error = %e, "failed to comment on pull request");
        }
    }

    let mut merged = false;
    if policy.auto_merge && verdict.checks.build && verdict.approved {
        match repo.merge_pr(slug, pr.number).await {
            Ok(()) => {
                tracing::info!(agent_id, pr = pr.number, "merged pull request");
                merged = true;
            }
            Err(e) => tracing::warn!(agent_id, pr = pr.number, error = %e, "failed to merge pull request"),
        }
    }

    Ok(Acceptance {
        pr,
        created,
        merged,
    })
}
