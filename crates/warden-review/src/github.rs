use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{
    CheckRunUpdate, CommitStatus, CompareFile, GitHubConfig, Issue, NewPullRequest, PullRequest,
    RepoGateway, RepoSlug, Service, WardenError,
};

/// GitHub REST client for branches, check runs, statuses, pull requests,
/// and issues.
///
/// # Examples
///
/// ```no_run
/// use warden_core::GitHubConfig;
/// use warden_review::github::GitHubClient;
///
/// let config = GitHubConfig {
///     token: Some("ghp_xxxx".into()),
///     ..GitHubConfig::default()
/// };
/// let client = GitHubClient::new(&config).unwrap();
/// ```
pub struct GitHubClient {
    octocrab: octocrab::Octocrab,
}

#[derive(Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Deserialize)]
struct CheckRunRef {
    id: u64,
}

#[derive(Deserialize)]
struct Comparison {
    #[serde(default)]
    files: Vec<CompareFile>,
}

#[derive(Serialize)]
struct PullFilter<'a> {
    head: &'a str,
    state: &'a str,
    per_page: u8,
}

impl GitHubClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Config`] if no token is configured or the
    /// client cannot be built.
    pub fn new(config: &GitHubConfig) -> Result<Self, WardenError> {
        let token = config.token.clone().filter(|t| !t.is_empty()).ok_or_else(|| {
            WardenError::Config(
                "GitHub token missing: set github.token or GITHUB_TOKEN".into(),
            )
        })?;

        let mut builder = octocrab::Octocrab::builder().personal_token(token);
        if let Some(base) = config.base_url.as_deref() {
            builder = builder
                .base_uri(base)
                .map_err(|e| WardenError::Config(format!("invalid github.base_url {base}: {e}")))?;
        }
        let octocrab = builder
            .build()
            .map_err(|e| WardenError::Config(format!("failed to create GitHub client: {e}")))?;

        Ok(Self { octocrab })
    }
}

fn github_err(context: &str, e: octocrab::Error) -> WardenError {
    match e {
        octocrab::Error::GitHub { source, .. } => WardenError::api(
            Service::GitHub,
            source.status_code.as_u16(),
            format!("{context}: {}", source.message),
        ),
        other => WardenError::unavailable(Service::GitHub, format!("{context}: {other}")),
    }
}

/// Percent-encode a git ref for a route, keeping `/` between components.
fn encode_ref(r: &str) -> String {
    r.split('/')
        .map(|part| urlencoding::encode(part).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl RepoGateway for GitHubClient {
    async fn get_branch_head_sha(
        &self,
        repo: &RepoSlug,
        branch: &str,
    ) -> Result<String, WardenError> {
        let route = format!(
            "/repos/{}/{}/commits/{}",
            repo.owner,
            repo.repo,
            encode_ref(branch)
        );
        let commit: CommitRef = self
            .octocrab
            .get(route, None::<&()>)
            .await
            .map_err(|e| github_err("failed to resolve branch head", e))?;
        Ok(commit.sha)
    }

    async fn create_check_run(
        &self,
        repo: &RepoSlug,
        name: &str,
        head_sha: &str,
    ) -> Result<u64, WardenError> {
        let route = format!("/repos/{}/{}/check-runs", repo.owner, repo.repo);
        let body = serde_json::json!({
            "name": name,
            "head_sha": head_sha,
            "status": "in_progress",
            "started_at": now(),
        });
        let check: CheckRunRef = self
            .octocrab
            .post(route, Some(&body))
            .await
            .map_err(|e| github_err("failed to create check run", e))?;
        Ok(check.id)
    }

    async fn update_check_run(
        &self,
        repo: &RepoSlug,
        check_run_id: u64,
        update: &CheckRunUpdate,
    ) -> Result<(), WardenError> {
        let route = format!(
            "/repos/{}/{}/check-runs/{check_run_id}",
            repo.owner, repo.repo
        );
        let body = serde_json::json!({
            "status": "completed",
            "conclusion": update.conclusion,
            "completed_at": now(),
            "output": {
                "title": update.title,
                "summary": update.summary,
                "text": update.text,
            },
        });
        let _response: serde_json::Value = self
            .octocrab
            .patch(route, Some(&body))
            .await
            .map_err(|e| github_err("failed to update check run", e))?;
        Ok(())
    }

    async fn set_commit_status(
        &self,
        repo: &RepoSlug,
        sha: &str,
        status: &CommitStatus,
    ) -> Result<(), WardenError> {
        let route = format!(
            "/repos/{}/{}/statuses/{}",
            repo.owner,
            repo.repo,
            urlencoding::encode(sha)
        );
        let body = serde_json::json!({
            "state": status.state,
            "context": status.context,
            "description": status.description,
        });
        let _response: serde_json::Value = self
            .octocrab
            .post(route, Some(&body))
            .await
            .map_err(|e| github_err("failed to set commit status", e))?;
        Ok(())
    }

    async fn get_compare_files(
        &self,
        repo: &RepoSlug,
        base: &str,
        head: &str,
    ) -> Result<Vec<CompareFile>, WardenError> {
        if base == head {
            return Ok(Vec::new());
        }
        let route = format!(
            "/repos/{}/{}/compare/{}...{}",
            repo.owner,
            repo.repo,
            encode_ref(base),
            encode_ref(head)
        );
        let comparison: Comparison = self
            .octocrab
            .get(route, None::<&()>)
            .await
            .map_err(|e| github_err("failed to compare branches", e))?;
        Ok(comparison.files)
    }

    async fn create_pr(
        &self,
        repo: &RepoSlug,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, WardenError> {
        let route = format!("/repos/{}/{}/pulls", repo.owner, repo.repo);
        let body = serde_json::json!({
            "head": pr.head,
            "base": pr.base,
            "title": pr.title,
            "body": pr.body,
            "draft": false,
        });
        self.octocrab
            .post(route, Some(&body))
            .await
            .map_err(|e| github_err("failed to create pull request", e))
    }

    async fn find_open_pr_for_branch(
        &self,
        repo: &RepoSlug,
        branch: &str,
    ) -> Result<Option<PullRequest>, WardenError> {
        let route = format!("/repos/{}/{}/pulls", repo.owner, repo.repo);
        let head = format!("{}:{branch}", repo.owner);
        let filter = PullFilter {
            head: &head,
            state: "open",
            per_page: 1,
        };
        let pulls: Vec<PullRequest> = self
            .octocrab
            .get(route, Some(&filter))
            .await
            .map_err(|e| github_err("failed to list pull requests", e))?;
        Ok(pulls.into_iter().next())
    }

    async fn merge_pr(&self, repo: &RepoSlug, number: u64) -> Result<(), WardenError> {
        let route = format!("/repos/{}/{}/pulls/{number}/merge", repo.owner, repo.repo);
        let body = serde_json::json!({ "merge_method": "merge" });
        let _response: serde_json::Value = self
            .octocrab
            .put(route, Some(&body))
            .await
            .map_err(|e| github_err("failed to merge pull request", e))?;
        Ok(())
    }

    async fn create_issue(
        &self,
        repo: &RepoSlug,
        title: &str,
        body: &str,
    ) -> Result<Issue, WardenError> {
        let route = format!("/repos/{}/{}/issues", repo.owner, repo.repo);
        let payload = serde_json::json!({ "title": title, "body": body });
        self.octocrab
            .post(route, Some(&payload))
            .await
            .map_err(|e| github_err("failed to create issue", e))
    }

    async fn create_pr_comment(
        &self,
        repo: &RepoSlug,
        number: u64,
        body: &str,
    ) -> Result<(), WardenError> {
        let route = format!(
            "/repos/{}/{}/issues/{number}/comments",
            repo.owner, repo.repo
        );
        let payload = serde_json::json!({ "body": body });
        let _response: serde_json::Value = self
            .octocrab
            .post(route, Some(&payload))
            .await
            .map_err(|e| github_err("failed to comment on pull request", e))?;
        Ok(())
    }
}
