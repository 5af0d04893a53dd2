use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use warden_core::{
    Agent, AgentGateway, AgentPage, AgentSource, AgentStatus, AgentTarget, CheckConclusion, CheckOutcomes,
    CheckRunUpdate, CheckRunner, CommitState, CommitStatus, CompareFile, FollowupAck, Issue,
    LaunchRequest, NewPullRequest, PullRequest, RepoGateway, RepoSlug, ReviewFinding,
    ReviewerGateway, Service, Severity, WardenConfig, WardenError,
};
use warden_orchestrator::{AgentOutcome, Orchestrator};
use warden_review::ReviewPipeline;
use warden_state::{ChainStore, IterationStatus, ProcessedSet};

const REPO_URL: &str = "https://github.com/acme/app";

fn agent(id: &str, status: AgentStatus, branch: &str) -> Agent {
    Agent {
        id: id.into(),
        name: format!("task {id}"),
        status,
        source: AgentSource {
            repository: REPO_URL.into(),
            git_ref: Some("main".into()),
        },
        target: AgentTarget {
            branch_name: branch.into(),
            url: None,
            auto_create_pr: true,
            pr_url: None,
        },
        created_at: None,
    }
}

#[derive(Clone, Copy)]
enum FollowupReply {
    Accept,
    Reject,
    Unauthorized,
    Unreachable,
}

/// Agent API fake. Launched agents show up in later listings as finished.
struct FakeAgents {
    agents: Mutex<Vec<Agent>>,
    page_size_seen: Mutex<Vec<(usize, Option<String>)>>,
    pages: Option<Vec<AgentPage>>,
    list_fails: bool,
    followup: FollowupReply,
    launch_fails: bool,
    followups: Mutex<Vec<(String, String)>>,
    launches: Mutex<Vec<LaunchRequest>>,
    calls: AtomicUsize,
}

impl FakeAgents {
    fn new(agents: Vec<Agent>) -> Self {
        Self {
            agents: Mutex::new(agents),
            page_size_seen: Mutex::new(Vec::new()),
            pages: None,
            list_fails: false,
            followup: FollowupReply::Accept,
            launch_fails: false,
            followups: Mutex::new(Vec::new()),
            launches: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    fn with_followup(mut self, reply: FollowupReply) -> Self {
        self.followup = reply;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentGateway for FakeAgents {
    async fn list_agents(&self, limit: usize, cursor: Option<&str>) -> Result<AgentPage, WardenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.page_size_seen
            .lock()
            .unwrap()
            .push((limit, cursor.map(String::from)));
        if self.list_fails {
            return Err(WardenError::unavailable(Service::Agents, "connection refused"));
        }
        if let Some(pages) = &self.pages {
            let idx = cursor.map_or(0, |c| c.parse::<usize>().unwrap());
            return Ok(pages[idx].clone());
        }
        Ok(AgentPage {
            agents: self.agents.lock().unwrap().clone(),
            next_cursor: None,
        })
    }

    async fn get_agent(&self, id: &str) -> Result<Agent, WardenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.agents
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| WardenError::api(Service::Agents, 404, "not found"))
    }

    async fn launch_agent_with_defaults(&self, req: LaunchRequest) -> Result<Agent, WardenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.launch_fails {
            return Err(WardenError::api(Service::Agents, 422, "repository not accessible"));
        }
        let mut launches = self.launches.lock().unwrap();
        let id = format!("bc_rev{}", launches.len() + 1);
        let branch = format!("{}-{}", req.branch_slug.clone().unwrap_or_default(), launches.len() + 1);
        launches.push(req);
        let launched = agent(&id, AgentStatus::Finished, &branch);
        self.agents.lock().unwrap().push(launched.clone());
        Ok(launched)
    }

    async fn send_followup(&self, id: &str, text: &str) -> Result<FollowupAck, WardenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.followups
            .lock()
            .unwrap()
            .push((id.to_string(), text.to_string()));
        match self.followup {
            FollowupReply::Accept => Ok(FollowupAck { id: id.into() }),
            FollowupReply::Reject => Err(WardenError::api(Service::Agents, 409, "agent is finished")),
            FollowupReply::Unauthorized => Err(WardenError::api(Service::Agents, 401, "bad key")),
            FollowupReply::Unreachable => Err(WardenError::unavailable(Service::Agents, "timed out")),
        }
    }
}

/// GitHub fake that records every call.
#[derive(Default)]
struct FakeRepo {
    files: Vec<CompareFile>,
    open_pr: Option<PullRequest>,
    check_runs_forbidden: bool,
    calls: Mutex<Vec<String>>,
    created_prs: Mutex<Vec<NewPullRequest>>,
    statuses: Mutex<Vec<CommitStatus>>,
    updates: Mutex<Vec<CheckRunUpdate>>,
    comments: Mutex<Vec<String>>,
    merged: Mutex<Vec<u64>>,
    issues: Mutex<Vec<String>>,
}

impl FakeRepo {
    fn with_changes() -> Self {
        Self {
            files: vec![CompareFile {
                filename: "src/login.ts".into(),
                status: "modified".into(),
                additions: 10,
                deletions: 2,
                changes: 12,
            }],
            ..Self::default()
        }
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepoGateway for FakeRepo {
    async fn get_branch_head_sha(&self, _: &RepoSlug, branch: &str) -> Result<String, WardenError> {
        self.record("head");
        Ok(format!("sha-{branch}"))
    }

    async fn create_check_run(&self, _: &RepoSlug, _: &str, _: &str) -> Result<u64, WardenError> {
        self.record("create_check_run");
        if self.check_runs_forbidden {
            return Err(WardenError::api(Service::GitHub, 403, "Resource not accessible by integration"));
        }
        Ok(77)
    }

    async fn update_check_run(&self, _: &RepoSlug, _: u64, update: &CheckRunUpdate) -> Result<(), WardenError> {
        self.record("update_check_run");
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }

    async fn set_commit_status(&self, _: &RepoSlug, _: &str, status: &CommitStatus) -> Result<(), WardenError> {
        self.record("set_commit_status");
        self.statuses.lock().unwrap().push(status.clone());
        Ok(())
    }

    async fn get_compare_files(&self, _: &RepoSlug, _: &str, _: &str) -> Result<Vec<CompareFile>, WardenError> {
        self.record("compare");
        Ok(self.files.clone())
    }

    async fn create_pr(&self, _: &RepoSlug, pr: &NewPullRequest) -> Result<PullRequest, WardenError> {
        self.record("create_pr");
        let mut created = self.created_prs.lock().unwrap();
        created.push(pr.clone());
        let number = 100 + created.len() as u64;
        Ok(PullRequest {
            number,
            html_url: format!("https://github.com/acme/app/pull/{number}"),
        })
    }

    async fn find_open_pr_for_branch(&self, _: &RepoSlug, _: &str) -> Result<Option<PullRequest>, WardenError> {
        self.record("find_pr");
        Ok(self.open_pr.clone())
    }

    async fn merge_pr(&self, _: &RepoSlug, number: u64) -> Result<(), WardenError> {
        self.record("merge_pr");
        self.merged.lock().unwrap().push(number);
        Ok(())
    }

    async fn create_issue(&self, _: &RepoSlug, title: &str, _: &str) -> Result<Issue, WardenError> {
        self.record("create_issue");
        self.issues.lock().unwrap().push(title.to_string());
        Ok(Issue {
            number: 5,
            html_url: "https://github.com/acme/app/issues/5".into(),
        })
    }

    async fn create_pr_comment(&self, _: &RepoSlug, _: u64, body: &str) -> Result<(), WardenError> {
        self.record("comment");
        self.comments.lock().unwrap().push(body.to_string());
        Ok(())
    }
}

struct FakeReviewer {
    critical: Mutex<VecDeque<bool>>,
    fallback: bool,
    outages: AtomicUsize,
}

impl FakeReviewer {
    fn always(critical: bool) -> Self {
        Self {
            critical: Mutex::new(VecDeque::new()),
            fallback: critical,
            outages: AtomicUsize::new(0),
        }
    }

    /// Unavailable for the first `n` reviews, then answers with `critical`.
    fn down_for(n: usize, critical: bool) -> Self {
        Self {
            outages: AtomicUsize::new(n),
            ..Self::always(critical)
        }
    }
}

#[async_trait]
impl ReviewerGateway for FakeReviewer {
    async fn review_diff(&self, _: &str) -> Result<ReviewFinding, WardenError> {
        let down = self
            .outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if down {
            return Err(WardenError::unavailable(Service::Reviewer, "down"));
        }
        let critical = self.critical.lock().unwrap().pop_front().unwrap_or(self.fallback);
        Ok(ReviewFinding {
            has_critical_issues: critical,
            feedback: if critical {
                "missing input validation".into()
            } else {
                "looks good".into()
            },
            severity: if critical { Severity::High } else { Severity::Low },
        })
    }
}

struct FakeChecks(CheckOutcomes);

#[async_trait]
impl CheckRunner for FakeChecks {
    async fn run_checks(&self, _: &RepoSlug, _: &str) -> Result<CheckOutcomes, WardenError> {
        Ok(self.0)
    }
}

const GREEN: CheckOutcomes = CheckOutcomes {
    build: true,
    tests: true,
    lint: true,
};

const RED: CheckOutcomes = CheckOutcomes {
    build: false,
    tests: false,
    lint: false,
};

struct Harness {
    dir: TempDir,
    agents: Arc<FakeAgents>,
    repo: Arc<FakeRepo>,
    orchestrator: Orchestrator,
}

fn config() -> WardenConfig {
    let mut config = WardenConfig::default();
    config.review.safe_mode = false;
    config
}

fn harness(
    agents: FakeAgents,
    repo: FakeRepo,
    reviewer: FakeReviewer,
    checks: CheckOutcomes,
    config: WardenConfig,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let agents = Arc::new(agents);
    let repo = Arc::new(repo);
    let pipeline = ReviewPipeline::new(
        repo.clone(),
        Arc::new(reviewer),
        Arc::new(FakeChecks(checks)),
        config.review.safe_mode,
    );
    let chains = ChainStore::open(dir.path().join("agent-chains.json")).unwrap();
    let processed = ProcessedSet::open(dir.path().join("processed-agents.json")).unwrap();
    let orchestrator = Orchestrator::new(agents.clone(), repo.clone(), pipeline, chains, processed, &config);
    Harness {
        dir,
        agents,
        repo,
        orchestrator,
    }
}

#[tokio::test]
async fn approved_agent_gets_pull_request() {
    let mut h = harness(
        FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")]),
        FakeRepo::with_changes(),
        FakeReviewer::always(false),
        GREEN,
        config(),
    );

    let report = h.orchestrator.tick().await.unwrap();
    assert_eq!(report.listed, 1);
    assert_eq!(
        report.outcomes,
        vec![(
            "bc_1".to_string(),
            AgentOutcome::Accepted {
                pr_url: "https://github.com/acme/app/pull/101".into(),
                forced: false,
                merged: false,
            }
        )]
    );

    let created = h.repo.created_prs.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].head, "feat/login");
    assert_eq!(created[0].base, "main");
    assert!(created[0].title.starts_with("✅ Auto-approved"));
    assert!(h.repo.comments.lock().unwrap()[0].starts_with("AI Review verdict: create the PR!"));
    assert!(h.repo.merged.lock().unwrap().is_empty());

    let chain = h.orchestrator.chains().get_all_chains().remove(0);
    assert_eq!(chain.original_id, "bc_1");
    assert_eq!(chain.final_pr_url.as_deref(), Some("https://github.com/acme/app/pull/101"));
    assert_eq!(chain.iterations[0].status, IterationStatus::Approved);
    assert_eq!(chain.iterations[0].check_run_id, Some(77));
    assert!(h.orchestrator.processed().contains("bc_1"));
}

#[tokio::test]
async fn open_pull_request_is_reused() {
    let repo = FakeRepo {
        open_pr: Some(PullRequest {
            number: 9,
            html_url: "https://github.com/acme/app/pull/9".into(),
        }),
        ..FakeRepo::with_changes()
    };
    let mut h = harness(
        FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")]),
        repo,
        FakeReviewer::always(false),
        GREEN,
        config(),
    );

    let report = h.orchestrator.tick().await.unwrap();
    assert!(matches!(
        &report.outcomes[0].1,
        AgentOutcome::Accepted { pr_url, .. } if pr_url.ends_with("/pull/9")
    ));
    assert!(h.repo.created_prs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn processed_agents_are_not_touched_again() {
    let mut h = harness(
        FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")]),
        FakeRepo::with_changes(),
        FakeReviewer::always(false),
        GREEN,
        config(),
    );

    h.orchestrator.tick().await.unwrap();
    let repo_calls = h.repo.calls().len();
    let agent_calls = h.agents.calls();

    let report = h.orchestrator.tick().await.unwrap();
    assert_eq!(report.already_processed, 1);
    assert!(report.outcomes.is_empty());
    assert_eq!(h.repo.calls().len(), repo_calls);
    // Only the listing call.
    assert_eq!(h.agents.calls(), agent_calls + 1);
}

#[tokio::test]
async fn running_and_errored_agents_are_left_alone() {
    let mut h = harness(
        FakeAgents::new(vec![
            agent("bc_run", AgentStatus::Running, "feat/a"),
            agent("bc_err", AgentStatus::Error, "feat/b"),
        ]),
        FakeRepo::with_changes(),
        FakeReviewer::always(false),
        GREEN,
        config(),
    );

    let report = h.orchestrator.tick().await.unwrap();
    assert_eq!(report.running, 1);
    assert!(report.outcomes.is_empty());
    assert!(h.orchestrator.processed().is_empty());
    assert!(h.repo.calls().is_empty());
}

#[tokio::test]
async fn failing_build_sends_followup() {
    let mut h = harness(
        FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")]),
        FakeRepo::with_changes(),
        FakeReviewer::always(false),
        RED,
        config(),
    );

    let report = h.orchestrator.tick().await.unwrap();
    assert_eq!(report.outcomes[0].1, AgentOutcome::FollowedUp);

    let followups = h.agents.followups.lock().unwrap().clone();
    assert_eq!(followups.len(), 1);
    assert_eq!(followups[0].0, "bc_1");
    assert!(followups[0].1.contains("looks good"));
    assert!(h.repo.created_prs.lock().unwrap().is_empty());

    let update = h.repo.updates.lock().unwrap()[0].clone();
    assert_eq!(update.title, "Agent review requires changes");

    let chain = h.orchestrator.chains().get_all_chains().remove(0);
    assert_eq!(chain.iterations[0].status, IterationStatus::NeedsRevision);
}

#[tokio::test]
async fn rejected_followup_relaunches_from_branch() {
    let mut h = harness(
        FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")]).with_followup(FollowupReply::Reject),
        FakeRepo::with_changes(),
        FakeReviewer::always(true),
        GREEN,
        config(),
    );

    let report = h.orchestrator.tick().await.unwrap();
    assert_eq!(
        report.outcomes[0].1,
        AgentOutcome::Relaunched {
            new_agent_id: "bc_rev1".into()
        }
    );

    let launch = h.agents.launches.lock().unwrap()[0].clone();
    assert_eq!(launch.repository, REPO_URL);
    assert_eq!(launch.git_ref.as_deref(), Some("feat/login"));
    assert_eq!(launch.branch_slug.as_deref(), Some("feat/login-review"));
    assert!(launch.prompt_text.contains("branch: feat/login"));
    assert!(launch.prompt_text.contains("missing input validation"));

    let chain = h.orchestrator.chains().get_all_chains().remove(0);
    assert_eq!(chain.original_id, "bc_1");
    assert_eq!(chain.current_id, "bc_rev1");
    assert_eq!(chain.iterations.len(), 2);
    assert_eq!(chain.iterations[1].branch, "feat/login-review-1");
    assert_eq!(chain.iterations[1].feedback.as_deref(), Some("missing input validation"));
}

#[tokio::test]
async fn followup_timeout_does_not_relaunch() {
    let mut h = harness(
        FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")])
            .with_followup(FollowupReply::Unreachable),
        FakeRepo::with_changes(),
        FakeReviewer::always(true),
        GREEN,
        config(),
    );

    let report = h.orchestrator.tick().await.unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].1.contains("timed out"));
    assert!(h.agents.launches.lock().unwrap().is_empty());

    let chain = h.orchestrator.chains().get_all_chains().remove(0);
    assert_eq!(chain.iterations.len(), 1);
    assert_eq!(chain.iterations[0].status, IterationStatus::NeedsRevision);
}

#[tokio::test]
async fn unauthorized_followup_does_not_relaunch() {
    let mut h = harness(
        FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")])
            .with_followup(FollowupReply::Unauthorized),
        FakeRepo::with_changes(),
        FakeReviewer::always(true),
        GREEN,
        config(),
    );

    let report = h.orchestrator.tick().await.unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].1.contains("401"));
    assert!(h.agents.launches.lock().unwrap().is_empty());

    let chain = h.orchestrator.chains().get_all_chains().remove(0);
    assert_eq!(chain.iterations.len(), 1);
    assert_eq!(chain.current_id, "bc_1");
}

#[tokio::test]
async fn failed_relaunch_is_reported_and_chain_unchanged() {
    let mut agents = FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")])
        .with_followup(FollowupReply::Reject);
    agents.launch_fails = true;
    let mut h = harness(agents, FakeRepo::with_changes(), FakeReviewer::always(true), GREEN, config());

    let report = h.orchestrator.tick().await.unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].1.contains("422"));
    assert!(h.orchestrator.processed().contains("bc_1"));

    let chain = h.orchestrator.chains().get_all_chains().remove(0);
    assert_eq!(chain.iterations.len(), 1);
    assert_eq!(chain.current_id, "bc_1");
}

#[tokio::test]
async fn revision_cap_forces_acceptance() {
    let mut config = config();
    config.orchestrator.auto_merge_on_approval = true;
    let mut h = harness(
        FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")]).with_followup(FollowupReply::Reject),
        FakeRepo::with_changes(),
        FakeReviewer::always(true),
        GREEN,
        config,
    );

    for expected in ["bc_rev1", "bc_rev2", "bc_rev3"] {
        let report = h.orchestrator.tick().await.unwrap();
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(
            report.outcomes[0].1,
            AgentOutcome::Relaunched {
                new_agent_id: expected.into()
            }
        );
    }

    let report = h.orchestrator.tick().await.unwrap();
    assert_eq!(report.outcomes[0].0, "bc_rev3");
    assert!(matches!(
        report.outcomes[0].1,
        AgentOutcome::Accepted {
            forced: true,
            merged: false,
            ..
        }
    ));

    let created = h.repo.created_prs.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert!(created[0].title.contains("Review limit reached"));
    assert!(h.repo.merged.lock().unwrap().is_empty());

    let chains = h.orchestrator.chains().get_all_chains();
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].iterations.len(), 4);
    assert!(chains[0].final_pr_url.is_some());
    assert_eq!(h.agents.launches.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn review_failure_is_isolated_to_its_agent() {
    let mut h = harness(
        FakeAgents::new(vec![
            agent("bc_1", AgentStatus::Finished, "feat/a"),
            agent("bc_2", AgentStatus::Finished, "feat/b"),
        ]),
        FakeRepo::with_changes(),
        FakeReviewer::down_for(1, false),
        GREEN,
        config(),
    );

    let report = h.orchestrator.tick().await.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "bc_1");
    assert!(report.failures[0].1.contains("reviewer unavailable"));
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].0, "bc_2");
    assert!(matches!(report.outcomes[0].1, AgentOutcome::Accepted { forced: false, .. }));

    // No decision was made for the failed review.
    let created = h.repo.created_prs.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].head, "feat/b");
    assert!(h.agents.followups.lock().unwrap().is_empty());
    assert!(h.agents.launches.lock().unwrap().is_empty());

    // Both check runs were completed, the failed one as neutral.
    let updates = h.repo.updates.lock().unwrap().clone();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].conclusion, CheckConclusion::Neutral);
    assert!(updates[0].text.contains("down"));
    assert_eq!(updates[1].conclusion, CheckConclusion::Success);

    let mut chains = h.orchestrator.chains().get_all_chains();
    chains.sort_by(|a, b| a.original_id.cmp(&b.original_id));
    assert_eq!(chains[0].iterations[0].status, IterationStatus::Pending);
    assert_eq!(chains[1].iterations[0].status, IterationStatus::Approved);
    assert!(h.orchestrator.processed().contains("bc_1"));
}

#[tokio::test]
async fn review_failure_closes_commit_status() {
    let repo = FakeRepo {
        check_runs_forbidden: true,
        ..FakeRepo::with_changes()
    };
    let mut h = harness(
        FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")]),
        repo,
        FakeReviewer::down_for(1, false),
        GREEN,
        config(),
    );

    let report = h.orchestrator.tick().await.unwrap();
    assert_eq!(report.failures.len(), 1);

    let statuses = h.repo.statuses.lock().unwrap().clone();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].state, CommitState::Pending);
    assert_eq!(statuses[1].state, CommitState::Failure);
    assert_eq!(statuses[1].description, "Agent review failed to run");
}

#[tokio::test]
async fn invalid_repository_is_not_retried() {
    let mut bad = agent("bc_1", AgentStatus::Finished, "feat/login");
    bad.source.repository = "https://gitlab.com/acme/app".into();
    let mut h = harness(
        FakeAgents::new(vec![bad]),
        FakeRepo::with_changes(),
        FakeReviewer::always(false),
        GREEN,
        config(),
    );

    let report = h.orchestrator.tick().await.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].1.contains("invalid repository"));
    assert!(h.orchestrator.processed().contains("bc_1"));
    assert!(h.orchestrator.chains().is_empty());

    let report = h.orchestrator.tick().await.unwrap();
    assert_eq!(report.already_processed, 1);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn forbidden_check_runs_fall_back_to_commit_status() {
    let repo = FakeRepo {
        check_runs_forbidden: true,
        ..FakeRepo::with_changes()
    };
    let mut h = harness(
        FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")]),
        repo,
        FakeReviewer::always(false),
        GREEN,
        config(),
    );

    h.orchestrator.tick().await.unwrap();

    let statuses = h.repo.statuses.lock().unwrap().clone();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].state, CommitState::Pending);
    assert_eq!(statuses[1].state, CommitState::Success);
    assert_eq!(statuses[1].context, "Cursor Agent: bc_1");
    assert!(!h.repo.calls().contains(&"update_check_run".to_string()));
    let chain = h.orchestrator.chains().get_all_chains().remove(0);
    assert_eq!(chain.iterations[0].check_run_id, None);
}

#[tokio::test]
async fn disabled_status_reporting_skips_github_checks() {
    let mut config = config();
    config.review.checks_enabled = false;
    let mut h = harness(
        FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")]),
        FakeRepo::with_changes(),
        FakeReviewer::always(false),
        GREEN,
        config,
    );

    h.orchestrator.tick().await.unwrap();
    let calls = h.repo.calls();
    assert!(!calls.iter().any(|c| c.contains("check_run") || c == "set_commit_status"));
    assert!(calls.contains(&"create_pr".to_string()));
}

#[tokio::test]
async fn listing_failure_defers_whole_tick() {
    let mut agents = FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")]);
    agents.list_fails = true;
    let mut h = harness(agents, FakeRepo::with_changes(), FakeReviewer::always(false), GREEN, config());

    let err = h.orchestrator.tick().await.unwrap_err();
    assert!(matches!(err, WardenError::Unavailable { service: Service::Agents, .. }));
    assert!(h.orchestrator.processed().is_empty());
    assert!(h.repo.calls().is_empty());
}

#[tokio::test]
async fn listing_follows_cursors() {
    let mut agents = FakeAgents::new(Vec::new());
    agents.pages = Some(vec![
        AgentPage {
            agents: vec![agent("bc_1", AgentStatus::Running, "feat/a")],
            next_cursor: Some("1".into()),
        },
        AgentPage {
            agents: vec![agent("bc_2", AgentStatus::Running, "feat/b")],
            next_cursor: None,
        },
    ]);
    let mut config = config();
    config.orchestrator.page_size = 1;
    let mut h = harness(agents, FakeRepo::default(), FakeReviewer::always(false), GREEN, config);

    let report = h.orchestrator.tick().await.unwrap();
    assert_eq!(report.listed, 2);
    assert_eq!(report.running, 2);
    let seen = h.agents.page_size_seen.lock().unwrap().clone();
    assert_eq!(seen, vec![(1, None), (1, Some("1".to_string()))]);
}

#[tokio::test]
async fn auto_merge_after_approval() {
    let mut config = config();
    config.orchestrator.auto_merge_on_approval = true;
    let mut h = harness(
        FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")]),
        FakeRepo::with_changes(),
        FakeReviewer::always(false),
        GREEN,
        config,
    );

    let report = h.orchestrator.tick().await.unwrap();
    assert!(matches!(report.outcomes[0].1, AgentOutcome::Accepted { merged: true, .. }));
    assert_eq!(h.repo.merged.lock().unwrap().clone(), vec![101]);
}

#[tokio::test]
async fn empty_diff_opens_issue_instead_of_followup() {
    let mut config = config();
    config.orchestrator.issue_on_empty_diff = true;
    let mut h = harness(
        FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")]),
        FakeRepo::default(),
        FakeReviewer::always(false),
        RED,
        config,
    );

    let report = h.orchestrator.tick().await.unwrap();
    assert_eq!(
        report.outcomes[0].1,
        AgentOutcome::IssueOpened {
            issue_url: "https://github.com/acme/app/issues/5".into()
        }
    );
    assert!(h.agents.followups.lock().unwrap().is_empty());
    assert!(h.repo.issues.lock().unwrap()[0].contains("bc_1"));
}

#[tokio::test]
async fn run_flushes_state_on_shutdown() {
    let mut h = harness(
        FakeAgents::new(vec![agent("bc_1", AgentStatus::Finished, "feat/login")]),
        FakeRepo::with_changes(),
        FakeReviewer::always(false),
        GREEN,
        config(),
    );

    h.orchestrator.run(async {}).await.unwrap();

    let chains = ChainStore::open(h.dir.path().join("agent-chains.json")).unwrap();
    assert_eq!(chains.len(), 1);
    let processed = ProcessedSet::open(h.dir.path().join("processed-agents.json")).unwrap();
    assert!(processed.contains("bc_1"));
}
