use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;
use warden_core::{
    Agent, AgentGateway, AgentStatus, LaunchRequest, OrchestratorConfig, RepoGateway, RepoSlug,
    ReviewConfig, Verdict, WardenConfig, WardenError,
};
use warden_review::ReviewPipeline;
use warden_state::{ChainStore, IterationStatus, ProcessedSet};

use crate::accept::{self, AcceptPolicy};
use crate::prompts;
use crate::status::StatusReport;

/// Chain file written by earlier versions in the working directory.
const LEGACY_CHAINS_FILE: &str = "agent-chains.json";

/// What the orchestrator did with one finished agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentOutcome {
    /// A pull request exists for the branch and the chain is closed.
    /// `forced` is set when the revision cap, not the verdict, decided.
    Accepted {
        pr_url: String,
        forced: bool,
        merged: bool,
    },
    /// The agent was asked to revise its branch.
    FollowedUp,
    /// The followup was rejected; a new agent continues the chain.
    Relaunched { new_agent_id: String },
    /// Nothing to review; an issue asks for the missing changes.
    IssueOpened { issue_url: String },
}

/// Summary of one tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub listed: usize,
    pub already_processed: usize,
    pub running: usize,
    pub outcomes: Vec<(String, AgentOutcome)>,
    pub failures: Vec<(String, String)>,
}

/// Drives the review loop over finished agents.
///
/// Owns both state stores; only one orchestrator may run against a state
/// directory at a time.
pub struct Orchestrator {
    agents: Arc<dyn AgentGateway>,
    repo: Arc<dyn RepoGateway>,
    pipeline: ReviewPipeline,
    chains: ChainStore,
    processed: ProcessedSet,
    config: OrchestratorConfig,
    review: ReviewConfig,
}

impl Orchestrator {
    pub fn new(
        agents: Arc<dyn AgentGateway>,
        repo: Arc<dyn RepoGateway>,
        pipeline: ReviewPipeline,
        chains: ChainStore,
        processed: ProcessedSet,
        config: &WardenConfig,
    ) -> Self {
        Self {
            agents,
            repo,
            pipeline,
            chains,
            processed,
            config: config.orchestrator.clone(),
            review: config.review.clone(),
        }
    }

    /// Build an orchestrator whose stores live in `orchestrator.state_dir`,
    /// migrating a chain file left in the working directory if present.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing state file cannot be read or parsed.
    pub fn open(
        agents: Arc<dyn AgentGateway>,
        repo: Arc<dyn RepoGateway>,
        pipeline: ReviewPipeline,
        config: &WardenConfig,
    ) -> Result<Self, WardenError> {
        let chains = ChainStore::open_with_legacy(
            config.orchestrator.chains_path(),
            Path::new(LEGACY_CHAINS_FILE),
        )?;
        let processed = ProcessedSet::open(config.orchestrator.processed_path())?;
        tracing::info!(
            chains = chains.len(),
            processed = processed.len(),
            state_dir = %config.orchestrator.state_dir.display(),
            "loaded orchestrator state"
        );
        Ok(Self::new(agents, repo, pipeline, chains, processed, config))
    }

    pub fn chains(&self) -> &ChainStore {
        &self.chains
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    /// Tick, sleep, repeat until `shutdown` resolves.
    ///
    /// A tick always runs to completion; shutdown is noticed between ticks
    /// and while sleeping. Both stores are flushed before returning.
    ///
    /// # Errors
    ///
    /// Returns an error only if the final flush fails.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), WardenError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let interval = self.config.poll_interval();
        tracing::info!(poll_interval_ms = self.config.poll_interval_ms, "orchestrator started");

        loop {
            match self.tick().await {
                Ok(report) => tracing::info!(
                    listed = report.listed,
                    handled = report.outcomes.len(),
                    failed = report.failures.len(),
                    "tick finished"
                ),
                Err(e) => tracing::error!(error = %e, "tick aborted, retrying next interval"),
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::info!("shutting down, flushing state");
        self.chains.flush()?;
        self.processed.flush()?;
        Ok(())
    }

    /// Run one pass over the agent list.
    ///
    /// # Errors
    ///
    /// Returns an error if listing agents fails. Nothing has been marked
    /// processed at that point, so the whole tick is retried next time.
    /// Failures for individual agents are logged and reported in the
    /// [`TickReport`] instead.
    pub async fn tick(&mut self) -> Result<TickReport, WardenError> {
        let agents = self.list_agents().await?;
        let mut report = TickReport {
            listed: agents.len(),
            ..TickReport::default()
        };

        for agent in agents {
            if self.processed.contains(&agent.id) {
                report.already_processed += 1;
                continue;
            }
            match agent.status {
                AgentStatus::Finished => {}
                AgentStatus::Running => {
                    tracing::info!(agent_id = %agent.id, branch = %agent.branch(), "agent is running");
                    report.running += 1;
                    continue;
                }
                _ => continue,
            }

            self.processed.insert(&agent.id);

            let span = tracing::info_span!("agent", agent_id = %agent.id, branch = %agent.branch());
            match self.process_agent(&agent).instrument(span).await {
                Ok(outcome) => report.outcomes.push((agent.id.clone(), outcome)),
                Err(e) => {
                    tracing::error!(agent_id = %agent.id, error = %e, "failed to process agent");
                    report.failures.push((agent.id.clone(), e.to_string()));
                }
            }
        }

        Ok(report)
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, WardenError> {
        let mut agents = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..self.config.max_pages.max(1) {
            let page = self
                .agents
                .list_agents(self.config.page_size, cursor.as_deref())
                .await?;
            agents.extend(page.agents);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(agents),
            }
        }

        tracing::warn!(max_pages = self.config.max_pages, "agent listing truncated");
        Ok(agents)
    }

    /// Review a finished agent and act on the verdict.
    async fn process_agent(&mut self, agent: &Agent) -> Result<AgentOutcome, WardenError> {
        let slug = RepoSlug::parse(&agent.source.repository)?;
        let branch = agent.branch();

        let (chain_key, iterations, had_chain) = match self.chains.get_chain(&agent.id) {
            Some(chain) => (chain.original_id.clone(), chain.iteration_count(), true),
            None => {
                let chain = self.chains.create_chain(&agent.id, branch)?;
                tracing::info!("starting review chain");
                (chain.original_id.clone(), chain.iteration_count(), false)
            }
        };
        tracing::debug!(chain = %chain_key, iterations, "reviewing iteration");
        self.chains
            .set_iteration_status(&agent.id, IterationStatus::Reviewing);

        let status = if self.review.checks_enabled {
            StatusReport::begin(&*self.repo, &slug, &agent.id, branch, &mut self.chains).await
        } else {
            StatusReport::disabled(&agent.id)
        };

        let verdict = match self.pipeline.review(&slug, branch, agent.base_ref()).await {
            Ok(verdict) => verdict,
            Err(e) => {
                status.abort(&*self.repo, &slug, branch, &e.to_string()).await;
                self.chains
                    .set_iteration_status(&agent.id, IterationStatus::Pending);
                return Err(e);
            }
        };
        status.finish(&*self.repo, &slug, branch, &verdict).await;

        // Forced once the chain holds more than max_review_iterations iterations (4th review for max 3).
        let cap_reached = had_chain && iterations > self.config.max_review_iterations;
        if verdict.approved || cap_reached {
            if cap_reached && !verdict.approved {
                tracing::warn!(
                    chain = %chain_key,
                    iterations,
                    max = self.config.max_review_iterations,
                    "revision cap reached, accepting without approval"
                );
            }
            self.accept(agent, &slug, &verdict).await
        } else {
            self.revise(agent, &slug, &chain_key, &verdict).await
        }
    }

    async fn accept(
        &mut self,
        agent: &Agent,
        slug: &RepoSlug,
        verdict: &Verdict,
    ) -> Result<AgentOutcome, WardenError> {
        let policy = AcceptPolicy {
            comments_enabled: self.review.comments_enabled,
            auto_merge: self.config.auto_merge_on_approval,
        };
        let acceptance = accept::accept(
            &*self.repo,
            slug,
            &agent.id,
            agent.branch(),
            agent.base_ref(),
            verdict,
            &policy,
        )
        .await?;

        self.chains
            .approve_agent(&agent.id, &acceptance.pr.html_url);
        Ok(AgentOutcome::Accepted {
            pr_url: acceptance.pr.html_url,
            forced: !verdict.approved,
            merged: acceptance.merged,
        })
    }

    async fn revise(
        &mut self,
        agent: &Agent,
        slug: &RepoSlug,
        chain_key: &str,
        verdict: &Verdict,
    ) -> Result<AgentOutcome, WardenError> {
        self.chains
            .set_iteration_status(&agent.id, IterationStatus::NeedsRevision);

        if self.config.issue_on_empty_diff && verdict.files_changed == 0 {
            let (title, body) = prompts::empty_diff_issue(&agent.id, agent.branch());
            let issue = self.repo.create_issue(slug, &title, &body).await?;
            tracing::info!(issue = issue.number, "no actionable changes, opened issue");
            return Ok(AgentOutcome::IssueOpened {
                issue_url: issue.html_url,
            });
        }

        let followup = prompts::followup(&verdict.feedback);
        match self.agents.send_followup(&agent.id, &followup).await {
            Ok(_) => {
                tracing::info!("sent review feedback to agent");
                Ok(AgentOutcome::FollowedUp)
            }
            Err(e) if e.followup_rejected() => {
                tracing::warn!(error = %e, "followup rejected, relaunching from branch");
                self.relaunch(agent, chain_key, verdict).await
            }
            Err(e) => Err(e),
        }
    }

    async fn relaunch(
        &mut self,
        agent: &Agent,
        chain_key: &str,
        verdict: &Verdict,
    ) -> Result<AgentOutcome, WardenError> {
        let branch = agent.branch();
        let request = LaunchRequest {
            prompt_text: prompts::relaunch(branch, &verdict.feedback),
            repository: agent.source.repository.clone(),
            git_ref: Some(branch.to_string()),
            branch_slug: Some(format!("{branch}-review")),
        };
        let launched = self.agents.launch_agent_with_defaults(request).await?;

        self.chains
            .add_iteration(chain_key, &launched.id, launched.branch(), &verdict.feedback)?;
        tracing::info!(
            chain = %chain_key,
            new_agent_id = %launched.id,
            new_branch = %launched.branch(),
            "launched revision agent"
        );
        Ok(AgentOutcome::Relaunched {
            new_agent_id: launched.id,
        })
    }
}
