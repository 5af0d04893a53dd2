use std::sync::Arc;

use warden_core::{
    CheckOutcomes, CheckRunner, RepoGateway, RepoSlug, ReviewerGateway, Verdict, WardenError,
};

use crate::prompt;

/// Turns a branch into an accept/revise [`Verdict`].
///
/// Runs automated checks (unless in safe mode), compares the branch against
/// its base, and asks the reviewer for a finding. A change is approved only
/// when the build passed and the reviewer reported no critical issues.
pub struct ReviewPipeline {
    repo: Arc<dyn RepoGateway>,
    reviewer: Arc<dyn ReviewerGateway>,
    checks: Arc<dyn CheckRunner>,
    safe_mode: bool,
}

impl ReviewPipeline {
    pub fn new(
        repo: Arc<dyn RepoGateway>,
        reviewer: Arc<dyn ReviewerGateway>,
        checks: Arc<dyn CheckRunner>,
        safe_mode: bool,
    ) -> Self {
        Self {
            repo,
            reviewer,
            checks,
            safe_mode,
        }
    }

    /// Review `head` against `base` in `repo`.
    ///
    /// # Errors
    ///
    /// Propagates check-runner infrastructure errors, comparison failures,
    /// and reviewer failures. None of these are ever reported as a verdict.
    pub async fn review(
        &self,
        repo: &RepoSlug,
        head: &str,
        base: &str,
    ) -> Result<Verdict, WardenError> {
        let checks = if self.safe_mode {
            tracing::debug!(repo = %repo, branch = head, "safe mode, skipping automated checks");
            CheckOutcomes::NONE
        } else {
            self.checks.run_checks(repo, head).await?
        };

        let files = if base == head {
            Vec::new()
        } else {
            self.repo.get_compare_files(repo, base, head).await?
        };
        let files_changed = files.iter().filter(|f| !f.is_removed()).count();

        let review_prompt = prompt::build_review_prompt(&files, &checks);
        let finding = self.reviewer.review_diff(&review_prompt).await?;

        let approved = checks.build && !finding.has_critical_issues;
        tracing::info!(
            repo = %repo,
            branch = head,
            approved,
            build = checks.build,
            critical = finding.has_critical_issues,
            files_changed,
            "review finished"
        );

        Ok(Verdict {
            approved,
            feedback: finding.feedback,
            severity: finding.severity,
            checks,
            files_changed,
        })
    }
}
