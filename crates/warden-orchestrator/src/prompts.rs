//! Text sent to agents and posted to GitHub.

use warden_core::{CheckOutcomes, Verdict};

const NO_FEEDBACK: &str = "Changes needed";

fn feedback_or_default(feedback: &str) -> &str {
    if feedback.trim().is_empty() {
        NO_FEEDBACK
    } else {
        feedback
    }
}

/// Followup asking an agent to revise its own branch.
pub(crate) fn followup(feedback: &str) -> String {
    format!(
        "Review completed. Here's the feedback from automated analysis:\n\n{}\n\n\
         Please address these issues and improve the implementation.\n\
         Continue working on the same branch.",
        feedback_or_default(feedback)
    )
}

/// Prompt for a new agent that picks up where `previous_branch` left off.
pub(crate) fn relaunch(previous_branch: &str, feedback: &str) -> String {
    format!(
        "Previous work was done on branch: {previous_branch}\n\n\
         Review feedback:\n{}\n\n\
         Please address the feedback and make necessary improvements.\n\
         Start from the existing branch and create improved changes.",
        feedback_or_default(feedback)
    )
}

fn mark(passed: bool) -> &'static str {
    if passed {
        "✅"
    } else {
        "❌"
    }
}

pub(crate) fn checks_summary(checks: &CheckOutcomes) -> String {
    format!(
        "- Build: {}\n- Tests: {}\n- Linting: {}",
        mark(checks.build),
        mark(checks.tests),
        mark(checks.lint)
    )
}

pub(crate) fn pr_title(branch: &str, approved: bool) -> String {
    if approved {
        format!("✅ Auto-approved: {branch}")
    } else {
        format!("⚠️ Review limit reached: {branch}")
    }
}

pub(crate) fn pr_body(agent_id: &str, branch: &str, verdict: &Verdict) -> String {
    let feedback = if verdict.feedback.trim().is_empty() {
        "All checks passed"
    } else {
        verdict.feedback.as_str()
    };
    format!(
        "## Automated Review Results\n\n{}\n\n\
         ### Agent Details\n- Agent ID: {agent_id}\n- Branch: {branch}\n\n\
         ### Review Feedback\n{feedback}",
        checks_summary(&verdict.checks)
    )
}

pub(crate) fn verdict_comment(agent_id: &str, branch: &str, verdict: &Verdict) -> String {
    let text = if verdict.approved {
        "create the PR!"
    } else {
        feedback_or_default(&verdict.feedback)
    };
    format!("AI Review verdict: {text}\n\nBranch: {branch}\nAgent: {agent_id}")
}

pub(crate) fn empty_diff_issue(agent_id: &str, branch: &str) -> (String, String) {
    let title = format!("Follow-up required for agent {agent_id} on {branch}");
    let body = format!(
        "Agent {agent_id} finished but no actionable changes were detected on branch `{branch}`.\n\n\
         Please push the intended changes or update the task instructions, then re-run the agent."
    );
    (title, body)
}
