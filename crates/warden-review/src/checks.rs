//! Build, test, and lint against a fresh clone of the agent's branch.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use warden_core::{CheckOutcomes, CheckRunner, ChecksConfig, RepoSlug, WardenError};

/// Runs the configured shell commands in a scoped temporary checkout.
///
/// The checkout lives in a [`tempfile::TempDir`] and is removed when the run
/// ends, however it ends.
///
/// # Examples
///
/// ```
/// use warden_core::ChecksConfig;
/// use warden_review::ShellCheckRunner;
///
/// let runner = ShellCheckRunner::new(ChecksConfig::default());
/// assert_eq!(runner.clone_url(&"acme/app".parse().unwrap()), "https://github.com/acme/app.git");
/// ```
pub struct ShellCheckRunner {
    config: ChecksConfig,
    clone_base: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Passed,
    Failed,
    TimedOut,
}

impl Step {
    fn passed(self) -> bool {
        self == Step::Passed
    }
}

impl ShellCheckRunner {
    pub fn new(config: ChecksConfig) -> Self {
        Self {
            config,
            clone_base: "https://github.com".into(),
        }
    }

    /// Clone from `base` instead of `https://github.com`. Accepts anything
    /// `git clone` does, including local directories.
    pub fn with_clone_base(mut self, base: impl Into<String>) -> Self {
        self.clone_base = base.into();
        self
    }

    pub fn clone_url(&self, repo: &RepoSlug) -> String {
        format!(
            "{}/{}/{}.git",
            self.clone_base.trim_end_matches('/'),
            repo.owner,
            repo.repo
        )
    }

    async fn checkout(&self, repo: &RepoSlug, branch: &str, dir: &Path) -> Result<bool, WardenError> {
        let url = self.clone_url(repo);
        let timeout = self.config.step_timeout();

        let mut clone = Command::new("git");
        clone.arg("clone").arg("--quiet").arg(&url).arg(dir);
        if !run_step(clone, "git clone", timeout).await?.passed() {
            return Ok(false);
        }

        let mut checkout = Command::new("git");
        checkout
            .arg("checkout")
            .arg("--quiet")
            .arg(branch)
            .current_dir(dir);
        Ok(run_step(checkout, "git checkout", timeout).await?.passed())
    }

    /// Run every command in order, stopping at the first failure.
    async fn run_all(&self, commands: &[String], dir: &Path) -> Result<bool, WardenError> {
        for command in commands {
            let step = run_step(shell(command, dir), command, self.config.step_timeout()).await?;
            if !step.passed() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn shell(command: &str, dir: &Path) -> Command {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    };
    cmd.current_dir(dir);
    cmd
}

async fn run_step(mut cmd: Command, label: &str, timeout: Duration) -> Result<Step, WardenError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|e| WardenError::Check(format!("failed to start `{label}`: {e}")))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Err(_) => {
            tracing::warn!(step = label, timeout_secs = timeout.as_secs(), "check step timed out");
            Ok(Step::TimedOut)
        }
        Ok(Err(e)) => Err(WardenError::Check(format!("failed to wait for `{label}`: {e}"))),
        Ok(Ok(output)) if output.status.success() => {
            tracing::debug!(step = label, "check step passed");
            Ok(Step::Passed)
        }
        Ok(Ok(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(
                step = label,
                code = ?output.status.code(),
                stderr = %tail(&stderr, 20),
                "check step failed"
            );
            Ok(Step::Failed)
        }
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[async_trait]
impl CheckRunner for ShellCheckRunner {
    async fn run_checks(&self, repo: &RepoSlug, branch: &str) -> Result<CheckOutcomes, WardenError> {
        let workspace = tempfile::Builder::new()
            .prefix("warden-review-")
            .tempdir()
            .map_err(|e| WardenError::Check(format!("failed to create review workspace: {e}")))?;
        let dir = workspace.path().join("repo");

        if !self.checkout(repo, branch, &dir).await? {
            tracing::warn!(repo = %repo, branch, "checkout failed, counting as failed build");
            return Ok(CheckOutcomes::NONE);
        }

        if let Some(marker) = self.config.marker_file.as_deref() {
            if !dir.join(marker).exists() {
                tracing::info!(repo = %repo, branch, marker, "marker file missing, skipping checks");
                return Ok(CheckOutcomes::NONE);
            }
        }

        let mut outcomes = CheckOutcomes::NONE;
        outcomes.build = self.run_all(&self.config.build, &dir).await?;
        if outcomes.build {
            outcomes.tests = self.run_all(&self.config.test, &dir).await?;
            outcomes.lint = self.run_all(&self.config.lint, &dir).await?;
        }

        tracing::info!(
            repo = %repo,
            branch,
            build = outcomes.build,
            tests = outcomes.tests,
            lint = outcomes.lint,
            "checks finished"
        );
        Ok(outcomes)
    }
}
