use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use warden_core::{Agent, AgentGateway};

/// Result of [`wait_for_finish`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WaitOutcome {
    /// The agent reached `FINISHED` or `ERROR`.
    Finished { agent: Agent },
    /// The deadline passed first. `last` is the most recent successful read.
    TimedOut { last: Option<Agent> },
}

impl WaitOutcome {
    pub fn agent(&self) -> Option<&Agent> {
        match self {
            WaitOutcome::Finished { agent } => Some(agent),
            WaitOutcome::TimedOut { last } => last.as_ref(),
        }
    }
}

/// Poll `id` every `interval` until it reaches a terminal status or
/// `timeout` elapses.
///
/// Errors from individual reads are logged and do not end the wait.
pub async fn wait_for_finish<G>(
    gateway: &G,
    id: &str,
    timeout: Duration,
    interval: Duration,
) -> WaitOutcome
where
    G: AgentGateway + ?Sized,
{
    let deadline = Instant::now() + timeout;
    let mut last = None;

    while Instant::now() < deadline {
        match gateway.get_agent(id).await {
            Ok(agent) if agent.status.is_terminal() => {
                tracing::debug!(agent_id = id, status = %agent.status, "agent reached terminal status");
                return WaitOutcome::Finished { agent };
            }
            Ok(agent) => {
                tracing::trace!(agent_id = id, status = %agent.status, "agent still working");
                last = Some(agent);
            }
            Err(e) => tracing::warn!(agent_id = id, error = %e, "failed to poll agent"),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        tokio::time::sleep(interval.min(remaining)).await;
    }

    WaitOutcome::TimedOut { last }
}
