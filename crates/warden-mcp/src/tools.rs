//! Tool implementations for the Warden MCP server.
//!
//! Agent tools delegate to an [`AgentGateway`]; chain tools read a fresh
//! snapshot of the chain ledger on every call so they see what a running
//! orchestrator has written.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::*,
    schemars, tool, tool_router, ErrorData as McpError,
};
use serde::{Deserialize, Serialize};
use warden_core::{AgentGateway, LaunchRequest};
use warden_state::{Chain, ChainStore};

/// MCP server exposing agent and chain tools.
#[derive(Clone)]
pub struct WardenServer {
    pub(crate) agents: Arc<dyn AgentGateway>,
    pub(crate) chains_path: PathBuf,
    pub(crate) tool_router: ToolRouter<Self>,
}

// --- Parameter structs ---

/// Parameters for the `list_agents` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListAgentsParams {
    /// Maximum agents to return (default: 20).
    pub limit: Option<usize>,
    /// Cursor from a previous call's `nextCursor`.
    pub cursor: Option<String>,
}

/// Parameters for tools that address a single agent.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AgentIdParams {
    /// Agent id, e.g. `bc_abc123`.
    pub agent_id: String,
}

/// Parameters for the `launch_agent` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LaunchAgentParams {
    /// Task description for the agent.
    pub prompt: String,
    /// GitHub repository URL.
    pub repository: String,
    /// Ref to start from (default: "main").
    pub git_ref: Option<String>,
    /// Prefix for the agent's branch name.
    pub branch_slug: Option<String>,
}

/// Parameters for the `send_followup` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SendFollowupParams {
    pub agent_id: String,
    /// Instructions to send.
    pub text: String,
}

/// Parameters for the `wait_for_finish` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct WaitForFinishParams {
    pub agent_id: String,
    /// Give up after this many seconds (default: 600).
    pub timeout_secs: Option<u64>,
    /// Seconds between polls (default: 10).
    pub poll_interval_secs: Option<u64>,
}

// --- Response structs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainsResponse {
    chains: Vec<Chain>,
    total: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FollowupResponse {
    agent_id: String,
    sent: bool,
}

fn mcp_err(msg: impl Into<String>) -> McpError {
    McpError::internal_error(msg.into(), None)
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| mcp_err(e.to_string()))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[tool_router]
impl WardenServer {
    /// Create a server over `agents`, reading chains from `chains_path`.
    pub fn new(agents: Arc<dyn AgentGateway>, chains_path: PathBuf) -> Self {
        Self {
            agents,
            chains_path,
            tool_router: Self::tool_router(),
        }
    }

    fn open_chains(&self) -> Result<ChainStore, McpError> {
        ChainStore::open(self.chains_path.clone()).map_err(|e| {
            mcp_err(format!(
                "Failed to read chain state at {}: {e}",
                self.chains_path.display()
            ))
        })
    }

    #[tool(
        name = "list_agents",
        description = "List coding agents, newest first, with their status, repository, and branch. Pass the returned nextCursor to fetch the next page."
    )]
    pub async fn list_agents(
        &self,
        Parameters(params): Parameters<ListAgentsParams>,
    ) -> Result<CallToolResult, McpError> {
        let limit = params.limit.unwrap_or(20).clamp(1, 100);
        let page = self
            .agents
            .list_agents(limit, params.cursor.as_deref())
            .await
            .map_err(|e| mcp_err(format!("Failed to list agents: {e}")))?;
        json_result(&page)
    }

    #[tool(
        name = "get_agent",
        description = "Fetch a single coding agent by id, including its status and target branch."
    )]
    pub async fn get_agent(
        &self,
        Parameters(params): Parameters<AgentIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let agent = self
            .agents
            .get_agent(&params.agent_id)
            .await
            .map_err(|e| mcp_err(format!("Failed to get agent {}: {e}", params.agent_id)))?;
        json_result(&agent)
    }

    #[tool(
        name = "launch_agent",
        description = "Launch a coding agent on a GitHub repository with the configured model. The agent works on a new branch and opens a pull request when done."
    )]
    pub async fn launch_agent(
        &self,
        Parameters(params): Parameters<LaunchAgentParams>,
    ) -> Result<CallToolResult, McpError> {
        if params.prompt.trim().is_empty() {
            return Err(McpError::invalid_params("prompt must not be empty", None));
        }
        let request = LaunchRequest {
            prompt_text: params.prompt,
            repository: params.repository,
            git_ref: params.git_ref,
            branch_slug: params.branch_slug,
        };
        let agent = self
            .agents
            .launch_agent_with_defaults(request)
            .await
            .map_err(|e| mcp_err(format!("Failed to launch agent: {e}")))?;
        json_result(&agent)
    }

    #[tool(
        name = "send_followup",
        description = "Send further instructions to an existing agent. The agent continues on its current branch."
    )]
    pub async fn send_followup(
        &self,
        Parameters(params): Parameters<SendFollowupParams>,
    ) -> Result<CallToolResult, McpError> {
        self.agents
            .send_followup(&params.agent_id, &params.text)
            .await
            .map_err(|e| mcp_err(format!("Failed to send followup to {}: {e}", params.agent_id)))?;
        json_result(&FollowupResponse {
            agent_id: params.agent_id,
            sent: true,
        })
    }

    #[tool(
        name = "wait_for_finish",
        description = "Poll an agent until it reaches FINISHED or ERROR, or until the timeout passes. Returns the outcome and the last known agent state."
    )]
    pub async fn wait_for_finish(
        &self,
        Parameters(params): Parameters<WaitForFinishParams>,
    ) -> Result<CallToolResult, McpError> {
        let timeout = Duration::from_secs(params.timeout_secs.unwrap_or(600));
        let interval = Duration::from_secs(params.poll_interval_secs.unwrap_or(10).max(1));
        let outcome =
            warden_agents::wait_for_finish(&*self.agents, &params.agent_id, timeout, interval)
                .await;
        json_result(&outcome)
    }

    #[tool(
        name = "list_chains",
        description = "List every review chain: the original agent, each revision agent with its branch and review status, and the final pull request if one was opened."
    )]
    pub fn list_chains(&self) -> Result<CallToolResult, McpError> {
        let chains = self.open_chains()?.get_all_chains();
        json_result(&ChainsResponse {
            total: chains.len(),
            chains,
        })
    }

    #[tool(
        name = "get_chain",
        description = "Show the review chain an agent belongs to, whether it started the chain or is a later revision."
    )]
    pub fn get_chain(
        &self,
        Parameters(params): Parameters<AgentIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut store = self.open_chains()?;
        match store.get_chain(&params.agent_id) {
            Some(chain) => json_result(chain),
            None => Err(McpError::invalid_params(
                format!("No chain contains agent {}", params.agent_id),
                None,
            )),
        }
    }
}
