//! MCP server setup and lifecycle.

use std::sync::Arc;

use rmcp::{model::*, tool_handler, transport::stdio, ServerHandler, ServiceExt};
use warden_agents::AgentClient;
use warden_core::{WardenConfig, WardenError};

use crate::tools::WardenServer;

const SERVER_INSTRUCTIONS: &str = "\
Warden supervises autonomous coding agents and reviews their branches. Tools:\n\
- list_agents: List coding agents and their status\n\
- get_agent: Fetch one agent by id\n\
- launch_agent: Start a new agent on a repository\n\
- send_followup: Send further instructions to an existing agent\n\
- wait_for_finish: Poll an agent until it finishes or a timeout passes\n\
- list_chains: Show every review chain recorded by the orchestrator\n\
- get_chain: Show the review chain an agent belongs to";

#[tool_handler]
impl ServerHandler for WardenServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "warden".to_string(),
                title: Some("Warden Agent Orchestrator".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: Some("Review-and-merge orchestration for coding agents".to_string()),
                icons: None,
                website_url: None,
            },
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
        }
    }
}

/// Start the MCP server on stdio and block until the client closes stdin.
///
/// # Errors
///
/// Returns [`WardenError::Config`] if the agent API key is missing or the
/// transport fails.
pub async fn run_server(config: &WardenConfig) -> Result<(), WardenError> {
    let agents = AgentClient::new(&config.agents)?;
    let server = WardenServer::new(Arc::new(agents), config.orchestrator.chains_path());
    tracing::info!(chains = %config.orchestrator.chains_path().display(), "starting MCP server on stdio");

    let service = server
        .serve(stdio())
        .await
        .map_err(|e| WardenError::Config(format!("MCP server failed to start: {e}")))?;

    service
        .waiting()
        .await
        .map_err(|e| WardenError::Config(format!("MCP server error: {e}")))?;

    Ok(())
}
