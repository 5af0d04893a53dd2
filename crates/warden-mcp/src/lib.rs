//! MCP server exposing the coding-agent API and review chains to IDEs and
//! agents.
//!
//! Tools: `list_agents`, `get_agent`, `launch_agent`, `send_followup`,
//! `wait_for_finish`, `list_chains`, and `get_chain`, served over stdio.
//!
//! # Examples
//!
//! ```no_run
//! use warden_core::WardenConfig;
//!
//! # async fn example() -> Result<(), warden_core::WardenError> {
//! let config = WardenConfig::default().with_env_secrets();
//! warden_mcp::server::run_server(&config).await?;
//! # Ok(())
//! # }
//! ```

pub mod server;
pub mod tools;
