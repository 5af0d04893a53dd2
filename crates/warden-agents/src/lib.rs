//! Client for the coding-agent API and helpers built on it.
//!
//! [`AgentClient`] implements [`warden_core::AgentGateway`] over HTTP;
//! [`wait_for_finish`] polls any gateway until an agent reaches a terminal
//! status or a deadline passes.

pub mod client;
pub mod wait;

pub use client::AgentClient;
pub use wait::{wait_for_finish, WaitOutcome};
