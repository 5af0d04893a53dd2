//! Core types, configuration, and error handling for Warden.
//!
//! This crate provides the shared foundation used by all other Warden crates:
//! - [`WardenError`]: unified error type using `thiserror`
//! - [`WardenConfig`]: configuration loaded from `.warden.toml`
//! - Shared types: [`Agent`], [`AgentStatus`], [`RepoSlug`], [`Verdict`],
//!   [`CheckOutcomes`], [`CompareFile`], [`PullRequest`]
//! - Gateway traits consumed by the review engine: [`AgentGateway`],
//!   [`RepoGateway`], [`ReviewerGateway`], [`CheckRunner`]

mod config;
mod error;
pub mod gateway;
mod types;

pub use config::{
    AgentsConfig, ChecksConfig, GitHubConfig, LlmConfig, OrchestratorConfig, ReviewConfig,
    WardenConfig,
};
pub use error::{Service, WardenError};
pub use gateway::{AgentGateway, CheckRunner, RepoGateway, ReviewerGateway};
pub use types::{
    Agent, AgentPage, AgentSource, AgentStatus, AgentTarget, CheckConclusion, CheckOutcomes,
    CheckRunUpdate, CommitState, CommitStatus, CompareFile, FollowupAck, Issue, LaunchRequest,
    NewPullRequest, OutputFormat, PullRequest, RepoSlug, ReviewFinding, Severity, Verdict,
};

/// A convenience `Result` type for Warden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
