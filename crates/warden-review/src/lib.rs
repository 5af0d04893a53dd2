//! Review pipeline: automated checks, branch comparison, and the AI reviewer.
//!
//! Also hosts the concrete GitHub and LLM clients the pipeline and the
//! orchestrator talk to.

pub mod checks;
pub mod github;
pub mod llm;
pub mod pipeline;
pub mod prompt;

pub use checks::ShellCheckRunner;
pub use github::GitHubClient;
pub use llm::LlmClient;
pub use pipeline::ReviewPipeline;
