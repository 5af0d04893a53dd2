//! The polling control loop.
//!
//! Each tick lists agents, picks the ones that finished since the last look,
//! reviews them, and either accepts the change (pull request, optional merge)
//! or sends it back for revision. Revision rounds are tracked per chain and
//! capped by `orchestrator.max_review_iterations`.

mod accept;
mod orchestrator;
mod prompts;
mod status;

pub use orchestrator::{AgentOutcome, Orchestrator, TickReport};
pub use status::check_name;
