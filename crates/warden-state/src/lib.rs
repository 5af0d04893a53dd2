//! Durable state for the orchestrator: the chain ledger and the set of
//! agents already handled.
//!
//! Both stores keep everything in memory and checkpoint the whole document to
//! disk after each mutation with an atomic replace, so a crash mid-write
//! leaves the previous file intact.

mod atomic;
pub mod chain;
pub mod processed;

pub use chain::{Chain, ChainStore, Iteration, IterationStatus};
pub use processed::ProcessedSet;
