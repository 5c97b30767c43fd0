//! Cross-agent analysis.
//!
//! The orchestrator drives the agents; the aggregator turns their raw
//! output into ranked insights and system metrics.

pub mod aggregator;
pub mod orchestrator;

pub use orchestrator::Orchestrator;
