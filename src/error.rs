//! Error types for funnel analysis.
//!
//! Agent errors never escape an agent's `process` call; they are logged and
//! turned into an `error` status. Snapshot errors are raised while loading
//! input and surface through `anyhow` at the CLI edge.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("Invalid {field} on step '{step}': {value}")]
    InvalidMetric {
        step: String,
        field: &'static str,
        value: f64,
    },

    #[error("Cannot fit anomaly model: need {required} samples, have {available}")]
    InsufficientSamples { required: usize, available: usize },

    #[error("Degenerate trend series for step '{0}'")]
    DegenerateSeries(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("Funnel step has an empty name")]
    UnnamedStep,

    #[error("Step '{step}' has {field} = {value}, expected a value in [0, 100]")]
    RateOutOfRange {
        step: String,
        field: &'static str,
        value: f64,
    },

    #[error("Funnel snapshot contains no steps")]
    Empty,
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;
