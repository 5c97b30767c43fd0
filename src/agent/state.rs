//! Per-agent state tracking.
//!
//! Every agent owns exactly one [`AgentCore`]. It carries the public
//! [`AgentState`] plus the bounded memory and insight log the agent keeps
//! between rounds.

use crate::config::GeneralConfig;
use crate::models::Insight;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Analyzing,
    Active,
    Error,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Analyzing => write!(f, "analyzing"),
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Error => write!(f, "error"),
        }
    }
}

/// Snapshot of an agent's bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    pub status: AgentStatus,
    pub last_action: DateTime<Utc>,
    /// Confidence in `[0, 1]`, nudged up after each successful round.
    pub confidence_level: f64,
    pub memory_size: usize,
    pub decisions_made: u64,
    pub accuracy_score: f64,
}

impl AgentState {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            status: AgentStatus::Idle,
            last_action: Utc::now(),
            confidence_level: 0.5,
            memory_size: 0,
            decisions_made: 0,
            accuracy_score: 0.0,
        }
    }

    /// Refresh `last_action`, never moving it backwards or standing still.
    fn touch(&mut self) {
        let now = Utc::now();
        self.last_action = if now > self.last_action {
            now
        } else {
            self.last_action + Duration::nanoseconds(1)
        };
    }
}

/// One remembered round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub timestamp: DateTime<Utc>,
    pub steps_seen: usize,
    pub insights_emitted: usize,
}

/// Push onto a deque, evicting the oldest entries past `limit`.
pub(crate) fn push_bounded<T>(deque: &mut VecDeque<T>, item: T, limit: usize) {
    deque.push_back(item);
    while deque.len() > limit {
        deque.pop_front();
    }
}

/// State, memory, and insight log owned by a single agent.
#[derive(Debug, Clone)]
pub struct AgentCore {
    state: AgentState,
    memory: VecDeque<MemoryEntry>,
    memory_limit: usize,
    insight_log: VecDeque<Insight>,
    insight_log_limit: usize,
    insights_generated: usize,
}

impl AgentCore {
    pub fn new(agent_id: &str, limits: &GeneralConfig) -> Self {
        Self {
            state: AgentState::new(agent_id),
            memory: VecDeque::new(),
            memory_limit: limits.memory_limit,
            insight_log: VecDeque::new(),
            insight_log_limit: limits.insight_log_limit,
            insights_generated: 0,
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// Enter the `analyzing` state at the start of a round.
    pub fn begin(&mut self) {
        self.state.status = AgentStatus::Analyzing;
        self.state.touch();
    }

    /// Close a successful round.
    pub fn complete(&mut self, insights: &[Insight], steps_seen: usize, confidence_nudge: f64) {
        for insight in insights {
            push_bounded(&mut self.insight_log, insight.clone(), self.insight_log_limit);
        }
        self.insights_generated += insights.len();

        push_bounded(
            &mut self.memory,
            MemoryEntry {
                timestamp: Utc::now(),
                steps_seen,
                insights_emitted: insights.len(),
            },
            self.memory_limit,
        );

        self.state.status = AgentStatus::Active;
        self.state.confidence_level = (self.state.confidence_level + confidence_nudge).min(1.0);
        self.state.decisions_made += insights.len() as u64;
        self.state.memory_size = self.memory.len();
        self.state.touch();
    }

    /// Close a failed round.
    pub fn fail(&mut self) {
        self.state.status = AgentStatus::Error;
        self.state.touch();
    }

    /// Most recent insights, oldest first.
    pub fn insight_log(&self) -> impl Iterator<Item = &Insight> {
        self.insight_log.iter()
    }

    /// Total insights ever produced, including ones evicted from the log.
    pub fn insights_generated(&self) -> usize {
        self.insights_generated
    }

    #[cfg(test)]
    pub fn memory(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.memory.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImpactLevel, InsightType};

    fn limits(memory: usize, log: usize) -> GeneralConfig {
        GeneralConfig {
            memory_limit: memory,
            insight_log_limit: log,
            ..GeneralConfig::default()
        }
    }

    fn insight(n: usize) -> Insight {
        Insight::new(InsightType::Pattern, 0.5, format!("insight {}", n), ImpactLevel::Low)
    }

    #[test]
    fn test_initial_state() {
        let core = AgentCore::new("predictor", &GeneralConfig::default());
        let state = core.state();
        assert_eq!(state.agent_id, "predictor");
        assert_eq!(state.status, AgentStatus::Idle);
        assert_eq!(state.confidence_level, 0.5);
        assert_eq!(state.decisions_made, 0);
        assert_eq!(state.memory_size, 0);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut core = AgentCore::new("optimizer", &GeneralConfig::default());

        core.begin();
        assert_eq!(core.state().status, AgentStatus::Analyzing);

        core.fail();
        assert_eq!(core.state().status, AgentStatus::Error);

        // error is not terminal
        core.begin();
        core.complete(&[insight(1), insight(2)], 4, 0.1);
        assert_eq!(core.state().status, AgentStatus::Active);
        assert_eq!(core.state().decisions_made, 2);
        assert!((core.state().confidence_level - 0.6).abs() < 1e-9);
        assert_eq!(core.state().memory_size, 1);
    }

    #[test]
    fn test_confidence_is_capped() {
        let mut core = AgentCore::new("anomaly_detector", &GeneralConfig::default());
        for _ in 0..10 {
            core.begin();
            core.complete(&[], 3, 0.1);
        }
        assert_eq!(core.state().confidence_level, 1.0);
    }

    #[test]
    fn test_last_action_strictly_advances() {
        let mut core = AgentCore::new("pattern_analyzer", &GeneralConfig::default());
        let mut previous = core.state().last_action;
        for _ in 0..50 {
            core.begin();
            assert!(core.state().last_action > previous);
            previous = core.state().last_action;
        }
    }

    #[test]
    fn test_memory_and_log_are_bounded() {
        let mut core = AgentCore::new("predictor", &limits(3, 5));
        for n in 0..10 {
            core.begin();
            core.complete(&[insight(n)], 2, 0.0);
        }

        assert_eq!(core.memory().count(), 3);
        assert_eq!(core.state().memory_size, 3);
        assert_eq!(core.insights_generated(), 10);

        let kept: Vec<_> = core.insight_log().map(|i| i.description.clone()).collect();
        assert_eq!(kept.first().map(String::as_str), Some("insight 5"));
        assert_eq!(kept.last().map(String::as_str), Some("insight 9"));
    }
}
