//! Data models for funnel analysis.
//!
//! This module contains the funnel snapshot consumed by the agents, the
//! insight records they produce, and the analysis result bundle returned
//! by the orchestrator.

use crate::agent::{AgentKind, AgentState};
use crate::error::SnapshotError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form, agent-specific payload attached to an insight.
pub type DataPoints = Map<String, Value>;

/// Impact level of an insight.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    /// Healthy step, keep monitoring
    Low,
    /// Worth a look during regular optimization work
    Medium,
    /// Needs scheduled optimization
    High,
    /// Needs immediate intervention
    Critical,
}

impl fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImpactLevel::Low => write!(f, "Low"),
            ImpactLevel::Medium => write!(f, "Medium"),
            ImpactLevel::High => write!(f, "High"),
            ImpactLevel::Critical => write!(f, "Critical"),
        }
    }
}

impl ImpactLevel {
    /// Weight used by the priority score.
    pub fn weight(&self) -> f64 {
        match self {
            ImpactLevel::Low => 1.0,
            ImpactLevel::Medium => 2.0,
            ImpactLevel::High => 3.0,
            ImpactLevel::Critical => 4.0,
        }
    }

    /// Returns an emoji representation of the impact level.
    pub fn emoji(&self) -> &'static str {
        match self {
            ImpactLevel::Low => "🟢",
            ImpactLevel::Medium => "🟡",
            ImpactLevel::High => "🟠",
            ImpactLevel::Critical => "🔴",
        }
    }
}

/// Kind of finding an insight represents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Anomaly,
    Pattern,
    Prediction,
    Recommendation,
    MetaAnalysis,
}

impl fmt::Display for InsightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsightType::Anomaly => write!(f, "anomaly"),
            InsightType::Pattern => write!(f, "pattern"),
            InsightType::Prediction => write!(f, "prediction"),
            InsightType::Recommendation => write!(f, "recommendation"),
            InsightType::MetaAnalysis => write!(f, "meta_analysis"),
        }
    }
}

/// One stage of the onboarding funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStep {
    /// Display name of the step (e.g. "Email Verified").
    #[serde(alias = "step")]
    pub name: String,
    /// Number of users who reached this step.
    pub count: u64,
    /// Percentage of entry users who reached this step.
    pub conversion_rate: f64,
    /// Percentage of users lost since the previous step.
    pub drop_off_rate: f64,
}

impl FunnelStep {
    pub fn new(name: impl Into<String>, count: u64, conversion_rate: f64, drop_off_rate: f64) -> Self {
        Self {
            name: name.into(),
            count,
            conversion_rate,
            drop_off_rate,
        }
    }
}

/// Raw event count for a funnel step, before rates are derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStep {
    pub name: String,
    pub count: u64,
}

/// Coarse health label for the whole funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelHealth {
    Good,
    NeedsImprovement,
    Critical,
}

impl fmt::Display for FunnelHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunnelHealth::Good => write!(f, "good"),
            FunnelHealth::NeedsImprovement => write!(f, "needs improvement"),
            FunnelHealth::Critical => write!(f, "critical"),
        }
    }
}

/// Ordered sequence of funnel steps. The first step is the entry step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunnelSnapshot {
    steps: Vec<FunnelStep>,
}

impl FunnelSnapshot {
    pub fn new(steps: Vec<FunnelStep>) -> Self {
        Self { steps }
    }

    /// Build a snapshot from raw step counts.
    ///
    /// Conversion is measured against the first step, drop-off against the
    /// previous one. Both are rounded to two decimals and event names are
    /// humanized (`email_verified` becomes `Email Verified`).
    pub fn from_counts(raw: &[RawStep]) -> Self {
        let total_users = raw.first().map(|s| s.count).unwrap_or(0);

        let steps = raw
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let conversion_rate = if total_users > 0 {
                    step.count as f64 / total_users as f64 * 100.0
                } else {
                    0.0
                };

                let drop_off_rate = match i.checked_sub(1).map(|p| raw[p].count) {
                    Some(prev) if prev > 0 => (prev as f64 - step.count as f64) / prev as f64 * 100.0,
                    _ => 0.0,
                };

                FunnelStep::new(
                    humanize(&step.name),
                    step.count,
                    round2(conversion_rate),
                    round2(drop_off_rate),
                )
            })
            .collect();

        Self { steps }
    }

    /// Built-in onboarding funnel used for demos and as a fallback.
    pub fn sample() -> Self {
        let raw: Vec<RawStep> = [
            ("signup", 1000),
            ("email_verification", 800),
            ("tutorial_start", 600),
            ("tutorial_complete", 400),
            ("first_action", 300),
        ]
        .into_iter()
        .map(|(name, count)| RawStep {
            name: name.to_string(),
            count,
        })
        .collect();

        Self::from_counts(&raw)
    }

    pub fn steps(&self) -> &[FunnelStep] {
        &self.steps
    }

    /// Every step after the entry step.
    pub fn non_initial(&self) -> &[FunnelStep] {
        self.steps.get(1..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn contains_step(&self, name: &str) -> bool {
        self.steps.iter().any(|s| s.name == name)
    }

    /// Users who entered the funnel.
    pub fn total_users(&self) -> u64 {
        self.steps.first().map(|s| s.count).unwrap_or(0)
    }

    /// Percentage of entry users who reached the final step.
    pub fn final_conversion_rate(&self) -> f64 {
        match (self.steps.first(), self.steps.last()) {
            (Some(first), Some(last)) if first.count > 0 => {
                round2(last.count as f64 / first.count as f64 * 100.0)
            }
            _ => 0.0,
        }
    }

    pub fn health(&self) -> FunnelHealth {
        let conversion = self.final_conversion_rate();
        if conversion > 30.0 {
            FunnelHealth::Good
        } else if conversion > 15.0 {
            FunnelHealth::NeedsImprovement
        } else {
            FunnelHealth::Critical
        }
    }

    /// Check that every rate is finite and within `[0, 100]`.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(SnapshotError::UnnamedStep);
            }
            for (field, value) in [
                ("conversion_rate", step.conversion_rate),
                ("drop_off_rate", step.drop_off_rate),
            ] {
                if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                    return Err(SnapshotError::RateOutOfRange {
                        step: step.name.clone(),
                        field,
                        value,
                    });
                }
            }
        }
        Ok(())
    }
}

fn humanize(event: &str) -> String {
    event
        .split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A single structured finding emitted by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub insight_type: InsightType,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub description: String,
    pub impact_level: ImpactLevel,
    pub suggested_actions: Vec<String>,
    pub data_points: DataPoints,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    /// Create an insight with no actions or data points. Confidence is
    /// clamped to `[0, 1]`.
    pub fn new(
        insight_type: InsightType,
        confidence: f64,
        description: impl Into<String>,
        impact_level: ImpactLevel,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            insight_type,
            confidence,
            description: description.into(),
            impact_level,
            suggested_actions: Vec::new(),
            data_points: DataPoints::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggested_actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Attach data points. Non-object values are ignored.
    pub fn with_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.data_points = map;
        }
        self
    }

    /// The funnel step this insight refers to, if any.
    pub fn step(&self) -> Option<&str> {
        self.data_points.get("step").and_then(Value::as_str)
    }

    /// Priority = impact weight × confidence × recency (fixed at 1.0).
    pub fn priority_score(&self) -> f64 {
        const RECENCY_FACTOR: f64 = 1.0;
        self.impact_level.weight() * self.confidence * RECENCY_FACTOR
    }

    pub fn serialize(&self) -> SerializedInsight {
        SerializedInsight {
            insight_type: self.insight_type,
            confidence: self.confidence,
            description: self.description.clone(),
            impact_level: self.impact_level,
            suggested_actions: self.suggested_actions.clone(),
            data_points: self.data_points.clone(),
            created_at: self.created_at.to_rfc3339(),
            priority_score: self.priority_score(),
        }
    }
}

/// Flat, transport-friendly form of an [`Insight`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedInsight {
    pub insight_type: InsightType,
    pub confidence: f64,
    pub description: String,
    pub impact_level: ImpactLevel,
    pub suggested_actions: Vec<String>,
    pub data_points: DataPoints,
    /// ISO-8601 timestamp.
    pub created_at: String,
    pub priority_score: f64,
}

/// System-level collaboration metrics for one analysis round.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetaAnalysis {
    /// Fraction of agents that produced at least one insight.
    pub collaboration_score: f64,
    /// Agreement between agents on the number of critical issues.
    pub consensus_level: f64,
    /// Mean confidence level across agents.
    pub system_confidence: f64,
}

/// Output of one orchestrated analysis round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub total_insights: usize,
    pub insights_by_agent: BTreeMap<String, usize>,
    pub prioritized_insights: Vec<SerializedInsight>,
    pub agent_states: BTreeMap<String, AgentState>,
    pub meta_analysis: MetaAnalysis,
    pub generated_at: DateTime<Utc>,
}

/// Status line for one agent, as shown in reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusReport {
    pub kind: AgentKind,
    pub name: String,
    #[serde(flatten)]
    pub state: AgentState,
    pub insights_generated: usize,
    /// Description of the newest entry in the agent's insight log.
    pub latest_insight: Option<String>,
}

/// Aggregate health of the agent system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub all_agents_active: bool,
    pub average_agent_confidence: f64,
    pub total_decisions_made: u64,
}

/// Metadata about one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Snapshot file, or a note that the sample funnel was used.
    pub source: String,
    pub analysis_date: DateTime<Utc>,
    /// `orchestrator`, or the id of the single agent that ran.
    pub mode: String,
    pub rounds: usize,
    pub steps_analyzed: usize,
    /// Insights produced in the final round, before filtering.
    pub total_insights: usize,
    pub duration_seconds: f64,
}

/// Complete report for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub funnel: FunnelSnapshot,
    pub funnel_health: FunnelHealth,
    pub final_conversion_rate: f64,
    /// Absent when a single agent ran.
    pub meta_analysis: Option<MetaAnalysis>,
    pub insights_by_agent: BTreeMap<String, usize>,
    /// Ranked insights after filtering.
    pub insights: Vec<SerializedInsight>,
    pub agents: Vec<AgentStatusReport>,
    pub system_health: SystemHealth,
}
