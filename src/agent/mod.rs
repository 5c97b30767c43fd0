//! Analysis agents.
//!
//! Four agents look at the same funnel snapshot from different angles. They
//! share one lifecycle, driven by [`Agent::process`]: enter `analyzing`, run
//! the variant's analysis, then settle in `active` or `error`. A failed
//! round never propagates; it yields no insights and the agent recovers on
//! the next call.

pub mod anomaly;
pub mod isolation;
pub mod optimizer;
pub mod pattern;
pub mod predictive;
pub mod state;

pub use anomaly::AnomalyAgent;
pub use optimizer::OptimizerAgent;
pub use pattern::PatternAgent;
pub use predictive::PredictiveAgent;
pub use state::{AgentCore, AgentState, AgentStatus};

use crate::config::Config;
use crate::error::{AgentError, AgentResult};
use crate::models::{FunnelSnapshot, Insight};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error};

/// Snapshots shorter than this are a silent no-op for every agent.
pub const MIN_STEPS: usize = 2;

/// Identifies one of the four agents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Anomaly,
    Pattern,
    Predictive,
    Optimizer,
}

impl AgentKind {
    /// Every kind, in orchestration order.
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Anomaly,
        AgentKind::Pattern,
        AgentKind::Predictive,
        AgentKind::Optimizer,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            AgentKind::Anomaly => AnomalyAgent::ID,
            AgentKind::Pattern => PatternAgent::ID,
            AgentKind::Predictive => PredictiveAgent::ID,
            AgentKind::Optimizer => OptimizerAgent::ID,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AgentKind::Anomaly => AnomalyAgent::NAME,
            AgentKind::Pattern => PatternAgent::NAME,
            AgentKind::Predictive => PredictiveAgent::NAME,
            AgentKind::Optimizer => OptimizerAgent::NAME,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            AgentKind::Anomaly => "🔍",
            AgentKind::Pattern => "📈",
            AgentKind::Predictive => "🔮",
            AgentKind::Optimizer => "🛠️",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// One analysis agent.
pub enum Agent {
    Anomaly(AnomalyAgent),
    Pattern(PatternAgent),
    Predictive(PredictiveAgent),
    Optimizer(OptimizerAgent),
}

impl Agent {
    pub fn new(kind: AgentKind, config: &Config) -> Self {
        let limits = &config.general;
        match kind {
            AgentKind::Anomaly => Agent::Anomaly(AnomalyAgent::new(config.anomaly.clone(), limits)),
            AgentKind::Pattern => Agent::Pattern(PatternAgent::new(config.pattern.clone(), limits)),
            AgentKind::Predictive => {
                Agent::Predictive(PredictiveAgent::new(config.prediction.clone(), limits))
            }
            AgentKind::Optimizer => {
                Agent::Optimizer(OptimizerAgent::new(config.optimizer.clone(), limits))
            }
        }
    }

    pub fn kind(&self) -> AgentKind {
        match self {
            Agent::Anomaly(_) => AgentKind::Anomaly,
            Agent::Pattern(_) => AgentKind::Pattern,
            Agent::Predictive(_) => AgentKind::Predictive,
            Agent::Optimizer(_) => AgentKind::Optimizer,
        }
    }

    pub fn id(&self) -> &'static str {
        self.kind().id()
    }

    pub fn name(&self) -> &'static str {
        self.kind().display_name()
    }

    pub fn core(&self) -> &AgentCore {
        match self {
            Agent::Anomaly(a) => &a.core,
            Agent::Pattern(a) => &a.core,
            Agent::Predictive(a) => &a.core,
            Agent::Optimizer(a) => &a.core,
        }
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        match self {
            Agent::Anomaly(a) => &mut a.core,
            Agent::Pattern(a) => &mut a.core,
            Agent::Predictive(a) => &mut a.core,
            Agent::Optimizer(a) => &mut a.core,
        }
    }

    pub fn state(&self) -> &AgentState {
        self.core().state()
    }

    /// Put the agent in the error state after an abnormal exit from
    /// [`Agent::process`], such as a panic caught by the caller.
    pub fn mark_failed(&mut self) {
        self.core_mut().fail();
    }

    /// Run one analysis round over `snapshot`.
    pub async fn process(&mut self, snapshot: &FunnelSnapshot) -> Vec<Insight> {
        self.core_mut().begin();

        // let sibling agents interleave on the same runtime
        tokio::task::yield_now().await;

        if snapshot.len() < MIN_STEPS {
            debug!("{} skipped: snapshot has {} steps", self.id(), snapshot.len());
            // trend history still sees every well-formed snapshot
            if let Agent::Pattern(a) = self {
                if !snapshot.is_empty() && check_metrics(snapshot).is_ok() {
                    a.record(snapshot);
                }
            }
            self.core_mut().complete(&[], snapshot.len(), 0.0);
            return Vec::new();
        }

        match self.run(snapshot) {
            Ok(insights) => {
                let nudge = self.confidence_nudge();
                self.core_mut().complete(&insights, snapshot.len(), nudge);
                debug!("{} produced {} insights", self.id(), insights.len());
                insights
            }
            Err(e) => {
                error!("❌ {} failed: {}", self.name(), e);
                self.core_mut().fail();
                Vec::new()
            }
        }
    }

    fn run(&mut self, snapshot: &FunnelSnapshot) -> AgentResult<Vec<Insight>> {
        check_metrics(snapshot)?;

        match self {
            Agent::Anomaly(a) => a.analyze(snapshot),
            Agent::Pattern(a) => a.analyze(snapshot),
            Agent::Predictive(a) => a.analyze(snapshot),
            Agent::Optimizer(a) => a.analyze(snapshot),
        }
    }

    fn confidence_nudge(&self) -> f64 {
        match self {
            Agent::Anomaly(a) => a.confidence_nudge(),
            Agent::Pattern(a) => a.confidence_nudge(),
            Agent::Predictive(a) => a.confidence_nudge(),
            Agent::Optimizer(a) => a.confidence_nudge(),
        }
    }
}

/// Reject rates that are non-finite or outside `[0, 100]`.
fn check_metrics(snapshot: &FunnelSnapshot) -> AgentResult<()> {
    for step in snapshot.steps() {
        for (field, value) in [
            ("conversion_rate", step.conversion_rate),
            ("drop_off_rate", step.drop_off_rate),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(AgentError::InvalidMetric {
                    step: step.name.clone(),
                    field,
                    value,
                });
            }
        }
    }
    Ok(())
}
