//! Multi-agent orchestration.
//!
//! Fans a snapshot out to every agent concurrently, waits for all of them,
//! then merges, ranks and summarizes their output.

use super::aggregator::{self, AgentOutput};
use crate::agent::{Agent, AgentKind};
use crate::config::{Config, RankingConfig};
use crate::models::{AgentStatusReport, AnalysisResult, FunnelSnapshot, Insight, MetaAnalysis, SystemHealth};
use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{error, info};

/// Owns the agents and runs analysis rounds over them.
pub struct Orchestrator {
    agents: Vec<Agent>,
    ranking: RankingConfig,
}

impl Orchestrator {
    pub fn new(config: &Config) -> Self {
        Self {
            agents: AgentKind::ALL.iter().map(|&kind| Agent::new(kind, config)).collect(),
            ranking: config.ranking.clone(),
        }
    }

    #[cfg(test)]
    pub fn agent(&self, kind: AgentKind) -> Option<&Agent> {
        self.agents.iter().find(|a| a.kind() == kind)
    }

    /// Run every agent over `snapshot` and merge the results.
    pub async fn analyze(&mut self, snapshot: &FunnelSnapshot) -> AnalysisResult {
        info!("🤖 Starting multi-agent analysis over {} steps", snapshot.len());

        let results: Vec<AgentOutput> = join_all(self.agents.iter_mut().map(|agent| async move {
            let kind = agent.kind();
            let insights = run_contained(agent, snapshot).await;
            info!("✅ Agent {} generated {} insights", kind, insights.len());
            (kind, insights)
        }))
        .await;

        let total_agents = self.agents.len();
        let meta = aggregator::consensus_insights(&results, snapshot, total_agents, &self.ranking);
        if !meta.is_empty() {
            info!("🤝 {} consensus insights derived", meta.len());
        }

        let meta_analysis = MetaAnalysis {
            collaboration_score: aggregator::collaboration_score(&results, total_agents),
            consensus_level: aggregator::consensus_level(&results),
            system_confidence: aggregator::system_confidence(self.agents.iter().map(Agent::state)),
        };

        let insights_by_agent = results
            .iter()
            .map(|(kind, insights)| (kind.id().to_string(), insights.len()))
            .collect();

        let combined: Vec<Insight> = results
            .into_iter()
            .flat_map(|(_, insights)| insights)
            .chain(meta)
            .collect();
        let total_insights = combined.len();

        let prioritized_insights = aggregator::prioritize(combined)
            .iter()
            .take(self.ranking.top_n)
            .map(Insight::serialize)
            .collect();

        AnalysisResult {
            total_insights,
            insights_by_agent,
            prioritized_insights,
            agent_states: self
                .agents
                .iter()
                .map(|a| (a.id().to_string(), a.state().clone()))
                .collect(),
            meta_analysis,
            generated_at: Utc::now(),
        }
    }

    /// Run a single agent without consensus or ranking.
    pub async fn run_agent(&mut self, kind: AgentKind, snapshot: &FunnelSnapshot) -> Vec<Insight> {
        match self.agents.iter_mut().find(|a| a.kind() == kind) {
            Some(agent) => run_contained(agent, snapshot).await,
            None => Vec::new(),
        }
    }

    pub fn status_reports(&self) -> Vec<AgentStatusReport> {
        self.agents
            .iter()
            .map(|a| AgentStatusReport {
                kind: a.kind(),
                name: a.name().to_string(),
                state: a.state().clone(),
                insights_generated: a.core().insights_generated(),
                latest_insight: a.core().insight_log().last().map(|i| i.description.clone()),
            })
            .collect()
    }

    pub fn system_health(&self) -> SystemHealth {
        aggregator::system_health(self.agents.iter().map(Agent::state))
    }
}

/// Run one agent round. A panic inside the agent is caught here, leaving the
/// agent in the error state with no insights.
async fn run_contained(agent: &mut Agent, snapshot: &FunnelSnapshot) -> Vec<Insight> {
    let outcome = AssertUnwindSafe(agent.process(snapshot)).catch_unwind().await;
    settle(agent, outcome.ok())
}

/// `None` means the round panicked.
fn settle(agent: &mut Agent, outcome: Option<Vec<Insight>>) -> Vec<Insight> {
    match outcome {
        Some(insights) => insights,
        None => {
            error!("❌ Agent {} panicked, recording no insights", agent.kind());
            agent.mark_failed();
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentStatus;
    use crate::models::{FunnelStep, ImpactLevel, InsightType};

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(&Config::default())
    }
    fn tutorial_funnel() -> FunnelSnapshot {
        FunnelSnapshot::new(vec![
            FunnelStep::new("Signup", 1000, 100.0, 0.0),
            FunnelStep::new("Email Verified", 800, 80.0, 20.0),
            FunnelStep::new("Tutorial", 600, 60.0, 25.0),
            FunnelStep::new("Done", 100, 10.0, 83.3),
        ])
    }

    #[tokio::test]
    async fn test_two_step_snapshot_metrics() {
        let mut orch = orchestrator();
        let snapshot = FunnelSnapshot::new(vec![
            FunnelStep::new("A", 100, 100.0, 0.0),
            FunnelStep::new("B", 90, 90.0, 10.0),
        ]);

        let result = orch.analyze(&snapshot).await;

        // only the predictor speaks: a healthy-funnel outlook
        assert_eq!(result.total_insights, 1);
        assert_eq!(result.insights_by_agent["predictor"], 1);
        assert_eq!(result.insights_by_agent["anomaly_detector"], 0);
        assert_eq!(result.meta_analysis.collaboration_score, 0.25);
        assert_eq!(result.meta_analysis.consensus_level, 1.0);
        assert_eq!(result.agent_states.len(), 4);
    }

    #[tokio::test]
    async fn test_ranked_output_is_sorted_and_capped() {
        let mut orch = orchestrator();
        let result = orch.analyze(&tutorial_funnel()).await;

        assert!(result.prioritized_insights.len() <= 10);
        assert_eq!(result.prioritized_insights.len(), result.total_insights.min(10));
        assert!(result
            .prioritized_insights
            .windows(2)
            .all(|w| w[0].priority_score >= w[1].priority_score));
    }

    #[tokio::test]
    async fn test_consensus_comes_from_distinct_agents() {
        let mut orch = orchestrator();
        // predictor and optimizer both call the verification step critical
        let snapshot = FunnelSnapshot::new(vec![
            FunnelStep::new("Signup", 1000, 100.0, 0.0),
            FunnelStep::new("email_verification", 300, 30.0, 70.0),
            FunnelStep::new("Tutorial", 270, 27.0, 10.0),
            FunnelStep::new("Done", 250, 25.0, 7.4),
        ]);
        let result = orch.analyze(&snapshot).await;

        let metas: Vec<_> = result
            .prioritized_insights
            .iter()
            .filter(|i| i.insight_type == InsightType::MetaAnalysis)
            .collect();

        assert_eq!(metas.len(), 1);
        let meta = metas[0];
        assert_eq!(meta.impact_level, ImpactLevel::Critical);
        assert_eq!(meta.data_points["step"], "email_verification");
        assert_eq!(meta.data_points["consensus_agents"], 2);
        assert_eq!(meta.data_points["agent_agreement_score"].as_f64(), Some(0.5));
        assert_eq!(
            meta.data_points["agreeing_agents"],
            serde_json::json!(["predictor", "optimizer"])
        );

        // the tutorial funnel has no step two agents agree on
        let quiet = orch.analyze(&tutorial_funnel()).await;
        assert!(quiet
            .prioritized_insights
            .iter()
            .all(|i| i.insight_type != InsightType::MetaAnalysis));
    }

    #[tokio::test]
    async fn test_repeated_rounds_advance_state() {
        let mut orch = orchestrator();
        let snapshot = tutorial_funnel();

        let first = orch.analyze(&snapshot).await;
        let second = orch.analyze(&snapshot).await;

        for (id, before) in &first.agent_states {
            let after = &second.agent_states[id];
            assert!(after.decisions_made >= before.decisions_made);
            assert!(after.last_action > before.last_action);
        }
    }

    #[tokio::test]
    async fn test_invalid_snapshot_degrades_and_recovers() {
        let mut orch = orchestrator();
        let broken = FunnelSnapshot::new(vec![
            FunnelStep::new("Signup", 1000, 100.0, 0.0),
            FunnelStep::new("Email", 500, f64::INFINITY, 50.0),
        ]);

        let result = orch.analyze(&broken).await;
        assert_eq!(result.total_insights, 0);
        assert_eq!(result.meta_analysis.collaboration_score, 0.0);
        assert!(result.agent_states.values().all(|s| s.status == AgentStatus::Error));
        assert!(!orch.system_health().all_agents_active);

        orch.analyze(&tutorial_funnel()).await;
        assert!(orch.system_health().all_agents_active);
    }

    #[tokio::test]
    async fn test_panicking_round_marks_agent_failed() {
        let mut agent = Agent::new(AgentKind::Anomaly, &Config::default());
        let outcome = std::panic::catch_unwind(|| -> Vec<Insight> { panic!("scoring blew up") });

        assert!(settle(&mut agent, outcome.ok()).is_empty());
        assert_eq!(agent.state().status, AgentStatus::Error);

        // a clean round still passes its insights through
        let insights = run_contained(&mut agent, &tutorial_funnel()).await;
        assert_eq!(settle(&mut agent, Some(insights.clone())), insights);
        assert_eq!(agent.state().status, AgentStatus::Active);
    }

    #[tokio::test]
    async fn test_run_agent_contains_extreme_rates() {
        let mut orch = orchestrator();
        let extreme = FunnelSnapshot::new(vec![
            FunnelStep::new("A", 1000, -1e308, 0.0),
            FunnelStep::new("B", 500, 1e308, 50.0),
            FunnelStep::new("C", 250, 5.0, 50.0),
        ]);

        assert!(orch.run_agent(AgentKind::Anomaly, &extreme).await.is_empty());
        assert_eq!(orch.agent(AgentKind::Anomaly).unwrap().state().status, AgentStatus::Error);

        orch.run_agent(AgentKind::Anomaly, &tutorial_funnel()).await;
        assert_eq!(orch.agent(AgentKind::Anomaly).unwrap().state().status, AgentStatus::Active);
    }

    #[tokio::test]
    async fn test_run_agent_and_status() {
        let mut orch = orchestrator();
        let insights = orch.run_agent(AgentKind::Optimizer, &FunnelSnapshot::sample()).await;

        let optimizer = orch.agent(AgentKind::Optimizer).unwrap();
        assert_eq!(optimizer.state().status, AgentStatus::Active);
        assert_eq!(optimizer.core().insights_generated(), insights.len());

        // the other agents were not touched
        assert_eq!(orch.agent(AgentKind::Anomaly).unwrap().state().status, AgentStatus::Idle);

        let reports = orch.status_reports();
        assert_eq!(reports.len(), 4);
        assert_eq!(reports[3].name, "Autonomous Optimizer Agent");
        assert_eq!(reports[3].insights_generated, insights.len());
        assert_eq!(
            reports[3].latest_insight.as_deref(),
            insights.last().map(|i| i.description.as_str())
        );
        assert_eq!(reports[0].latest_insight, None);
    }
}
