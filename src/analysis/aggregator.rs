//! Insight aggregation and system metrics.
//!
//! Pure functions over the per-agent results of one round: consensus
//! detection, priority ranking, and the collaboration statistics reported
//! alongside the ranked insights.

use crate::agent::{AgentKind, AgentState, AgentStatus};
use crate::config::RankingConfig;
use crate::models::{FunnelSnapshot, ImpactLevel, Insight, InsightType, SerializedInsight, SystemHealth};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

/// Insights produced by one agent in one round.
pub type AgentOutput = (AgentKind, Vec<Insight>);

/// Synthesize a meta-analysis insight for every funnel step that at least
/// `consensus_min_agents` distinct agents flagged as critical.
pub fn consensus_insights(
    results: &[AgentOutput],
    snapshot: &FunnelSnapshot,
    total_agents: usize,
    config: &RankingConfig,
) -> Vec<Insight> {
    // first-seen order keeps the output deterministic
    let mut flagged: Vec<(&str, BTreeSet<AgentKind>)> = Vec::new();

    for (kind, insights) in results {
        let critical_steps = insights
            .iter()
            .filter(|i| i.impact_level == ImpactLevel::Critical)
            .filter_map(Insight::step);

        for step in critical_steps {
            match flagged.iter_mut().find(|(s, _)| *s == step) {
                Some((_, agents)) => {
                    agents.insert(*kind);
                }
                None => flagged.push((step, BTreeSet::from([*kind]))),
            }
        }
    }

    flagged
        .into_iter()
        .filter(|(step, agents)| agents.len() >= config.consensus_min_agents && snapshot.contains_step(step))
        .map(|(step, agents)| {
            let agreement = agents.len() as f64 / total_agents.max(1) as f64;
            let agent_ids: Vec<&str> = agents.iter().map(AgentKind::id).collect();

            Insight::new(
                InsightType::MetaAnalysis,
                config.meta_confidence,
                format!(
                    "Multi-agent consensus: Critical issues detected in {}. {} agents independently flagged this step.",
                    step,
                    agents.len()
                ),
                ImpactLevel::Critical,
            )
            .with_actions([
                format!("Immediate attention required for {}", step),
                "Deploy emergency response team".to_string(),
                "Implement hourly monitoring".to_string(),
                "Prepare rollback procedures if needed".to_string(),
            ])
            .with_data(json!({
                "step": step,
                "consensus_agents": agents.len(),
                "agreeing_agents": agent_ids,
                "agent_agreement_score": agreement,
                "meta_analysis_type": "consensus_critical",
            }))
        })
        .collect()
}

/// Sort by priority score, highest first. Ties keep their input order.
pub fn prioritize(mut insights: Vec<Insight>) -> Vec<Insight> {
    insights.sort_by(|a, b| b.priority_score().total_cmp(&a.priority_score()));
    insights
}

/// Share of agents that produced at least one insight.
pub fn collaboration_score(results: &[AgentOutput], total_agents: usize) -> f64 {
    if total_agents == 0 {
        return 0.0;
    }
    let active = results.iter().filter(|(_, insights)| !insights.is_empty()).count();
    (active as f64 / total_agents as f64).min(1.0)
}

/// How closely agents agree on the number of critical issues.
///
/// One minus the coefficient of variation of per-agent critical counts,
/// floored at zero. Agreeing that nothing is critical is full consensus.
pub fn consensus_level(results: &[AgentOutput]) -> f64 {
    if results.is_empty() {
        return 0.5;
    }

    let counts: Vec<f64> = results
        .iter()
        .map(|(_, insights)| {
            insights
                .iter()
                .filter(|i| i.impact_level == ImpactLevel::Critical)
                .count() as f64
        })
        .collect();

    let n = counts.len() as f64;
    let mean = counts.iter().sum::<f64>() / n;
    if mean == 0.0 {
        return 1.0;
    }

    let variance = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    (1.0 - (variance.sqrt() / mean).min(1.0)).max(0.0)
}

/// Mean confidence level across agents.
pub fn system_confidence<'a>(states: impl IntoIterator<Item = &'a AgentState>) -> f64 {
    let (sum, n) = states
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), s| (sum + s.confidence_level, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Health summary. An agent mid-round counts as active.
pub fn system_health<'a>(states: impl IntoIterator<Item = &'a AgentState>) -> SystemHealth {
    let states: Vec<&AgentState> = states.into_iter().collect();

    let all_active = !states.is_empty()
        && states
            .iter()
            .all(|s| matches!(s.status, AgentStatus::Active | AgentStatus::Analyzing));

    SystemHealth {
        all_agents_active: all_active,
        average_agent_confidence: system_confidence(states.iter().copied()),
        total_decisions_made: states.iter().map(|s| s.decisions_made).sum(),
    }
}

/// Narrow ranked insights by type and minimum impact, keeping rank order,
/// then cap the list at `limit`.
pub fn filter_insights(
    ranked: Vec<SerializedInsight>,
    insight_type: Option<InsightType>,
    min_impact: Option<ImpactLevel>,
    limit: Option<usize>,
) -> Vec<SerializedInsight> {
    ranked
        .into_iter()
        .filter(|i| insight_type.map_or(true, |t| i.insight_type == t))
        .filter(|i| min_impact.map_or(true, |level| i.impact_level >= level))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Count ranked insights per impact level.
pub fn impact_breakdown(insights: &[SerializedInsight]) -> BTreeMap<ImpactLevel, usize> {
    let mut counts = BTreeMap::new();
    for insight in insights {
        *counts.entry(insight.impact_level).or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FunnelStep;

    fn critical(step: &str) -> Insight {
        Insight::new(InsightType::Anomaly, 0.9, "critical", ImpactLevel::Critical)
            .with_data(json!({ "step": step }))
    }

    fn insight(impact: ImpactLevel, confidence: f64, label: &str) -> Insight {
        Insight::new(InsightType::Pattern, confidence, label, impact)
    }

    fn snapshot() -> FunnelSnapshot {
        FunnelSnapshot::new(vec![
            FunnelStep::new("Signup", 1000, 100.0, 0.0),
            FunnelStep::new("Email Verified", 300, 30.0, 70.0),
            FunnelStep::new("Done", 100, 10.0, 66.7),
        ])
    }

    #[test]
    fn test_consensus_across_two_agents() {
        let results = vec![
            (AgentKind::Anomaly, vec![critical("Email Verified")]),
            (AgentKind::Pattern, vec![]),
            (AgentKind::Predictive, vec![critical("Email Verified")]),
            (AgentKind::Optimizer, vec![]),
        ];

        let meta = consensus_insights(&results, &snapshot(), 4, &RankingConfig::default());

        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].insight_type, InsightType::MetaAnalysis);
        assert_eq!(meta[0].step(), Some("Email Verified"));
        assert_eq!(meta[0].confidence, 0.95);
        assert_eq!(meta[0].data_points["agent_agreement_score"], json!(0.5));
        assert_eq!(meta[0].data_points["agreeing_agents"], json!(["anomaly_detector", "predictor"]));
    }

    #[test]
    fn test_same_agent_twice_is_not_consensus() {
        let results = vec![
            (AgentKind::Optimizer, vec![critical("Done"), critical("Done")]),
            (AgentKind::Anomaly, vec![]),
        ];
        assert!(consensus_insights(&results, &snapshot(), 4, &RankingConfig::default()).is_empty());
    }

    #[test]
    fn test_consensus_ignores_stepless_and_unknown_steps() {
        let stepless = Insight::new(InsightType::Pattern, 0.8, "overall", ImpactLevel::Critical);
        let results = vec![
            (AgentKind::Pattern, vec![stepless.clone(), critical("Checkout")]),
            (AgentKind::Optimizer, vec![stepless, critical("Checkout")]),
        ];
        assert!(consensus_insights(&results, &snapshot(), 4, &RankingConfig::default()).is_empty());
    }

    #[test]
    fn test_prioritize_is_stable() {
        let ranked = prioritize(vec![
            insight(ImpactLevel::Low, 1.0, "low"),
            insight(ImpactLevel::High, 0.5, "first tie"),
            insight(ImpactLevel::Critical, 0.9, "critical"),
            insight(ImpactLevel::Medium, 0.75, "second tie"),
        ]);

        let order: Vec<_> = ranked.iter().map(|i| i.description.as_str()).collect();
        assert_eq!(order, ["critical", "first tie", "second tie", "low"]);
    }

    #[test]
    fn test_collaboration_score() {
        let results = vec![
            (AgentKind::Anomaly, vec![]),
            (AgentKind::Pattern, vec![]),
            (AgentKind::Predictive, vec![insight(ImpactLevel::Low, 0.6, "stable")]),
            (AgentKind::Optimizer, vec![]),
        ];
        assert_eq!(collaboration_score(&results, 4), 0.25);
        assert_eq!(collaboration_score(&[], 0), 0.0);
    }

    #[test]
    fn test_consensus_level() {
        let quiet = vec![(AgentKind::Anomaly, vec![]), (AgentKind::Pattern, vec![])];
        assert_eq!(consensus_level(&quiet), 1.0);
        assert_eq!(consensus_level(&[]), 0.5);

        // counts [1, 1]: no spread
        let even = vec![
            (AgentKind::Anomaly, vec![critical("Done")]),
            (AgentKind::Pattern, vec![critical("Done")]),
        ];
        assert_eq!(consensus_level(&even), 1.0);

        // counts [2, 0]: mean 1, std 1
        let split = vec![
            (AgentKind::Anomaly, vec![critical("Done"), critical("Signup")]),
            (AgentKind::Pattern, vec![]),
        ];
        assert_eq!(consensus_level(&split), 0.0);
    }

    #[test]
    fn test_system_health() {
        let mut active = AgentState::new("optimizer");
        active.status = AgentStatus::Active;
        active.confidence_level = 0.7;
        active.decisions_made = 3;

        let idle = AgentState::new("predictor");

        let health = system_health([&active, &idle]);
        assert!(!health.all_agents_active);
        assert!((health.average_agent_confidence - 0.6).abs() < 1e-9);
        assert_eq!(health.total_decisions_made, 3);

        assert!(system_health([&active]).all_agents_active);
    }

    #[test]
    fn test_filter_insights() {
        let ranked: Vec<_> = prioritize(vec![
            insight(ImpactLevel::Critical, 0.9, "a"),
            critical("Done"),
            insight(ImpactLevel::Medium, 0.9, "b"),
            insight(ImpactLevel::Low, 0.9, "c"),
        ])
        .iter()
        .map(Insight::serialize)
        .collect();

        let patterns = filter_insights(ranked.clone(), Some(InsightType::Pattern), None, None);
        assert_eq!(patterns.len(), 3);

        let serious = filter_insights(ranked.clone(), None, Some(ImpactLevel::Medium), None);
        assert_eq!(serious.len(), 3);
        assert!(serious.iter().all(|i| i.impact_level >= ImpactLevel::Medium));

        let top = filter_insights(ranked, Some(InsightType::Pattern), None, Some(1));
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].description, "a");
    }

    #[test]
    fn test_impact_breakdown() {
        let ranked: Vec<_> = [ImpactLevel::High, ImpactLevel::Critical, ImpactLevel::High]
            .into_iter()
            .map(|level| insight(level, 0.5, "x").serialize())
            .collect();

        let breakdown = impact_breakdown(&ranked);
        assert_eq!(breakdown[&ImpactLevel::High], 2);
        assert_eq!(breakdown[&ImpactLevel::Critical], 1);
        assert!(!breakdown.contains_key(&ImpactLevel::Low));
    }
}
