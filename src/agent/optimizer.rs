//! Rule-based optimizer agent.
//!
//! Matches steps against a configurable rule table and looks for
//! bottlenecks across the whole funnel.

use super::state::AgentCore;
use crate::config::{GeneralConfig, OptimizationRule, OptimizerConfig};
use crate::error::AgentResult;
use crate::models::{FunnelSnapshot, FunnelStep, ImpactLevel, Insight, InsightType};
use serde_json::json;

pub struct OptimizerAgent {
    pub(super) core: AgentCore,
    config: OptimizerConfig,
}

impl OptimizerAgent {
    pub const ID: &'static str = "optimizer";
    pub const NAME: &'static str = "Autonomous Optimizer Agent";

    pub fn new(config: OptimizerConfig, limits: &GeneralConfig) -> Self {
        Self {
            core: AgentCore::new(Self::ID, limits),
            config,
        }
    }

    pub(super) fn confidence_nudge(&self) -> f64 {
        self.config.confidence_nudge
    }

    pub(super) fn analyze(&mut self, snapshot: &FunnelSnapshot) -> AgentResult<Vec<Insight>> {
        let mut insights = Vec::new();

        for step in snapshot.steps() {
            let key = if self.config.normalize_step_names {
                normalize(&step.name)
            } else {
                step.name.to_lowercase()
            };
            for rule in &self.config.rules {
                if key.contains(rule.key.as_str()) && step.drop_off_rate > rule.threshold {
                    insights.push(self.rule_insight(step, rule));
                }
            }
        }

        insights.extend(self.strategic_insight(snapshot));

        Ok(insights)
    }

    fn urgency(&self, dropoff: f64) -> ImpactLevel {
        if dropoff > self.config.critical_dropoff {
            ImpactLevel::Critical
        } else if dropoff > self.config.high_dropoff {
            ImpactLevel::High
        } else {
            ImpactLevel::Medium
        }
    }

    fn rule_insight(&self, step: &FunnelStep, rule: &OptimizationRule) -> Insight {
        Insight::new(
            InsightType::Recommendation,
            self.config.rule_confidence,
            format!(
                "Autonomous optimization recommendation for {}: Drop-off rate of {:.1}% exceeds threshold",
                step.name, step.drop_off_rate
            ),
            self.urgency(step.drop_off_rate),
        )
        .with_actions(rule.actions.iter().cloned())
        .with_data(json!({
            "step": step.name,
            "current_dropoff": step.drop_off_rate,
            "threshold": rule.threshold,
            "optimization_type": "rule_based",
            "estimated_improvement": "15-30%",
        }))
    }

    fn strategic_insight(&self, snapshot: &FunnelSnapshot) -> Option<Insight> {
        let later = snapshot.non_initial();
        if later.is_empty() {
            return None;
        }

        let average_dropoff = later.iter().map(|s| s.drop_off_rate).sum::<f64>() / later.len() as f64;
        let cutoff = average_dropoff * self.config.bottleneck_factor;

        let bottlenecks: Vec<&str> = snapshot
            .steps()
            .iter()
            .filter(|s| s.drop_off_rate > cutoff)
            .map(|s| s.name.as_str())
            .collect();

        if bottlenecks.len() < self.config.min_bottlenecks {
            return None;
        }

        Some(
            Insight::new(
                InsightType::Recommendation,
                self.config.strategic_confidence,
                format!(
                    "Strategic optimization needed: {} major bottlenecks detected. Focus on sequential optimization starting with highest-impact step.",
                    bottlenecks.len()
                ),
                ImpactLevel::Critical,
            )
            .with_actions([
                "Prioritize optimization of bottleneck steps in order of impact",
                "Implement A/B testing framework for optimization experiments",
                "Set up real-time monitoring for optimization results",
                "Create user feedback loops for each optimized step",
            ])
            .with_data(json!({
                "bottleneck_count": bottlenecks.len(),
                "bottleneck_steps": bottlenecks,
                "average_dropoff": average_dropoff,
                "optimization_strategy": "sequential_bottleneck_resolution",
            })),
        )
    }
}

/// Lower-case a step name and fold spaces and dashes into underscores, so
/// "Email Verification" can match the `email_verification` rule.
fn normalize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> OptimizerAgent {
        OptimizerAgent::new(OptimizerConfig::default(), &GeneralConfig::default())
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Email Verification"), "email_verification");
        assert_eq!(normalize("first-action"), "first_action");
        assert_eq!(normalize("tutorial_start"), "tutorial_start");
    }

    #[test]
    fn test_rule_matching_and_urgency() {
        let snapshot = FunnelSnapshot::new(vec![
            FunnelStep::new("signup", 1000, 100.0, 0.0),
            FunnelStep::new("email_verification", 450, 45.0, 55.0),
            FunnelStep::new("Tutorial Start", 315, 31.5, 30.0),
            FunnelStep::new("tutorial_complete", 173, 17.3, 45.0),
            FunnelStep::new("first_action", 154, 15.4, 11.1),
        ]);
        let insights = agent().analyze(&snapshot).unwrap();
        assert_eq!(insights.len(), 3);

        let email = insights.iter().find(|i| i.step() == Some("email_verification")).unwrap();
        assert_eq!(email.insight_type, InsightType::Recommendation);
        assert_eq!(email.impact_level, ImpactLevel::Critical);
        assert_eq!(email.confidence, 0.8);
        assert_eq!(email.suggested_actions[0], "Implement one-click email verification");
        assert_eq!(email.data_points["threshold"], json!(30.0));

        let started = insights.iter().find(|i| i.step() == Some("Tutorial Start")).unwrap();
        assert_eq!(started.impact_level, ImpactLevel::Medium);

        let completed = insights.iter().find(|i| i.step() == Some("tutorial_complete")).unwrap();
        assert_eq!(completed.impact_level, ImpactLevel::High);

        // below its 35% threshold
        assert!(insights.iter().all(|i| i.step() != Some("first_action")));
    }

    #[test]
    fn test_rule_keys_match_literally() {
        let snapshot = FunnelSnapshot::new(vec![
            FunnelStep::new("Signup", 1000, 100.0, 0.0),
            FunnelStep::new("First Action", 600, 60.0, 40.0),
        ]);

        // "first action" does not contain "first_action"
        assert!(agent().analyze(&snapshot).unwrap().is_empty());

        let mut normalizing = OptimizerAgent::new(
            OptimizerConfig {
                normalize_step_names: true,
                ..OptimizerConfig::default()
            },
            &GeneralConfig::default(),
        );
        let insights = normalizing.analyze(&snapshot).unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].step(), Some("First Action"));
        assert_eq!(insights[0].impact_level, ImpactLevel::Medium);
    }

    #[test]
    fn test_strategic_bottlenecks() {
        let snapshot = FunnelSnapshot::new(vec![
            FunnelStep::new("A", 1000, 100.0, 0.0),
            FunnelStep::new("B", 900, 90.0, 10.0),
            FunnelStep::new("C", 810, 81.0, 10.0),
            FunnelStep::new("D", 324, 32.4, 60.0),
            FunnelStep::new("E", 97, 9.7, 70.0),
        ]);
        let insights = agent().analyze(&snapshot).unwrap();

        assert_eq!(insights.len(), 1);
        let strategic = &insights[0];
        assert_eq!(strategic.impact_level, ImpactLevel::Critical);
        assert_eq!(strategic.confidence, 0.9);
        assert_eq!(strategic.data_points["bottleneck_steps"], json!(["D", "E"]));
        assert_eq!(strategic.data_points["average_dropoff"], json!(37.5));
        assert_eq!(strategic.suggested_actions.len(), 4);
    }

    #[test]
    fn test_single_bottleneck_is_not_strategic() {
        let snapshot = FunnelSnapshot::new(vec![
            FunnelStep::new("A", 1000, 100.0, 0.0),
            FunnelStep::new("B", 900, 90.0, 10.0),
            FunnelStep::new("C", 810, 81.0, 10.0),
            FunnelStep::new("D", 162, 16.2, 80.0),
        ]);
        assert!(agent().analyze(&snapshot).unwrap().is_empty());
    }
}
