//! Predictive agent.
//!
//! Stateless threshold model: every call classifies the current drop-off
//! rates into short-term predictions plus one whole-funnel health outlook.

use super::state::AgentCore;
use crate::config::{GeneralConfig, PredictionConfig};
use crate::error::AgentResult;
use crate::models::{FunnelSnapshot, FunnelStep, ImpactLevel, Insight, InsightType};
use serde_json::json;

pub struct PredictiveAgent {
    pub(super) core: AgentCore,
    config: PredictionConfig,
}

impl PredictiveAgent {
    pub const ID: &'static str = "predictor";
    pub const NAME: &'static str = "Predictive Analysis Agent";

    pub fn new(config: PredictionConfig, limits: &GeneralConfig) -> Self {
        Self {
            core: AgentCore::new(Self::ID, limits),
            config,
        }
    }

    pub(super) fn confidence_nudge(&self) -> f64 {
        self.config.confidence_nudge
    }

    pub(super) fn analyze(&mut self, snapshot: &FunnelSnapshot) -> AgentResult<Vec<Insight>> {
        let mut insights: Vec<Insight> = snapshot
            .non_initial()
            .iter()
            .filter_map(|step| self.predict_step(step))
            .collect();

        insights.extend(self.predict_funnel(snapshot));

        Ok(insights)
    }

    fn predict_step(&self, step: &FunnelStep) -> Option<Insight> {
        let cfg = &self.config;
        let dropoff = step.drop_off_rate;

        let (outlook, confidence, impact, actions) = if dropoff > cfg.critical_dropoff {
            (
                "If no action taken, expect 10-20% further degradation",
                cfg.critical_confidence,
                ImpactLevel::Critical,
                [
                    format!("Immediate intervention required for {}", step.name),
                    "Implement emergency fixes within 48 hours".to_string(),
                    "Monitor performance hourly until stabilized".to_string(),
                ],
            )
        } else if dropoff > cfg.high_dropoff {
            (
                "Performance likely to worsen without optimization",
                cfg.high_confidence,
                ImpactLevel::High,
                [
                    format!("Schedule optimization work for {} within next week", step.name),
                    "Prepare A/B tests for alternative approaches".to_string(),
                    "Increase monitoring frequency".to_string(),
                ],
            )
        } else if dropoff < cfg.low_dropoff {
            (
                "Performance likely to remain stable or improve",
                cfg.low_confidence,
                ImpactLevel::Low,
                [
                    format!("Maintain current approach for {}", step.name),
                    "Consider using this step as a template for others".to_string(),
                    "Continue standard monitoring".to_string(),
                ],
            )
        } else {
            return None;
        };

        Some(
            Insight::new(
                InsightType::Prediction,
                confidence,
                format!("Prediction for {}: {}", step.name, outlook),
                impact,
            )
            .with_actions(actions)
            .with_data(json!({
                "step": step.name,
                "current_dropoff": dropoff,
                "prediction_horizon": cfg.step_horizon,
                "confidence_score": confidence,
            })),
        )
    }

    fn predict_funnel(&self, snapshot: &FunnelSnapshot) -> Option<Insight> {
        let cfg = &self.config;
        let later = snapshot.non_initial();
        if later.is_empty() {
            return None;
        }

        let mean_dropoff = later.iter().map(|s| s.drop_off_rate).sum::<f64>() / later.len() as f64;
        let health_score = 100.0 - mean_dropoff;

        let (outlook, impact, confidence) = if health_score < cfg.health_critical {
            (
                "Funnel performance expected to decline significantly without intervention",
                ImpactLevel::Critical,
                cfg.health_critical_confidence,
            )
        } else if health_score < cfg.health_high {
            (
                "Funnel performance may decline without optimization efforts",
                ImpactLevel::High,
                cfg.health_high_confidence,
            )
        } else if health_score > cfg.health_good {
            (
                "Funnel performance expected to remain strong or improve",
                ImpactLevel::Low,
                cfg.health_good_confidence,
            )
        } else {
            return None;
        };

        Some(
            Insight::new(
                InsightType::Prediction,
                confidence,
                format!("Overall funnel prediction: {}", outlook),
                impact,
            )
            .with_actions([
                "Focus on steps with highest drop-off rates",
                "Implement comprehensive monitoring dashboard",
                "Plan quarterly funnel optimization reviews",
            ])
            .with_data(json!({
                "current_conversion_rate": snapshot.final_conversion_rate(),
                "health_score": health_score,
                "prediction_horizon": cfg.funnel_horizon,
                "confidence_score": confidence,
            })),
        )
    }
}
