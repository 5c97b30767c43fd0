//! Anomaly detection agent.
//!
//! Fits an isolation forest on the first snapshot that is long enough and
//! keeps it for the rest of the process lifetime. Every later snapshot is
//! scored against that model.

use super::isolation::{IsolationForest, Sample};
use super::state::AgentCore;
use crate::config::{AnomalyConfig, GeneralConfig};
use crate::error::AgentResult;
use crate::models::{FunnelSnapshot, FunnelStep, ImpactLevel, Insight, InsightType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Step metrics captured when the model was trained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub avg_dropoff: f64,
    pub avg_count: u64,
    pub established_at: DateTime<Utc>,
}

pub struct AnomalyAgent {
    pub(super) core: AgentCore,
    config: AnomalyConfig,
    model: Option<IsolationForest>,
    baseline_metrics: BTreeMap<String, Baseline>,
}

impl AnomalyAgent {
    pub const ID: &'static str = "anomaly_detector";
    pub const NAME: &'static str = "Anomaly Detection Agent";

    pub fn new(config: AnomalyConfig, limits: &GeneralConfig) -> Self {
        Self {
            core: AgentCore::new(Self::ID, limits),
            config,
            model: None,
            baseline_metrics: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    #[cfg(test)]
    pub fn baseline_metrics(&self) -> &BTreeMap<String, Baseline> {
        &self.baseline_metrics
    }

    pub(super) fn confidence_nudge(&self) -> f64 {
        self.config.confidence_nudge
    }

    pub(super) fn analyze(&mut self, snapshot: &FunnelSnapshot) -> AgentResult<Vec<Insight>> {
        let features: Vec<Sample> = snapshot.steps().iter().map(features).collect();

        if self.model.is_none() && features.len() >= self.config.min_training_steps {
            self.model = Some(IsolationForest::fit(&features, &self.config)?);
            self.establish_baseline(snapshot);
            info!("🤖 Anomaly detection model trained on {} steps", features.len());
        }

        let Some(model) = &self.model else {
            debug!("Anomaly model not trained yet, skipping scoring");
            return Ok(Vec::new());
        };

        let insights = snapshot
            .steps()
            .iter()
            .zip(&features)
            .filter_map(|(step, sample)| {
                let score = model.decision_function(sample);
                (score < 0.0).then(|| self.anomaly_insight(step, score))
            })
            .collect();

        Ok(insights)
    }

    fn establish_baseline(&mut self, snapshot: &FunnelSnapshot) {
        let now = Utc::now();
        for step in snapshot.steps() {
            self.baseline_metrics.insert(
                step.name.clone(),
                Baseline {
                    avg_dropoff: step.drop_off_rate,
                    avg_count: step.count,
                    established_at: now,
                },
            );
        }
    }

    fn anomaly_insight(&self, step: &FunnelStep, score: f64) -> Insight {
        let baseline_dropoff = self
            .baseline_metrics
            .get(&step.name)
            .map(|b| b.avg_dropoff)
            .unwrap_or(0.0);

        Insight::new(
            InsightType::Anomaly,
            score.abs().min(1.0),
            format!(
                "Unusual behavior detected in {}: Drop-off rate of {:.1}% is significantly different from normal patterns",
                step.name, step.drop_off_rate
            ),
            severity(score, &self.config),
        )
        .with_actions(anomaly_actions(&step.name))
        .with_data(json!({
            "step": step.name,
            "anomaly_score": score,
            "current_dropoff": step.drop_off_rate,
            "baseline_dropoff": baseline_dropoff,
        }))
    }
}

fn features(step: &FunnelStep) -> Sample {
    [step.count as f64, step.drop_off_rate, step.conversion_rate]
}

fn severity(score: f64, config: &AnomalyConfig) -> ImpactLevel {
    if score < config.critical_score {
        ImpactLevel::Critical
    } else if score < config.high_score {
        ImpactLevel::High
    } else {
        ImpactLevel::Medium
    }
}

fn anomaly_actions(step_name: &str) -> [&'static str; 3] {
    let name = step_name.to_lowercase();
    if name.contains("email") {
        [
            "Check email delivery rates and spam filters",
            "Review email verification flow for technical issues",
            "Implement alternative verification methods",
        ]
    } else if name.contains("tutorial") {
        [
            "Analyze tutorial completion heatmaps",
            "Check for UI/UX issues in tutorial steps",
            "Review user feedback during tutorial",
        ]
    } else {
        [
            "Investigate recent system changes or deployments",
            "Check for external factors affecting user behavior",
            "Review user support tickets for related issues",
        ]
    }
}
