//! Pattern analysis agent.
//!
//! Keeps a rolling window of observed snapshots and fits a linear trend to
//! each step's drop-off rate once enough history exists.

use super::state::{push_bounded, AgentCore};
use crate::config::{GeneralConfig, PatternConfig};
use crate::error::{AgentError, AgentResult};
use crate::models::{FunnelSnapshot, ImpactLevel, Insight, InsightType};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone)]
struct Observation {
    timestamp: DateTime<Utc>,
    snapshot: FunnelSnapshot,
}

pub struct PatternAgent {
    pub(super) core: AgentCore,
    config: PatternConfig,
    history: VecDeque<Observation>,
}

impl PatternAgent {
    pub const ID: &'static str = "pattern_analyzer";
    pub const NAME: &'static str = "Pattern Analysis Agent";

    pub fn new(config: PatternConfig, limits: &GeneralConfig) -> Self {
        Self {
            core: AgentCore::new(Self::ID, limits),
            config,
            history: VecDeque::new(),
        }
    }

    #[cfg(test)]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub(super) fn confidence_nudge(&self) -> f64 {
        self.config.confidence_nudge
    }

    /// Append a snapshot to the trend history, evicting the oldest past the cap.
    pub(super) fn record(&mut self, snapshot: &FunnelSnapshot) {
        push_bounded(
            &mut self.history,
            Observation {
                timestamp: Utc::now(),
                snapshot: snapshot.clone(),
            },
            self.config.history_size,
        );
    }

    pub(super) fn analyze(&mut self, snapshot: &FunnelSnapshot) -> AgentResult<Vec<Insight>> {
        self.record(snapshot);

        let mut insights = Vec::new();

        if self.history.len() >= self.config.min_history {
            insights.extend(self.detect_trends(snapshot)?);
        } else {
            debug!(
                "Pattern history has {} of {} observations since {:?}, skipping trends",
                self.history.len(),
                self.config.min_history,
                self.history.front().map(|o| o.timestamp)
            );
        }

        insights.extend(self.overall_pattern(snapshot));

        Ok(insights)
    }

    /// Drop-off series per step name, in order of first appearance.
    fn dropoff_series(&self) -> Vec<(String, Vec<f64>)> {
        let mut series: Vec<(String, Vec<f64>)> = Vec::new();

        for observation in &self.history {
            for step in observation.snapshot.steps() {
                match series.iter_mut().find(|(name, _)| *name == step.name) {
                    Some((_, values)) => values.push(step.drop_off_rate),
                    None => series.push((step.name.clone(), vec![step.drop_off_rate])),
                }
            }
        }

        series
    }

    fn detect_trends(&self, snapshot: &FunnelSnapshot) -> AgentResult<Vec<Insight>> {
        let mut insights = Vec::new();

        for (step_name, values) in self.dropoff_series() {
            // only report on steps the caller can act on
            if values.len() < self.config.min_series_points || !snapshot.contains_step(&step_name) {
                continue;
            }

            let slope = linear_slope(&values).ok_or_else(|| AgentError::DegenerateSeries(step_name.clone()))?;
            if slope.abs() <= self.config.significant_slope {
                continue;
            }

            let direction = if slope > 0.0 { "increasing" } else { "decreasing" };
            let impact = if slope.abs() > self.config.critical_slope {
                ImpactLevel::Critical
            } else if slope.abs() > self.config.high_slope {
                ImpactLevel::High
            } else {
                ImpactLevel::Medium
            };

            let window = self.config.recent_window.clamp(1, values.len());
            let recent = &values[values.len() - window..];
            let recent_average = recent.iter().sum::<f64>() / recent.len() as f64;

            insights.push(
                Insight::new(
                    InsightType::Pattern,
                    slope.abs() / self.config.full_confidence_slope,
                    format!(
                        "Trend detected in {}: {} drop-off rate with slope of {:.2} over recent observations",
                        step_name, direction, slope
                    ),
                    impact,
                )
                .with_actions(trend_actions(&step_name, slope > 0.0))
                .with_data(json!({
                    "step": step_name,
                    "trend_slope": slope,
                    "trend_direction": direction,
                    "recent_average": recent_average,
                })),
            );
        }

        Ok(insights)
    }

    fn overall_pattern(&self, snapshot: &FunnelSnapshot) -> Option<Insight> {
        let (first, last) = (snapshot.steps().first()?, snapshot.steps().last()?);
        if first.count == 0 {
            return None;
        }

        let overall_conversion = last.count as f64 / first.count as f64 * 100.0;
        if overall_conversion >= self.config.low_conversion {
            return None;
        }

        let total_users: u64 = snapshot.steps().iter().map(|s| s.count).sum();
        let bottlenecks: Vec<&str> = snapshot
            .steps()
            .iter()
            .filter(|s| s.drop_off_rate > self.config.bottleneck_dropoff)
            .map(|s| s.name.as_str())
            .collect();

        Some(
            Insight::new(
                InsightType::Pattern,
                self.config.overall_confidence,
                format!(
                    "Low overall conversion pattern detected: {:.1}%. This suggests systematic issues in the onboarding flow.",
                    overall_conversion
                ),
                ImpactLevel::Critical,
            )
            .with_actions([
                "Conduct comprehensive user journey mapping",
                "Implement exit-intent surveys at each step",
                "A/B test simplified onboarding flows",
                "Analyze user feedback for common pain points",
            ])
            .with_data(json!({
                "overall_conversion": overall_conversion,
                "total_users_analyzed": total_users,
                "bottleneck_steps": bottlenecks,
            })),
        )
    }
}

/// Least-squares slope of `values` against their index.
fn linear_slope(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }

    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let (num, den) = values.iter().enumerate().fold((0.0, 0.0), |(num, den), (i, y)| {
        let dx = i as f64 - mean_x;
        (num + dx * (y - mean_y), den + dx * dx)
    });

    let slope = num / den;
    slope.is_finite().then_some(slope)
}

fn trend_actions(step_name: &str, worsening: bool) -> Vec<String> {
    if worsening {
        vec![
            format!("Investigate root cause of worsening performance in {}", step_name),
            "Check for recent changes or external factors".to_string(),
            "Implement immediate fixes if technical issues found".to_string(),
        ]
    } else {
        vec![
            format!("Analyze what's driving improvement in {}", step_name),
            "Document successful changes for replication".to_string(),
            "Consider applying similar optimizations to other steps".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FunnelStep;

    fn agent() -> PatternAgent {
        PatternAgent::new(PatternConfig::default(), &GeneralConfig::default())
    }

    /// Tutorial drop-off rises by 3 points per round, Done falls by 1.5.
    fn round(i: usize) -> FunnelSnapshot {
        let i = i as f64;
        FunnelSnapshot::new(vec![
            FunnelStep::new("Signup", 1000, 100.0, 0.0),
            FunnelStep::new("Tutorial", 800, 80.0, 10.0 + 3.0 * i),
            FunnelStep::new("Done", 500, 50.0, 50.0 - 1.5 * i),
        ])
    }

    #[test]
    fn test_linear_slope() {
        assert_eq!(linear_slope(&[1.0]), None);
        assert!((linear_slope(&[1.0, 2.0, 3.0]).unwrap() - 1.0).abs() < 1e-12);
        assert!((linear_slope(&[5.0, 5.0, 5.0, 5.0]).unwrap()).abs() < 1e-12);
        assert!((linear_slope(&[10.0, 7.0, 4.0]).unwrap() + 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_trends_before_min_history() {
        let mut agent = agent();
        for i in 0..9 {
            assert!(agent.analyze(&round(i)).unwrap().is_empty());
        }
        assert_eq!(agent.history_len(), 9);
    }

    #[test]
    fn test_detects_trends() {
        let mut agent = agent();
        let mut insights = Vec::new();
        for i in 0..10 {
            insights = agent.analyze(&round(i)).unwrap();
        }

        let tutorial = insights.iter().find(|i| i.step() == Some("Tutorial")).unwrap();
        assert_eq!(tutorial.impact_level, ImpactLevel::Critical);
        assert_eq!(tutorial.data_points["trend_direction"], "increasing");
        assert!((tutorial.confidence - 0.6).abs() < 1e-9);
        assert!((tutorial.data_points["recent_average"].as_f64().unwrap() - 31.0).abs() < 1e-9);

        let done = insights.iter().find(|i| i.step() == Some("Done")).unwrap();
        assert_eq!(done.impact_level, ImpactLevel::High);
        assert_eq!(done.data_points["trend_direction"], "decreasing");

        // flat series are not significant
        assert!(insights.iter().all(|i| i.step() != Some("Signup")));
    }

    #[test]
    fn test_trends_only_for_current_steps() {
        let mut agent = agent();
        for i in 0..10 {
            agent.analyze(&round(i)).unwrap();
        }

        let current = FunnelSnapshot::new(vec![
            FunnelStep::new("Signup", 1000, 100.0, 0.0),
            FunnelStep::new("Checkout", 700, 70.0, 30.0),
        ]);
        let insights = agent.analyze(&current).unwrap();
        assert!(insights.iter().all(|i| i.step().map_or(true, |s| current.contains_step(s))));
    }

    #[test]
    fn test_history_is_capped() {
        let mut agent = agent();
        for i in 0..105 {
            agent.analyze(&round(i % 3)).unwrap();
        }
        assert_eq!(agent.history_len(), 100);
    }

    #[test]
    fn test_low_conversion_pattern() {
        let mut agent = agent();
        let snapshot = FunnelSnapshot::new(vec![
            FunnelStep::new("Signup", 1000, 100.0, 0.0),
            FunnelStep::new("Email Verified", 400, 40.0, 60.0),
            FunnelStep::new("Tutorial", 300, 30.0, 25.0),
            FunnelStep::new("Done", 100, 10.0, 66.7),
        ]);

        let insights = agent.analyze(&snapshot).unwrap();
        assert_eq!(insights.len(), 1);

        let overall = &insights[0];
        assert_eq!(overall.impact_level, ImpactLevel::Critical);
        assert_eq!(overall.confidence, 0.8);
        assert_eq!(overall.step(), None);
        assert_eq!(
            overall.data_points["bottleneck_steps"],
            json!(["Email Verified", "Done"])
        );
        assert_eq!(overall.data_points["total_users_analyzed"], json!(1800));
    }
}
