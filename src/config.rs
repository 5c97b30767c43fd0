//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.funnel-insight.toml` files. Every heuristic threshold the agents use
//! lives here so tuning touches a single place.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".funnel-insight.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Anomaly detection thresholds.
    #[serde(default)]
    pub anomaly: AnomalyConfig,

    /// Trend and pattern thresholds.
    #[serde(default)]
    pub pattern: PatternConfig,

    /// Prediction thresholds.
    #[serde(default)]
    pub prediction: PredictionConfig,

    /// Optimization rules.
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    /// Consensus and ranking settings.
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Number of analysis rounds to run over the same snapshot.
    #[serde(default = "default_rounds")]
    pub rounds: usize,

    /// Entries kept in each agent's memory.
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,

    /// Insights kept in each agent's insight log.
    #[serde(default = "default_memory_limit")]
    pub insight_log_limit: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            memory_limit: default_memory_limit(),
            insight_log_limit: default_memory_limit(),
        }
    }
}

fn default_rounds() -> usize {
    1
}

fn default_memory_limit() -> usize {
    1000
}

/// Isolation forest and severity thresholds for the anomaly agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub n_trees: usize,
    /// Expected share of outliers, sets the decision offset.
    pub contamination: f64,
    pub seed: u64,
    /// Steps needed before the model is fitted.
    pub min_training_steps: usize,
    /// Anomaly score below which an outlier is critical.
    pub critical_score: f64,
    /// Anomaly score below which an outlier is high impact.
    pub high_score: f64,
    pub confidence_nudge: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            contamination: 0.1,
            seed: 42,
            min_training_steps: 3,
            critical_score: -0.5,
            high_score: -0.2,
            confidence_nudge: 0.1,
        }
    }
}

/// Trend detection thresholds for the pattern agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Observations kept in the rolling history.
    pub history_size: usize,
    /// Observations needed before trends are computed.
    pub min_history: usize,
    /// Points needed in a step's series before fitting a slope.
    pub min_series_points: usize,
    pub significant_slope: f64,
    pub high_slope: f64,
    pub critical_slope: f64,
    /// Slope that maps to full confidence.
    pub full_confidence_slope: f64,
    /// Points averaged for `recent_average`.
    pub recent_window: usize,
    /// Overall conversion (percent) below which the funnel is flagged.
    pub low_conversion: f64,
    /// Drop-off (percent) above which a step counts as a bottleneck.
    pub bottleneck_dropoff: f64,
    pub overall_confidence: f64,
    pub confidence_nudge: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            history_size: 100,
            min_history: 10,
            min_series_points: 5,
            significant_slope: 0.5,
            high_slope: 1.0,
            critical_slope: 2.0,
            full_confidence_slope: 5.0,
            recent_window: 5,
            low_conversion: 20.0,
            bottleneck_dropoff: 30.0,
            overall_confidence: 0.8,
            confidence_nudge: 0.05,
        }
    }
}

/// Drop-off and health bands for the predictive agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub critical_dropoff: f64,
    pub high_dropoff: f64,
    pub low_dropoff: f64,
    pub critical_confidence: f64,
    pub high_confidence: f64,
    pub low_confidence: f64,
    /// Health score below which the funnel prediction is critical.
    pub health_critical: f64,
    /// Health score below which the funnel prediction is high impact.
    pub health_high: f64,
    /// Health score above which the funnel prediction is low impact.
    pub health_good: f64,
    pub health_critical_confidence: f64,
    pub health_high_confidence: f64,
    pub health_good_confidence: f64,
    pub step_horizon: String,
    pub funnel_horizon: String,
    pub confidence_nudge: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            critical_dropoff: 40.0,
            high_dropoff: 25.0,
            low_dropoff: 10.0,
            critical_confidence: 0.7,
            high_confidence: 0.6,
            low_confidence: 0.5,
            health_critical: 40.0,
            health_high: 60.0,
            health_good: 80.0,
            health_critical_confidence: 0.8,
            health_high_confidence: 0.7,
            health_good_confidence: 0.6,
            step_horizon: "7-14 days".to_string(),
            funnel_horizon: "30 days".to_string(),
            confidence_nudge: 0.08,
        }
    }
}

/// A rule matched against lower-cased step names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRule {
    /// Substring the step name must contain.
    pub key: String,
    /// Drop-off (percent) the step must exceed.
    pub threshold: f64,
    pub actions: Vec<String>,
}

impl OptimizationRule {
    fn new(key: &str, threshold: f64, actions: [&str; 3]) -> Self {
        Self {
            key: key.to_string(),
            threshold,
            actions: actions.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Rule table and urgency bands for the optimizer agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub critical_dropoff: f64,
    pub high_dropoff: f64,
    pub rule_confidence: f64,
    /// Multiple of the average drop-off that marks a bottleneck.
    pub bottleneck_factor: f64,
    pub min_bottlenecks: usize,
    pub strategic_confidence: f64,
    pub confidence_nudge: f64,
    /// Fold spaces and dashes into underscores before matching rule keys.
    pub normalize_step_names: bool,
    pub rules: Vec<OptimizationRule>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            critical_dropoff: 50.0,
            high_dropoff: 40.0,
            rule_confidence: 0.8,
            bottleneck_factor: 1.5,
            min_bottlenecks: 2,
            strategic_confidence: 0.9,
            confidence_nudge: 0.1,
            normalize_step_names: false,
            rules: vec![
                OptimizationRule::new(
                    "email_verification",
                    30.0,
                    [
                        "Implement one-click email verification",
                        "Add social login alternatives",
                        "Send verification reminders after 10 minutes",
                    ],
                ),
                OptimizationRule::new(
                    "tutorial",
                    25.0,
                    [
                        "Make tutorial skippable with option to return",
                        "Add progress indicators and time estimates",
                        "Implement interactive elements and gamification",
                    ],
                ),
                OptimizationRule::new(
                    "first_action",
                    35.0,
                    [
                        "Add contextual tooltips and guidance",
                        "Simplify the first action workflow",
                        "Provide templates or examples",
                    ],
                ),
            ],
        }
    }
}

/// Consensus detection and ranking settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Ranked insights exposed in the result.
    pub top_n: usize,
    /// Distinct agents that must flag a step before consensus fires.
    pub consensus_min_agents: usize,
    pub meta_confidence: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            consensus_min_agents: 2,
            meta_confidence: 0.95,
        }
    }
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Include the funnel step table.
    #[serde(default = "default_true")]
    pub include_funnel: bool,

    /// Include suggested actions under each insight.
    #[serde(default = "default_true")]
    pub include_actions: bool,

    /// Include raw data points under each insight.
    #[serde(default)]
    pub include_data_points: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_funnel: true,
            include_actions: true,
            include_data_points: false,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(rounds) = args.rounds {
            self.general.rounds = rounds;
        }

        if let Some(top) = args.top {
            self.ranking.top_n = top;
        }

        if args.data_points {
            self.report.include_data_points = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.rounds, 1);
        assert_eq!(config.anomaly.n_trees, 100);
        assert_eq!(config.pattern.history_size, 100);
        assert_eq!(config.ranking.top_n, 10);
        assert_eq!(config.optimizer.rules.len(), 3);
        assert!(config.optimizer.rules.iter().all(|r| r.actions.len() == 3));
        assert!(!config.optimizer.normalize_step_names);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
rounds = 12

[prediction]
critical_dropoff = 45.0

[ranking]
top_n = 5

[[optimizer.rules]]
key = "checkout"
threshold = 10.0
actions = ["Shorten the form"]
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.rounds, 12);
        assert_eq!(config.general.memory_limit, 1000);
        assert_eq!(config.prediction.critical_dropoff, 45.0);
        // untouched fields keep their defaults
        assert_eq!(config.prediction.high_dropoff, 25.0);
        assert_eq!(config.ranking.top_n, 5);
        assert_eq!(config.optimizer.rules.len(), 1);
        assert_eq!(config.optimizer.rules[0].key, "checkout");
        assert_eq!(config.optimizer.rule_confidence, 0.8);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[anomaly]"));
        assert!(toml_str.contains("[[optimizer.rules]]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.optimizer, OptimizerConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pattern]\nmin_history = 3").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.pattern.min_history, 3);
        assert_eq!(config.pattern.history_size, 100);
    }

    #[test]
    fn test_load_rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ranking\ntop_n = ").unwrap();
        assert!(Config::load(file.path()).is_err());
    }
}
