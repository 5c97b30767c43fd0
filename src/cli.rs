//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::agent::AgentKind;
use crate::models::{ImpactLevel, InsightType};
use clap::Parser;
use std::path::PathBuf;

/// funnel-insight - multi-agent insights for onboarding funnels
///
/// Runs anomaly, trend, prediction and optimization agents over a funnel
/// snapshot and ranks what they find. Markdown/JSON reports.
///
/// Examples:
///   funnel-insight --demo
///   funnel-insight --input funnel.json --format json --output insights.json
///   funnel-insight --input funnel.json --agent optimizer
///   funnel-insight --demo --rounds 12 --insight-type pattern
///   funnel-insight --input funnel.json --fail-on critical
///   funnel-insight --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Funnel snapshot to analyze (JSON)
    ///
    /// Accepts a list of steps, an {"analysis": [...]} object, or a list
    /// of raw {name, count} records.
    #[arg(
        short,
        long,
        value_name = "FILE",
        required_unless_present_any = ["demo", "init_config"],
        conflicts_with = "demo"
    )]
    pub input: Option<PathBuf>,

    /// Analyze the built-in sample onboarding funnel
    #[arg(long)]
    pub demo: bool,

    /// Run a single agent instead of the full orchestrator
    #[arg(short, long, value_name = "AGENT")]
    pub agent: Option<AgentKind>,

    /// Number of analysis rounds over the same snapshot
    ///
    /// Later rounds see the history built by earlier ones. Trend detection
    /// needs at least 10 rounds with default settings.
    #[arg(short, long, value_name = "N")]
    pub rounds: Option<usize>,

    /// Number of ranked insights to keep
    #[arg(long, value_name = "N")]
    pub top: Option<usize>,

    /// Only report insights of this type
    #[arg(long, value_name = "TYPE")]
    pub insight_type: Option<InsightType>,

    /// Maximum number of insights to report after filtering
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Output file path for the report (stdout when omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Include raw data points under each insight in Markdown reports
    #[arg(long)]
    pub data_points: bool,

    /// Fail if insights at or above this impact level are found
    ///
    /// Useful for CI pipelines. Exit code 2 when threshold is exceeded.
    /// Values: critical, high, medium, low
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<ImpactLevel>,

    /// Minimum impact level to include in the report
    ///
    /// Insights below this level are filtered out. Values: critical, high, medium, low
    #[arg(long, value_name = "LEVEL")]
    pub min_impact: Option<ImpactLevel>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .funnel-insight.toml in the current directory
    #[arg(short, long, value_name = "FILE", env = "FUNNEL_INSIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .funnel-insight.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        for (flag, value) in [("--rounds", self.rounds), ("--top", self.top), ("--limit", self.limit)] {
            if value == Some(0) {
                return Err(format!("{} must be at least 1", flag));
            }
        }

        if let Some(ref input) = self.input {
            if !input.is_file() {
                return Err(format!("Snapshot file does not exist: {}", input.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Human-readable name of the analyzed source.
    pub fn source_label(&self) -> String {
        match self.input {
            Some(ref path) => path.display().to_string(),
            None => "built-in sample funnel".to_string(),
        }
    }
}
