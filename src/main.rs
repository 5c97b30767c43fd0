//! funnel-insight - multi-agent insights for onboarding funnels
//!
//! A CLI tool that runs anomaly, trend, prediction and optimization agents
//! over a funnel snapshot, derives consensus between them, and writes a
//! ranked insight report.
//!
//! Exit codes:
//!   0 - Success (no insights above threshold, or no --fail-on set)
//!   1 - Runtime error (unreadable snapshot, bad config, etc.)
//!   2 - Insights found at or above the --fail-on threshold

mod agent;
mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod report;
mod source;

use agent::AgentKind;
use analysis::{aggregator, Orchestrator};
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use models::{FunnelSnapshot, Insight, MetaAnalysis, Report, ReportMetadata, SerializedInsight};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("funnel-insight v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_analysis(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default config file.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to tune agent thresholds, optimization rules, and ranking.");
    Ok(())
}

/// Initialize logging based on verbosity settings. `RUST_LOG` wins when set.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().to_string().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("⚠️  Failed to set tracing subscriber: {}", e);
    }
}

/// Insights of the final round plus the pieces a report needs.
struct RoundOutcome {
    ranked: Vec<SerializedInsight>,
    total_insights: usize,
    insights_by_agent: BTreeMap<String, usize>,
    meta_analysis: Option<MetaAnalysis>,
}

/// Run the complete analysis workflow. Returns exit code (0 or 2).
async fn run_analysis(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let snapshot = match args.input {
        Some(ref path) => source::load_snapshot(path)?,
        None => {
            info!("Using built-in sample funnel");
            FunnelSnapshot::sample()
        }
    };

    let mode = args.agent.map_or("orchestrator", |kind| kind.id());
    let rounds = config.general.rounds.max(1);

    if !args.quiet {
        eprintln!("🔬 Analyzing {} funnel steps from {}", snapshot.len(), args.source_label());
        eprintln!("   Mode: {} | Rounds: {}", mode, rounds);
    }

    let mut orchestrator = Orchestrator::new(&config);
    let outcome = run_rounds(&mut orchestrator, &snapshot, args.agent, rounds, &config, args.quiet).await;

    let insights = aggregator::filter_insights(outcome.ranked, args.insight_type, args.min_impact, args.limit);

    let report = Report {
        metadata: ReportMetadata {
            source: args.source_label(),
            analysis_date: Utc::now(),
            mode: mode.to_string(),
            rounds,
            steps_analyzed: snapshot.len(),
            total_insights: outcome.total_insights,
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        funnel_health: snapshot.health(),
        final_conversion_rate: snapshot.final_conversion_rate(),
        funnel: snapshot,
        meta_analysis: outcome.meta_analysis,
        insights_by_agent: outcome.insights_by_agent,
        insights,
        agents: orchestrator.status_reports(),
        system_health: orchestrator.system_health(),
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report, &config.report),
    };
    report::write_report(&output, args.output.as_deref())?;

    if !args.quiet {
        print_summary(&report, args.output.as_deref());
    }

    // Check --fail-on threshold
    if let Some(fail_level) = args.fail_on {
        let has_insights_above = report.insights.iter().any(|i| i.impact_level >= fail_level);

        if has_insights_above {
            eprintln!(
                "\n⛔ Insights found at or above {} impact. Failing (exit code 2).",
                fail_level
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Feed the same snapshot through the agents `rounds` times. Only the last
/// round's output is reported; earlier rounds build agent history.
async fn run_rounds(
    orchestrator: &mut Orchestrator,
    snapshot: &FunnelSnapshot,
    single: Option<AgentKind>,
    rounds: usize,
    config: &Config,
    quiet: bool,
) -> RoundOutcome {
    let progress = (rounds > 1 && !quiet).then(|| {
        let bar = ProgressBar::new(rounds as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] round {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        bar
    });

    let mut outcome = RoundOutcome {
        ranked: Vec::new(),
        total_insights: 0,
        insights_by_agent: BTreeMap::new(),
        meta_analysis: None,
    };

    for round in 1..=rounds {
        debug!("Round {}/{}", round, rounds);

        outcome = match single {
            Some(kind) => {
                let insights = orchestrator.run_agent(kind, snapshot).await;
                RoundOutcome {
                    total_insights: insights.len(),
                    insights_by_agent: BTreeMap::from([(kind.id().to_string(), insights.len())]),
                    ranked: aggregator::prioritize(insights)
                        .iter()
                        .take(config.ranking.top_n)
                        .map(Insight::serialize)
                        .collect(),
                    meta_analysis: None,
                }
            }
            None => {
                let result = orchestrator.analyze(snapshot).await;
                RoundOutcome {
                    ranked: result.prioritized_insights,
                    total_insights: result.total_insights,
                    insights_by_agent: result.insights_by_agent,
                    meta_analysis: Some(result.meta_analysis),
                }
            }
        };

        if let Some(ref bar) = progress {
            bar.inc(1);
        }
    }

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    outcome
}

/// Print a short summary to stderr so stdout stays clean for the report.
fn print_summary(report: &Report, output: Option<&Path>) {
    let breakdown = aggregator::impact_breakdown(&report.insights);
    let count = |level| breakdown.get(&level).copied().unwrap_or(0);

    eprintln!("\n📊 Analysis Summary:");
    eprintln!("   Users entering funnel: {}", report.funnel.total_users());
    eprintln!(
        "   Final conversion: {:.2}% ({})",
        report.final_conversion_rate, report.funnel_health
    );
    eprintln!(
        "   Insights reported: {} of {}",
        report.insights.len(),
        report.metadata.total_insights
    );
    eprintln!(
        "   - 🔴 Critical: {} | 🟠 High: {} | 🟡 Medium: {} | 🟢 Low: {}",
        count(models::ImpactLevel::Critical),
        count(models::ImpactLevel::High),
        count(models::ImpactLevel::Medium),
        count(models::ImpactLevel::Low)
    );
    if let Some(ref meta) = report.meta_analysis {
        eprintln!(
            "   Collaboration: {:.2} | Consensus: {:.2} | Confidence: {:.2}",
            meta.collaboration_score, meta.consensus_level, meta.system_confidence
        );
    }
    eprintln!("   Duration: {:.2}s", report.metadata.duration_seconds);

    match output {
        Some(path) => eprintln!("\n✅ Analysis complete! Report saved to: {}", path.display()),
        None => eprintln!("\n✅ Analysis complete!"),
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
