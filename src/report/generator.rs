//! Markdown and JSON report generation.
//!
//! This module renders a [`Report`] for humans (Markdown) or machines
//! (pretty-printed JSON).

use crate::analysis::aggregator::impact_breakdown;
use crate::config::ReportConfig;
use crate::models::{
    AgentStatusReport, FunnelSnapshot, ImpactLevel, MetaAnalysis, Report, ReportMetadata, SerializedInsight,
    SystemHealth,
};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, options: &ReportConfig) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Funnel Insight Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));

    if options.include_funnel {
        output.push_str(&generate_funnel_section(
            &report.funnel,
            report.final_conversion_rate,
            &report.funnel_health.to_string(),
        ));
    }

    output.push_str(&generate_summary_section(report));

    output.push_str(&generate_agents_section(&report.agents, &report.system_health));

    output.push_str(&generate_insights_section(&report.insights, options));

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** {}\n", metadata.source));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Mode:** `{}`\n", metadata.mode));
    if metadata.rounds > 1 {
        section.push_str(&format!("- **Rounds:** {}\n", metadata.rounds));
    }
    section.push_str(&format!("- **Steps Analyzed:** {}\n", metadata.steps_analyzed));
    section.push_str(&format!("- **Total Insights:** {}\n", metadata.total_insights));
    section.push_str(&format!("- **Analysis Duration:** {:.2}s\n", metadata.duration_seconds));
    section.push('\n');

    section
}

/// Generate the funnel table.
fn generate_funnel_section(funnel: &FunnelSnapshot, final_conversion: f64, health: &str) -> String {
    let mut section = String::new();

    section.push_str("## Funnel\n\n");
    section.push_str("| Step | Users | Conversion | Drop-off |\n");
    section.push_str("|:---|---:|---:|---:|\n");

    for step in funnel.steps() {
        section.push_str(&format!(
            "| {} | {} | {:.2}% | {:.2}% |\n",
            step.name, step.count, step.conversion_rate, step.drop_off_rate
        ));
    }

    section.push_str(&format!(
        "\n**Final conversion:** {:.2}% ({})\n\n",
        final_conversion, health
    ));

    section
}

/// Generate the summary section.
fn generate_summary_section(report: &Report) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");

    if let Some(ref meta) = report.meta_analysis {
        section.push_str(&generate_metrics_table(meta));
    }

    // Impact breakdown of the reported insights
    let breakdown = impact_breakdown(&report.insights);
    let count = |level: ImpactLevel| breakdown.get(&level).copied().unwrap_or(0);

    section.push_str("### Impact Breakdown\n\n");
    section.push_str(&format!(
        "| {} Critical | {} High | {} Medium | {} Low | **Total** |\n",
        ImpactLevel::Critical.emoji(),
        ImpactLevel::High.emoji(),
        ImpactLevel::Medium.emoji(),
        ImpactLevel::Low.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | **{}** |\n\n",
        count(ImpactLevel::Critical),
        count(ImpactLevel::High),
        count(ImpactLevel::Medium),
        count(ImpactLevel::Low),
        report.insights.len()
    ));

    section.push_str(&generate_by_agent_table(&report.insights_by_agent));

    section
}

fn generate_metrics_table(meta: &MetaAnalysis) -> String {
    let mut table = String::new();

    table.push_str("### System Metrics\n\n");
    table.push_str("| Collaboration | Consensus | System Confidence |\n");
    table.push_str("|:---:|:---:|:---:|\n");
    table.push_str(&format!(
        "| {:.0}% | {:.0}% | {:.0}% |\n\n",
        meta.collaboration_score * 100.0,
        meta.consensus_level * 100.0,
        meta.system_confidence * 100.0
    ));

    table
}

fn generate_by_agent_table(by_agent: &BTreeMap<String, usize>) -> String {
    if by_agent.is_empty() {
        return String::new();
    }

    let mut table = String::new();

    table.push_str("### Insights by Agent\n\n");
    table.push_str("| Agent | Insights |\n");
    table.push_str("|:---|:---:|\n");

    let mut agents: Vec<_> = by_agent.iter().collect();
    agents.sort_by_key(|(_, count)| std::cmp::Reverse(**count));

    for (agent, count) in agents {
        table.push_str(&format!("| `{}` | {} |\n", agent, count));
    }
    table.push('\n');

    table
}

/// Generate the agent status table.
fn generate_agents_section(agents: &[AgentStatusReport], health: &SystemHealth) -> String {
    let mut section = String::new();

    section.push_str("## Agents\n\n");
    section.push_str("| Agent | Status | Confidence | Decisions | Memory | Insights |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|:---:|\n");

    for agent in agents {
        section.push_str(&format!(
            "| {} {} | {} | {:.2} | {} | {} | {} |\n",
            agent.kind.emoji(),
            agent.name,
            agent.state.status,
            agent.state.confidence_level,
            agent.state.decisions_made,
            agent.state.memory_size,
            agent.insights_generated
        ));
    }

    let status = if health.all_agents_active {
        "✅ all agents active"
    } else {
        "⚠️ some agents idle or failed"
    };
    section.push_str(&format!(
        "\n*{} | average confidence {:.2} | {} decisions made*\n\n",
        status, health.average_agent_confidence, health.total_decisions_made
    ));

    section
}

/// Generate the ranked insights section.
fn generate_insights_section(insights: &[SerializedInsight], options: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str("## Insights\n\n");

    if insights.is_empty() {
        section.push_str("No insights matched. The funnel looks steady. 🎉\n\n");
        return section;
    }

    for (rank, insight) in insights.iter().enumerate() {
        section.push_str(&generate_insight_block(rank + 1, insight, options));
    }

    section
}

/// Generate a single insight block.
fn generate_insight_block(rank: usize, insight: &SerializedInsight, options: &ReportConfig) -> String {
    let mut block = String::new();

    block.push_str(&format!(
        "### {}. {} **{}** {}\n\n",
        rank,
        insight.impact_level.emoji(),
        insight.impact_level.to_string().to_uppercase(),
        insight.insight_type
    ));

    block.push_str(&format!("{}\n\n", insight.description));

    block.push_str(&format!(
        "*Confidence: {:.0}% | Priority: {:.2}*\n\n",
        insight.confidence * 100.0,
        insight.priority_score
    ));

    if options.include_actions && !insight.suggested_actions.is_empty() {
        block.push_str("**Suggested actions:**\n\n");
        for action in &insight.suggested_actions {
            block.push_str(&format!("- {}\n", action));
        }
        block.push('\n');
    }

    if options.include_data_points && !insight.data_points.is_empty() {
        let data = serde_json::to_string_pretty(&insight.data_points).unwrap_or_default();
        block.push_str("<details>\n<summary>Data Points</summary>\n\n```json\n");
        block.push_str(&data);
        block.push_str("\n```\n</details>\n\n");
    }

    block.push_str("---\n\n");

    block
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by funnel-insight v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write rendered report content to `path`, or to stdout when no path is given.
pub fn write_report(content: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create report file: {}", path.display()))?;
            file.write_all(content.as_bytes())
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content.as_bytes()).context("Failed to write report to stdout")?;
            stdout.flush()?;
        }
    }

    Ok(())
}
