//! Markdown and JSON report generation.

use super::{BatchReport, ReportMetadata};
use crate::analysis::aggregator::AggregateStats;
use crate::analysis::stats::PipelineMetrics;
use crate::models::{RiskLevel, RowResult};
use anyhow::Result;

/// Characters of row text shown in report tables.
const EXCERPT_CHARS: usize = 80;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &BatchReport) -> String {
    let outcome = &report.outcome;
    let mut output = String::new();

    output.push_str("# Credence Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(&outcome.summary.aggregate));
    output.push_str(&generate_metrics_section(&outcome.summary.metrics));
    output.push_str(&generate_high_risk_section(&outcome.results));
    output.push_str(&generate_errors_section(&outcome.results));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Input:** {}\n", metadata.input));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!("- **Rows:** {}\n", metadata.total_rows));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_summary_section(stats: &AggregateStats) -> String {
    let mut section = String::new();
    let dist = &stats.risk_distribution;

    section.push_str("## Summary\n\n");
    section.push_str("### Risk Distribution\n\n");
    section.push_str(&format!(
        "| {} Critical | {} High | {} Medium | {} Low | **Total** |\n",
        RiskLevel::Critical.emoji(),
        RiskLevel::High.emoji(),
        RiskLevel::Medium.emoji(),
        RiskLevel::Low.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | **{}** |\n\n",
        dist.critical, dist.high, dist.medium, dist.low, stats.total
    ));

    section.push_str(&format!(
        "- **Average Risk Score:** {:.1}\n",
        stats.average_risk_score
    ));
    section.push_str(&format!(
        "- **Average Confidence:** {:.2}\n",
        stats.average_confidence
    ));
    section.push_str(&format!("- **High-Risk Rows:** {}\n\n", stats.high_risk_count));

    section
}

fn generate_metrics_section(metrics: &PipelineMetrics) -> String {
    let mut section = String::new();
    let calls = &metrics.agent_invocations;
    let savings = &metrics.cost_savings;

    section.push_str("## Pipeline Metrics\n\n");
    section.push_str("| Metric | Value |\n");
    section.push_str("|:---|:---:|\n");
    section.push_str(&format!(
        "| Agent calls (bias / sentiment / fact-check) | {} / {} / {} |\n",
        calls.bias, calls.sentiment, calls.fact_check
    ));
    section.push_str(&format!(
        "| Agent calls saved | {} of {} ({:.0}%) |\n",
        savings.calls_saved, savings.max_agent_calls, savings.savings_percent
    ));
    section.push_str(&format!(
        "| Cache hits | {} ({:.0}%) |\n",
        metrics.cache_hits,
        metrics.cache_hit_rate * 100.0
    ));
    section.push_str(&format!("| Rows skipped by routing | {} |\n", metrics.skipped_rows));
    section.push_str(&format!(
        "| Processing time | {}ms |\n\n",
        metrics.processing_time_ms
    ));

    let intents = &metrics.intent_distribution;
    section.push_str("### Routing Intents\n\n");
    section.push_str("| Factual | Sensitive | Subjective | Mixed | Safe |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {} |\n\n",
        intents.factual, intents.sensitive, intents.subjective, intents.mixed, intents.safe
    ));

    section
}

fn generate_high_risk_section(results: &[RowResult]) -> String {
    let mut section = String::new();
    section.push_str("## High-Risk Rows\n\n");

    let mut flagged: Vec<&RowResult> = results
        .iter()
        .filter(|r| r.result.risk_level.is_high_risk())
        .collect();

    if flagged.is_empty() {
        section.push_str("No rows reached high or critical risk.\n\n");
        return section;
    }

    flagged.sort_by(|a, b| {
        b.result
            .risk_score
            .cmp(&a.result.risk_score)
            .then_with(|| a.index.cmp(&b.index))
    });

    section.push_str("| Row | Risk | Score | Intent | Agents | Text |\n");
    section.push_str("|:---:|:---|:---:|:---|:---|:---|\n");
    for row in flagged {
        let result = &row.result;
        let agents: Vec<String> = result.agents_run.iter().map(|a| a.to_string()).collect();
        section.push_str(&format!(
            "| {} | {} {} | {} | {} | {} | {} |\n",
            row.index,
            result.risk_level.emoji(),
            result.risk_level,
            result.risk_score,
            result.routing_decision.intent,
            agents.join(", "),
            excerpt(&result.text)
        ));
    }
    section.push('\n');

    section
}

fn generate_errors_section(results: &[RowResult]) -> String {
    let failed: Vec<&RowResult> = results.iter().filter(|r| r.result.error.is_some()).collect();
    if failed.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Failed Rows\n\n");
    for row in failed {
        section.push_str(&format!(
            "- **Row {}:** {} ({})\n",
            row.index,
            row.result.error.as_deref().unwrap_or_default(),
            excerpt(&row.result.text)
        ));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by Credence*\n".to_string()
}

/// Single-line, table-safe prefix of `text`.
fn excerpt(text: &str) -> String {
    let flat = text.replace(['\n', '\r'], " ").replace('|', "\\|");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let mut short: String = flat.chars().take(EXCERPT_CHARS).collect();
    short.push('…');
    short
}

/// Generate a JSON report.
pub fn generate_json_report(report: &BatchReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
