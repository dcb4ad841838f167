//! Risk aggregation and result-set statistics.
//!
//! This module combines the outputs of whichever agents ran for a row
//! into one 0-100 risk score, a risk level and a confidence value, and
//! summarizes a set of row results.

use crate::models::{
    AgentKind, AgentOutput, AggregatedResult, BiasResult, FactCheckResult, FactCheckStatus,
    RiskLevel, RouterDecision, SentimentClass, SentimentResult,
};
use serde::{Deserialize, Serialize};

const BIAS_WEIGHT: f64 = 0.4;
const FACT_CHECK_WEIGHT: f64 = 0.4;
const SENTIMENT_WEIGHT: f64 = 0.2;

/// Confidence proxies for bias, which reports no confidence of its own.
const BIAS_CONFIDENCE_FLAGGED: f64 = 0.9;
const BIAS_CONFIDENCE_CLEAN: f64 = 0.95;

/// Agent outputs collected for one row. `None` means the agent did not run.
#[derive(Debug, Clone, Default)]
pub struct AgentOutputs {
    pub bias: Option<AgentOutput<BiasResult>>,
    pub sentiment: Option<AgentOutput<SentimentResult>>,
    pub fact_check: Option<AgentOutput<FactCheckResult>>,
}

impl AgentOutputs {
    fn bias(&self) -> Option<&BiasResult> {
        self.bias.as_ref().and_then(AgentOutput::completed)
    }

    fn sentiment(&self) -> Option<&SentimentResult> {
        self.sentiment.as_ref().and_then(AgentOutput::completed)
    }

    fn fact_check(&self) -> Option<&FactCheckResult> {
        self.fact_check.as_ref().and_then(AgentOutput::completed)
    }

    /// Error messages of the agents that failed, labelled by agent.
    pub fn failures(&self) -> Vec<String> {
        let mut failures = Vec::new();
        if let Some(e) = self.bias.as_ref().and_then(AgentOutput::error) {
            failures.push(format!("{}: {}", AgentKind::Bias, e));
        }
        if let Some(e) = self.sentiment.as_ref().and_then(AgentOutput::error) {
            failures.push(format!("{}: {}", AgentKind::Sentiment, e));
        }
        if let Some(e) = self.fact_check.as_ref().and_then(AgentOutput::error) {
            failures.push(format!("{}: {}", AgentKind::FactCheck, e));
        }
        failures
    }

    /// Number of agents that produced a result.
    pub fn completed_count(&self) -> usize {
        [
            self.bias().is_some(),
            self.sentiment().is_some(),
            self.fact_check().is_some(),
        ]
        .iter()
        .filter(|done| **done)
        .count()
    }
}

/// Build the final result for a row.
pub fn aggregate(
    text: String,
    outputs: AgentOutputs,
    routing_decision: RouterDecision,
    agents_run: Vec<AgentKind>,
    from_cache: bool,
    error: Option<String>,
) -> AggregatedResult {
    let risk_score = calculate_risk_score(outputs.bias(), outputs.sentiment(), outputs.fact_check());
    let confidence = calculate_confidence(&outputs, &agents_run);

    AggregatedResult {
        text,
        bias: outputs.bias,
        sentiment: outputs.sentiment,
        fact_check: outputs.fact_check,
        risk_score,
        risk_level: RiskLevel::from_score(risk_score),
        confidence,
        routing_decision,
        agents_run,
        from_cache,
        error,
    }
}

pub fn bias_risk(bias: Option<&BiasResult>) -> f64 {
    bias.map_or(0.0, |b| b.overall_bias_score * 100.0)
}

pub fn fact_check_risk(fact_check: Option<&FactCheckResult>) -> f64 {
    let Some(fc) = fact_check else {
        return 0.0;
    };
    if fc.skipped {
        return 0.0;
    }

    match fc.status {
        FactCheckStatus::NoClaims => 0.0,
        FactCheckStatus::Verified => (1.0 - fc.confidence) * 20.0,
        FactCheckStatus::Disputed => 80.0 + fc.confidence * 20.0,
        FactCheckStatus::Unverified => 50.0,
        FactCheckStatus::Mixed => {
            if fc.findings.is_empty() {
                30.0
            } else {
                30.0 + (fc.false_findings() as f64 / fc.findings.len() as f64) * 70.0
            }
        }
        FactCheckStatus::Unknown => 30.0,
    }
}

pub fn sentiment_risk(sentiment: Option<&SentimentResult>) -> f64 {
    match sentiment {
        Some(s) if s.classification == SentimentClass::Negative => {
            s.scores.negative * 100.0 * s.confidence
        }
        Some(s) if s.classification == SentimentClass::Mixed => {
            s.scores.negative * 50.0 * s.confidence
        }
        _ => 0.0,
    }
}

/// Weighted risk score, rounded and clamped to [0, 100].
pub fn calculate_risk_score(
    bias: Option<&BiasResult>,
    sentiment: Option<&SentimentResult>,
    fact_check: Option<&FactCheckResult>,
) -> u8 {
    let weighted = bias_risk(bias) * BIAS_WEIGHT
        + fact_check_risk(fact_check) * FACT_CHECK_WEIGHT
        + sentiment_risk(sentiment) * SENTIMENT_WEIGHT;

    if weighted.is_nan() {
        return 0;
    }
    weighted.clamp(0.0, 100.0).round() as u8
}

/// Mean confidence of the agents that produced a result.
///
/// Nothing to run means full confidence; agents that ran and all failed
/// mean none.
pub fn calculate_confidence(outputs: &AgentOutputs, agents_run: &[AgentKind]) -> f64 {
    if agents_run.is_empty() {
        return 1.0;
    }

    let mut signals = Vec::with_capacity(3);
    if let Some(bias) = outputs.bias() {
        signals.push(if bias.flagged {
            BIAS_CONFIDENCE_FLAGGED
        } else {
            BIAS_CONFIDENCE_CLEAN
        });
    }
    if let Some(sentiment) = outputs.sentiment() {
        signals.push(sentiment.confidence);
    }
    if let Some(fc) = outputs.fact_check() {
        signals.push(if fc.status == FactCheckStatus::NoClaims || fc.skipped {
            1.0
        } else {
            fc.confidence
        });
    }

    if signals.is_empty() {
        0.0
    } else {
        signals.iter().sum::<f64>() / signals.len() as f64
    }
}

/// Row counts per risk level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl RiskDistribution {
    pub fn record(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::Low => self.low += 1,
            RiskLevel::Medium => self.medium += 1,
            RiskLevel::High => self.high += 1,
            RiskLevel::Critical => self.critical += 1,
        }
    }
}

/// Agent invocation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInvocations {
    pub bias: usize,
    pub sentiment: usize,
    pub fact_check: usize,
}

impl AgentInvocations {
    pub fn record(&mut self, kind: AgentKind) {
        match kind {
            AgentKind::Bias => self.bias += 1,
            AgentKind::Sentiment => self.sentiment += 1,
            AgentKind::FactCheck => self.fact_check += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.bias + self.sentiment + self.fact_check
    }
}

/// Summary over a set of row results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub total: usize,
    pub average_risk_score: f64,
    pub risk_distribution: RiskDistribution,
    pub high_risk_count: usize,
    pub average_confidence: f64,
    /// Calls actually made; cached rows do not count.
    pub agent_invocations: AgentInvocations,
    pub cache_hits: usize,
    pub cache_hit_rate: f64,
}

/// Summarize row results. An empty slice yields zeroed stats.
pub fn calculate_aggregate_stats(results: &[AggregatedResult]) -> AggregateStats {
    let mut stats = AggregateStats {
        total: results.len(),
        ..AggregateStats::default()
    };
    if results.is_empty() {
        return stats;
    }

    let mut risk_sum = 0.0;
    let mut confidence_sum = 0.0;

    for result in results {
        risk_sum += f64::from(result.risk_score);
        confidence_sum += result.confidence;
        stats.risk_distribution.record(result.risk_level);

        if result.from_cache {
            stats.cache_hits += 1;
        } else {
            for kind in &result.agents_run {
                stats.agent_invocations.record(*kind);
            }
        }
    }

    let count = results.len() as f64;
    stats.average_risk_score = risk_sum / count;
    stats.average_confidence = confidence_sum / count;
    stats.high_risk_count = stats.risk_distribution.high + stats.risk_distribution.critical;
    stats.cache_hit_rate = stats.cache_hits as f64 / count;

    stats
}
