//! Batch-level statistics delivered with the `complete` event.
//!
//! [`LegacyStats`] keeps the per-category breakdown older clients read;
//! [`PipelineMetrics`] describes what the routing and caching saved.

use crate::analysis::aggregator::{AgentInvocations, AggregateStats};
use crate::models::{AggregatedResult, FactCheckStatus, Intent, SentimentClass};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Category score at which a bias category counts as present.
const CATEGORY_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiasCategoryCounts {
    pub gender: usize,
    pub religion: usize,
    pub political: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiasStats {
    pub analyzed: usize,
    pub flagged: usize,
    pub average_score: f64,
    pub by_category: BiasCategoryCounts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentDistribution {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub mixed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactCheckDistribution {
    pub verified: usize,
    pub disputed: usize,
    pub unverified: usize,
    pub mixed: usize,
    pub no_claims: usize,
    pub unknown: usize,
}

/// Per-category breakdown in the shape older dashboards expect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyStats {
    pub bias: BiasStats,
    pub sentiment: SentimentDistribution,
    pub fact_check: FactCheckDistribution,
}

impl LegacyStats {
    pub fn from_results(results: &[AggregatedResult]) -> Self {
        let mut stats = Self::default();
        let mut bias_sum = 0.0;

        for result in results {
            if let Some(bias) = result.bias_result() {
                stats.bias.analyzed += 1;
                bias_sum += bias.overall_bias_score;
                if bias.flagged {
                    stats.bias.flagged += 1;
                }
                if bias.gender.score >= CATEGORY_THRESHOLD {
                    stats.bias.by_category.gender += 1;
                }
                if bias.religion.score >= CATEGORY_THRESHOLD {
                    stats.bias.by_category.religion += 1;
                }
                if bias.political.score >= CATEGORY_THRESHOLD {
                    stats.bias.by_category.political += 1;
                }
            }

            if let Some(sentiment) = result.sentiment_result() {
                match sentiment.classification {
                    SentimentClass::Positive => stats.sentiment.positive += 1,
                    SentimentClass::Negative => stats.sentiment.negative += 1,
                    SentimentClass::Neutral => stats.sentiment.neutral += 1,
                    SentimentClass::Mixed => stats.sentiment.mixed += 1,
                }
            }

            if let Some(fc) = result.fact_check_result() {
                let counts = &mut stats.fact_check;
                match fc.status {
                    FactCheckStatus::Verified => counts.verified += 1,
                    FactCheckStatus::Disputed => counts.disputed += 1,
                    FactCheckStatus::Unverified => counts.unverified += 1,
                    FactCheckStatus::Mixed => counts.mixed += 1,
                    FactCheckStatus::NoClaims => counts.no_claims += 1,
                    FactCheckStatus::Unknown => counts.unknown += 1,
                }
            }
        }

        if stats.bias.analyzed > 0 {
            stats.bias.average_score = bias_sum / stats.bias.analyzed as f64;
        }
        stats
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentDistribution {
    pub factual: usize,
    pub sensitive: usize,
    pub subjective: usize,
    pub mixed: usize,
    pub safe: usize,
}

impl IntentDistribution {
    fn record(&mut self, intent: Intent) {
        match intent {
            Intent::Factual => self.factual += 1,
            Intent::Sensitive => self.sensitive += 1,
            Intent::Subjective => self.subjective += 1,
            Intent::Mixed => self.mixed += 1,
            Intent::Safe => self.safe += 1,
        }
    }
}

/// Agent calls made against the cost of running every agent on every row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSavings {
    pub agent_calls_made: usize,
    pub max_agent_calls: usize,
    pub calls_saved: usize,
    pub savings_percent: f64,
}

impl CostSavings {
    pub fn new(agent_calls_made: usize, rows: usize) -> Self {
        let max_agent_calls = rows * 3;
        let calls_saved = max_agent_calls.saturating_sub(agent_calls_made);
        let savings_percent = if max_agent_calls == 0 {
            0.0
        } else {
            calls_saved as f64 / max_agent_calls as f64 * 100.0
        };

        Self {
            agent_calls_made,
            max_agent_calls,
            calls_saved,
            savings_percent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetrics {
    pub total_rows: usize,
    pub agent_invocations: AgentInvocations,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_hit_rate: f64,
    pub average_risk_score: f64,
    pub high_risk_count: usize,
    pub processing_time_ms: u64,
    pub cost_savings: CostSavings,
    pub intent_distribution: IntentDistribution,
    /// Rows resolved without calling any agent.
    pub skipped_rows: usize,
}

impl PipelineMetrics {
    pub fn new(results: &[AggregatedResult], stats: &AggregateStats, elapsed: Duration) -> Self {
        let mut intent_distribution = IntentDistribution::default();
        let mut skipped_rows = 0;

        for result in results.iter().filter(|r| r.error.is_none()) {
            intent_distribution.record(result.routing_decision.intent);
            if result.agents_run.is_empty() {
                skipped_rows += 1;
            }
        }

        Self {
            total_rows: results.len(),
            agent_invocations: stats.agent_invocations,
            cache_hits: stats.cache_hits,
            cache_misses: results.len() - stats.cache_hits,
            cache_hit_rate: stats.cache_hit_rate,
            average_risk_score: stats.average_risk_score,
            high_risk_count: stats.high_risk_count,
            processing_time_ms: elapsed.as_millis() as u64,
            cost_savings: CostSavings::new(stats.agent_invocations.total(), results.len()),
            intent_distribution,
            skipped_rows,
        }
    }
}
