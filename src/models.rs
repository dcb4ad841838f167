//! Data models for the credibility pipeline.
//!
//! This module contains the core data structures shared by the router,
//! the analysis agents, the aggregator and the streaming pipeline.
//! Field names serialize in camelCase because they are consumed by a
//! browser client over SSE.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk bucket derived from a 0-100 risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Score below 30
    Low,
    /// Score in [30, 50)
    Medium,
    /// Score in [50, 70)
    High,
    /// Score of 70 or more
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Medium => write!(f, "Medium"),
            RiskLevel::High => write!(f, "High"),
            RiskLevel::Critical => write!(f, "Critical"),
        }
    }
}

impl RiskLevel {
    /// Bucket a risk score. Thresholds are fixed: 30, 50, 70.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=29 => RiskLevel::Low,
            30..=49 => RiskLevel::Medium,
            50..=69 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    /// Returns an emoji representation of the level.
    pub fn emoji(&self) -> &'static str {
        match self {
            RiskLevel::Low => "🟢",
            RiskLevel::Medium => "🟡",
            RiskLevel::High => "🟠",
            RiskLevel::Critical => "🔴",
        }
    }

    pub fn is_high_risk(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

/// The three analysis capabilities the router can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgentKind {
    Bias,
    Sentiment,
    #[serde(alias = "fact_check", alias = "factcheck")]
    FactCheck,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::Bias, AgentKind::Sentiment, AgentKind::FactCheck];

    /// Parse a loosely formatted agent name coming back from a classifier.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "bias" => Some(AgentKind::Bias),
            "sentiment" => Some(AgentKind::Sentiment),
            "factcheck" | "facts" => Some(AgentKind::FactCheck),
            _ => None,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Bias => write!(f, "bias"),
            AgentKind::Sentiment => write!(f, "sentiment"),
            AgentKind::FactCheck => write!(f, "factCheck"),
        }
    }
}

/// Routing intent assigned to a snippet by the triage router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Factual,
    Sensitive,
    Subjective,
    Mixed,
    Safe,
}

impl Intent {
    /// Agents implied by an intent when the classifier does not list them.
    pub fn default_agents(&self) -> Vec<AgentKind> {
        match self {
            Intent::Safe => vec![],
            Intent::Subjective => vec![AgentKind::Sentiment],
            Intent::Factual => vec![AgentKind::FactCheck],
            Intent::Sensitive => vec![AgentKind::Bias, AgentKind::Sentiment],
            Intent::Mixed => AgentKind::ALL.to_vec(),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intent::Factual => "factual",
            Intent::Sensitive => "sensitive",
            Intent::Subjective => "subjective",
            Intent::Mixed => "mixed",
            Intent::Safe => "safe",
        };
        write!(f, "{}", name)
    }
}

/// Coarse content signals reported alongside a routing decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentFlags {
    pub has_factual_claims: bool,
    pub has_sensitive_topics: bool,
    pub has_emotional_content: bool,
    pub is_chit_chat: bool,
}

/// Output of the triage router for one snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterDecision {
    pub intent: Intent,
    pub confidence: f64,
    pub agents_needed: Vec<AgentKind>,
    pub reasoning: String,
    pub content_flags: ContentFlags,
}

impl RouterDecision {
    /// Decision used when classification fails: run everything.
    pub fn fail_open(reason: &str) -> Self {
        Self {
            intent: Intent::Mixed,
            confidence: 0.5,
            agents_needed: AgentKind::ALL.to_vec(),
            reasoning: format!("Router fallback, running all agents: {}", reason),
            content_flags: ContentFlags::default(),
        }
    }

    /// Decision used when the caller bypasses routing.
    pub fn routing_skipped() -> Self {
        Self {
            intent: Intent::Mixed,
            confidence: 1.0,
            agents_needed: AgentKind::ALL.to_vec(),
            reasoning: "Routing skipped by caller; running all agents".to_string(),
            content_flags: ContentFlags::default(),
        }
    }

    /// Decision for text that is empty after normalization.
    pub fn empty_text() -> Self {
        Self {
            intent: Intent::Safe,
            confidence: 1.0,
            agents_needed: Vec::new(),
            reasoning: "Empty text; nothing to analyze".to_string(),
            content_flags: ContentFlags {
                is_chit_chat: true,
                ..ContentFlags::default()
            },
        }
    }

    /// Placeholder attached to a row that failed before a decision existed.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            intent: Intent::Mixed,
            confidence: 0.0,
            agents_needed: Vec::new(),
            reasoning: format!("No routing decision: {}", reason),
            content_flags: ContentFlags::default(),
        }
    }

    pub fn needs(&self, kind: AgentKind) -> bool {
        self.agents_needed.contains(&kind)
    }
}

/// Score for one bias category (gender, religion, political).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BiasCategory {
    pub score: f64,
    /// Direction of the bias, or the leaning for political bias.
    #[serde(alias = "leaning", skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiasResult {
    #[serde(default)]
    pub gender: BiasCategory,
    #[serde(default)]
    pub religion: BiasCategory,
    #[serde(default)]
    pub political: BiasCategory,
    pub overall_bias_score: f64,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentClass {
    Positive,
    Negative,
    Neutral,
    Mixed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentScores {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentResult {
    pub classification: SentimentClass,
    pub confidence: f64,
    #[serde(default)]
    pub scores: SentimentScores,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCheckStatus {
    Verified,
    Disputed,
    Unverified,
    Mixed,
    NoClaims,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimVerdict {
    True,
    False,
    PartiallyTrue,
    Unverifiable,
}

/// Verdict on a single claim extracted from the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimFinding {
    pub claim: String,
    pub verdict: ClaimVerdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactCheckResult {
    pub status: FactCheckStatus,
    #[serde(default)]
    pub verified: bool,
    pub confidence: f64,
    #[serde(default)]
    pub findings: Vec<ClaimFinding>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
}

impl FactCheckResult {
    pub fn false_findings(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.verdict == ClaimVerdict::False)
            .count()
    }
}

/// One agent slot in a row result: either the agent's output or the
/// error that replaced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentOutput<T> {
    Completed(T),
    Failed { error: String },
}

impl<T> AgentOutput<T> {
    pub fn completed(&self) -> Option<&T> {
        match self {
            AgentOutput::Completed(value) => Some(value),
            AgentOutput::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AgentOutput::Completed(_) => None,
            AgentOutput::Failed { error } => Some(error),
        }
    }
}

/// Final, immutable result for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResult {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<AgentOutput<BiasResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<AgentOutput<SentimentResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_check: Option<AgentOutput<FactCheckResult>>,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub routing_decision: RouterDecision,
    pub agents_run: Vec<AgentKind>,
    pub from_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AggregatedResult {
    /// A row that failed as a whole: zeroed risk, error attached.
    pub fn failed(text: String, routing_decision: RouterDecision, error: String) -> Self {
        Self {
            text,
            bias: None,
            sentiment: None,
            fact_check: None,
            risk_score: 0,
            risk_level: RiskLevel::Low,
            confidence: 0.0,
            routing_decision,
            agents_run: Vec::new(),
            from_cache: false,
            error: Some(error),
        }
    }

    pub fn bias_result(&self) -> Option<&BiasResult> {
        self.bias.as_ref().and_then(AgentOutput::completed)
    }

    pub fn sentiment_result(&self) -> Option<&SentimentResult> {
        self.sentiment.as_ref().and_then(AgentOutput::completed)
    }

    pub fn fact_check_result(&self) -> Option<&FactCheckResult> {
        self.fact_check.as_ref().and_then(AgentOutput::completed)
    }
}

/// Per-request switches for the agent categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisOptions {
    pub check_bias: bool,
    pub check_sentiment: bool,
    pub check_facts: bool,
    pub skip_routing: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            check_bias: true,
            check_sentiment: true,
            check_facts: true,
            skip_routing: false,
        }
    }
}

impl AnalysisOptions {
    pub fn allows(&self, kind: AgentKind) -> bool {
        match kind {
            AgentKind::Bias => self.check_bias,
            AgentKind::Sentiment => self.check_sentiment,
            AgentKind::FactCheck => self.check_facts,
        }
    }
}

/// Body of a batch analysis request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub rows: Vec<String>,
    #[serde(default)]
    pub options: AnalysisOptions,
}

/// A row result as delivered to clients: the aggregated result plus its
/// position in the batch and its content fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowResult {
    pub index: usize,
    pub hash: String,
    #[serde(flatten)]
    pub result: AggregatedResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_risk_level_thresholds() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(29), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(30), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(49), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(50), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(69), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(70), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert!(RiskLevel::High.is_high_risk());
        assert!(!RiskLevel::Medium.is_high_risk());
    }

    #[test]
    fn test_agent_kind_parse() {
        assert_eq!(AgentKind::parse("bias"), Some(AgentKind::Bias));
        assert_eq!(AgentKind::parse("factCheck"), Some(AgentKind::FactCheck));
        assert_eq!(AgentKind::parse("fact_check"), Some(AgentKind::FactCheck));
        assert_eq!(AgentKind::parse("Sentiment "), Some(AgentKind::Sentiment));
        assert_eq!(AgentKind::parse("toxicity"), None);
    }

    #[test]
    fn test_agent_kind_wire_names() {
        let json = serde_json::to_value(AgentKind::ALL).unwrap();
        assert_eq!(json, json!(["bias", "sentiment", "factCheck"]));
    }

    #[test]
    fn test_unknown_fact_check_status() {
        let result: FactCheckResult =
            serde_json::from_value(json!({"status": "inconclusive", "confidence": 0.4})).unwrap();
        assert_eq!(result.status, FactCheckStatus::Unknown);
        assert!(result.findings.is_empty());
    }

    #[test]
    fn test_agent_output_failed_shape() {
        let output: AgentOutput<SentimentResult> = AgentOutput::Failed {
            error: "timeout".to_string(),
        };
        assert_eq!(serde_json::to_value(&output).unwrap(), json!({"error": "timeout"}));
        assert!(output.completed().is_none());
        assert_eq!(output.error(), Some("timeout"));
    }

    #[test]
    fn test_request_defaults() {
        let request: AnalyzeRequest = serde_json::from_value(json!({"rows": ["a"]})).unwrap();
        assert_eq!(request.options, AnalysisOptions::default());

        let request: AnalyzeRequest =
            serde_json::from_value(json!({"rows": ["a"], "options": {"checkFacts": false}}))
                .unwrap();
        assert!(request.options.check_bias);
        assert!(!request.options.check_facts);
        assert!(!request.options.allows(AgentKind::FactCheck));
    }

    #[test]
    fn test_row_result_flattens() {
        let row = RowResult {
            index: 2,
            hash: "abc".to_string(),
            result: AggregatedResult::failed(
                "x".to_string(),
                RouterDecision::fail_open("boom"),
                "boom".to_string(),
            ),
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["index"], 2);
        assert_eq!(value["riskScore"], 0);
        assert_eq!(value["riskLevel"], "low");
        assert_eq!(value["fromCache"], false);
        assert_eq!(value["routingDecision"]["intent"], "mixed");
    }
}
