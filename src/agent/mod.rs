//! LLM-backed agents: the triage router and the three analysis agents.
//!
//! Each analysis agent takes text and returns one [`AgentResult`]
//! variant. Agents are swappable behind [`AnalysisAgent`]; the row
//! processor only sees the trait.

pub mod bias;
pub mod client;
pub mod fact_check;
pub mod router;
pub mod sentiment;

pub use bias::BiasAgent;
pub use client::{ClientConfig, JsonPrompt, LlmClient, LlmError, OllamaClient};
pub use fact_check::FactCheckAgent;
pub use router::TriageRouter;
pub use sentiment::SentimentAgent;

use crate::models::{AgentKind, BiasResult, FactCheckResult, SentimentResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Output of one analysis agent.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentResult {
    Bias(BiasResult),
    Sentiment(SentimentResult),
    FactCheck(FactCheckResult),
}

impl AgentResult {
    pub fn kind(&self) -> AgentKind {
        match self {
            AgentResult::Bias(_) => AgentKind::Bias,
            AgentResult::Sentiment(_) => AgentKind::Sentiment,
            AgentResult::FactCheck(_) => AgentKind::FactCheck,
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("agent call timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("response did not match the {kind} schema: {message}")]
    Schema { kind: AgentKind, message: String },

    #[error("{expected} agent returned a {actual} result")]
    WrongKind {
        expected: AgentKind,
        actual: AgentKind,
    },
}

/// Uniform contract for bias, sentiment and fact-check analysis.
#[async_trait]
pub trait AnalysisAgent: Send + Sync {
    fn kind(&self) -> AgentKind;

    async fn analyze(&self, text: &str) -> Result<AgentResult, AgentError>;
}

/// One agent per kind, shared by every row of every request.
#[derive(Clone)]
pub struct AgentSet {
    pub bias: Arc<dyn AnalysisAgent>,
    pub sentiment: Arc<dyn AnalysisAgent>,
    pub fact_check: Arc<dyn AnalysisAgent>,
}

impl AgentSet {
    /// LLM-backed agents sharing one client.
    pub fn from_llm(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            bias: Arc::new(BiasAgent::new(llm.clone())),
            sentiment: Arc::new(SentimentAgent::new(llm.clone())),
            fact_check: Arc::new(FactCheckAgent::new(llm)),
        }
    }

    pub fn get(&self, kind: AgentKind) -> &Arc<dyn AnalysisAgent> {
        match kind {
            AgentKind::Bias => &self.bias,
            AgentKind::Sentiment => &self.sentiment,
            AgentKind::FactCheck => &self.fact_check,
        }
    }
}

/// Decode an agent payload into its typed shape.
pub(crate) fn decode<T: DeserializeOwned>(kind: AgentKind, value: Value) -> Result<T, AgentError> {
    serde_json::from_value(value).map_err(|e| AgentError::Schema {
        kind,
        message: e.to_string(),
    })
}

/// Clamp a model-reported score into [0, 1]; NaN becomes 0.
pub(crate) fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
