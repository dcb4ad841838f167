//! Sentiment classification agent.

use super::{decode, unit, AgentError, AgentResult, AnalysisAgent, JsonPrompt, LlmClient};
use crate::models::{AgentKind, SentimentResult};
use async_trait::async_trait;
use std::sync::Arc;

pub struct SentimentAgent {
    llm: Arc<dyn LlmClient>,
}

impl SentimentAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl AnalysisAgent for SentimentAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Sentiment
    }

    async fn analyze(&self, text: &str) -> Result<AgentResult, AgentError> {
        let prompt = JsonPrompt::new(
            SENTIMENT_SYSTEM_PROMPT,
            format!("Classify the sentiment of this text:\n\n{}", text),
        );
        let value = self.llm.complete_json(&prompt).await?;
        let mut result = decode::<SentimentResult>(AgentKind::Sentiment, value)?;

        result.confidence = unit(result.confidence);
        result.scores.positive = unit(result.scores.positive);
        result.scores.negative = unit(result.scores.negative);
        result.scores.neutral = unit(result.scores.neutral);

        Ok(AgentResult::Sentiment(result))
    }
}

const SENTIMENT_SYSTEM_PROMPT: &str = r#"You are a sentiment classifier.
Respond with one JSON object:
{"classification": "positive"|"negative"|"neutral"|"mixed",
 "confidence": 0.0-1.0,
 "scores": {"positive": 0.0-1.0, "negative": 0.0-1.0, "neutral": 0.0-1.0},
 "reasoning": string}
Scores should sum to roughly 1."#;
