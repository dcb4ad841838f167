//! Bias detection agent.

use super::{decode, unit, AgentError, AgentResult, AnalysisAgent, JsonPrompt, LlmClient};
use crate::models::{AgentKind, BiasCategory, BiasResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Score at or above which a category flags the text.
const FLAG_THRESHOLD: f64 = 0.5;

pub struct BiasAgent {
    llm: Arc<dyn LlmClient>,
}

impl BiasAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl AnalysisAgent for BiasAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Bias
    }

    async fn analyze(&self, text: &str) -> Result<AgentResult, AgentError> {
        let prompt = JsonPrompt::new(
            BIAS_SYSTEM_PROMPT,
            format!("Analyze this text for bias:\n\n{}", text),
        );
        let value = self.llm.complete_json(&prompt).await?;
        let result = sanitize(decode::<BiasResult>(AgentKind::Bias, value)?);

        debug!(
            "Bias score {:.2} (flagged: {})",
            result.overall_bias_score, result.flagged
        );
        Ok(AgentResult::Bias(result))
    }
}

fn sanitize_category(mut category: BiasCategory) -> BiasCategory {
    category.score = unit(category.score);
    category.examples.retain(|e| !e.trim().is_empty());
    category
}

/// Clamp scores and make `flagged` consistent with them.
fn sanitize(mut result: BiasResult) -> BiasResult {
    result.gender = sanitize_category(result.gender);
    result.religion = sanitize_category(result.religion);
    result.political = sanitize_category(result.political);
    result.overall_bias_score = unit(result.overall_bias_score);

    let max_category = result
        .gender
        .score
        .max(result.religion.score)
        .max(result.political.score);
    if max_category >= FLAG_THRESHOLD || result.overall_bias_score >= FLAG_THRESHOLD {
        result.flagged = true;
    }
    result
}

const BIAS_SYSTEM_PROMPT: &str = r#"You are a bias auditor. Score the text for gender, religious and political bias.
Respond with one JSON object:
{"gender": {"score": 0.0-1.0, "direction": string|null, "examples": [string]},
 "religion": {"score": 0.0-1.0, "direction": string|null, "examples": [string]},
 "political": {"score": 0.0-1.0, "leaning": "left"|"right"|"center"|null, "examples": [string]},
 "overallBiasScore": 0.0-1.0, "flagged": bool, "summary": string}
Examples must be exact spans from the text. Use 0 when a category is absent."#;
