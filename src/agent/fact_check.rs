//! Fact-check agent.
//!
//! Extracts checkable claims and assigns each a verdict. The overall
//! status is recomputed from the findings when the model claims there
//! were none; a status it does not recognise stays unknown.

use super::{decode, unit, AgentError, AgentResult, AnalysisAgent, JsonPrompt, LlmClient};
use crate::models::{AgentKind, ClaimVerdict, FactCheckResult, FactCheckStatus};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct FactCheckAgent {
    llm: Arc<dyn LlmClient>,
}

impl FactCheckAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl AnalysisAgent for FactCheckAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::FactCheck
    }

    async fn analyze(&self, text: &str) -> Result<AgentResult, AgentError> {
        let prompt = JsonPrompt::new(
            FACT_CHECK_SYSTEM_PROMPT,
            format!("Fact-check the claims in this text:\n\n{}", text),
        );
        let value = self.llm.complete_json(&prompt).await?;
        let result = reconcile(decode::<FactCheckResult>(AgentKind::FactCheck, value)?);

        debug!(
            "Fact check status {:?} with {} findings",
            result.status,
            result.findings.len()
        );
        Ok(AgentResult::FactCheck(result))
    }
}

/// Make status, `verified` and findings agree with each other.
fn reconcile(mut result: FactCheckResult) -> FactCheckResult {
    result.confidence = unit(result.confidence);
    result.findings.retain(|f| !f.claim.trim().is_empty());

    if result.status == FactCheckStatus::NoClaims && !result.findings.is_empty() {
        result.status = status_from_findings(&result);
    }

    result.verified = result.status == FactCheckStatus::Verified;
    result
}

fn status_from_findings(result: &FactCheckResult) -> FactCheckStatus {
    let total = result.findings.len();
    let false_count = result.false_findings();
    let true_count = result
        .findings
        .iter()
        .filter(|f| f.verdict == ClaimVerdict::True)
        .count();

    if true_count == total {
        FactCheckStatus::Verified
    } else if false_count == total {
        FactCheckStatus::Disputed
    } else if false_count == 0 && true_count == 0 {
        FactCheckStatus::Unverified
    } else {
        FactCheckStatus::Mixed
    }
}

const FACT_CHECK_SYSTEM_PROMPT: &str = r#"You are a fact checker. Extract the verifiable factual claims in the text and judge each one.
Respond with one JSON object:
{"status": "verified"|"disputed"|"unverified"|"mixed"|"no_claims",
 "verified": bool,
 "confidence": 0.0-1.0,
 "findings": [{"claim": string, "verdict": "true"|"false"|"partially_true"|"unverifiable",
               "source": string|null, "explanation": string}],
 "summary": string}
Use "no_claims" with an empty findings list when the text makes no factual claims."#;
