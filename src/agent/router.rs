//! Triage router.
//!
//! A cheap classification call that decides which analysis agents a
//! snippet actually needs. Classification failures fail open: the
//! router then asks for every agent rather than silently skipping one.

use super::{JsonPrompt, LlmClient};
use crate::models::{AgentKind, ContentFlags, Intent, RouterDecision};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default chunk size for [`TriageRouter::route_batch`].
pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;

/// Raw classifier output before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Classification {
    intent: Intent,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    agents_needed: Option<Vec<String>>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    content_flags: ContentFlags,
}

fn default_confidence() -> f64 {
    0.5
}

pub struct TriageRouter {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl TriageRouter {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Classify one snippet. Never fails.
    pub async fn route(&self, text: &str) -> RouterDecision {
        let prompt = JsonPrompt::new(
            ROUTER_SYSTEM_PROMPT,
            format!("Classify this text:\n\n{}", text),
        );

        let value = match tokio::time::timeout(self.timeout, self.llm.complete_json(&prompt)).await
        {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!("Router classification failed, running all agents: {}", e);
                return RouterDecision::fail_open(&e.to_string());
            }
            Err(_) => {
                warn!(
                    "Router classification timed out after {}s, running all agents",
                    self.timeout.as_secs()
                );
                return RouterDecision::fail_open("classification timed out");
            }
        };

        match parse_decision(value) {
            Ok(decision) => {
                debug!(
                    "Routed as {} ({:.2}): {:?}",
                    decision.intent, decision.confidence, decision.agents_needed
                );
                decision
            }
            Err(e) => {
                warn!("Router returned malformed decision, running all agents: {}", e);
                RouterDecision::fail_open(&format!("malformed classification: {}", e))
            }
        }
    }

    /// Classify many snippets, `concurrency` at a time. Output order
    /// matches input order.
    pub async fn route_batch(&self, texts: &[String], concurrency: usize) -> Vec<RouterDecision> {
        let mut decisions = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(concurrency.max(1)) {
            let routed = join_all(chunk.iter().map(|text| self.route(text))).await;
            decisions.extend(routed);
        }

        decisions
    }
}

/// True iff the decision is the safe skip path.
pub fn should_skip(decision: &RouterDecision) -> bool {
    decision.intent == Intent::Safe && decision.agents_needed.is_empty()
}

fn parse_decision(value: Value) -> Result<RouterDecision, serde_json::Error> {
    let classification: Classification = serde_json::from_value(value)?;

    let agents_needed = match classification.agents_needed {
        Some(names) => {
            let mut agents: Vec<AgentKind> =
                names.iter().filter_map(|name| AgentKind::parse(name)).collect();
            agents.sort();
            agents.dedup();
            agents
        }
        None => classification.intent.default_agents(),
    };

    let confidence = if classification.confidence.is_nan() {
        default_confidence()
    } else {
        classification.confidence.clamp(0.0, 1.0)
    };

    Ok(RouterDecision {
        intent: classification.intent,
        confidence,
        agents_needed,
        reasoning: classification.reasoning,
        content_flags: classification.content_flags,
    })
}

const ROUTER_SYSTEM_PROMPT: &str = r#"You are a triage router for a content credibility system. Decide which analysis agents a text needs.

Intents:
- safe: greetings, chit-chat, trivial or common-knowledge statements. agentsNeeded: []
- subjective: opinions, reviews, feelings. agentsNeeded: ["sentiment"]
- factual: verifiable claims about events, statistics, people. agentsNeeded: ["factCheck"]
- sensitive: politics, religion, gender, groups of people. agentsNeeded: ["bias"] plus others that apply
- mixed: several of the above. agentsNeeded: every relevant agent

Respond with one JSON object:
{"intent": "factual"|"sensitive"|"subjective"|"mixed"|"safe",
 "confidence": 0.0-1.0,
 "agentsNeeded": ["bias"|"sentiment"|"factCheck"],
 "reasoning": string,
 "contentFlags": {"hasFactualClaims": bool, "hasSensitiveTopics": bool,
                  "hasEmotionalContent": bool, "isChitChat": bool}}"#;
