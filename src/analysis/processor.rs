//! Per-row analysis: route, run the needed agents concurrently, aggregate.
//!
//! A row always resolves to an [`AggregatedResult`]. An agent failure
//! only replaces that agent's field with an error marker.

use crate::agent::router::should_skip;
use crate::agent::{AgentError, AgentResult, AgentSet, TriageRouter};
use crate::analysis::aggregator::{aggregate, AgentOutputs};
use crate::models::{AgentKind, AgentOutput, AggregatedResult, AnalysisOptions, RouterDecision};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type Slot = Option<Result<AgentResult, AgentError>>;

pub struct RowProcessor {
    router: Arc<TriageRouter>,
    agents: AgentSet,
    agent_timeout: Duration,
}

impl RowProcessor {
    pub fn new(router: Arc<TriageRouter>, agents: AgentSet, agent_timeout: Duration) -> Self {
        Self {
            router,
            agents,
            agent_timeout,
        }
    }

    pub fn router(&self) -> &TriageRouter {
        &self.router
    }

    /// Analyze one row of cleaned text.
    pub async fn process_row(&self, text: &str, options: &AnalysisOptions) -> AggregatedResult {
        if text.trim().is_empty() {
            return skipped(text, RouterDecision::empty_text());
        }

        let decision = if options.skip_routing {
            RouterDecision::routing_skipped()
        } else {
            let decision = self.router.route(text).await;
            if should_skip(&decision) {
                debug!("Router marked row safe; skipping agents");
                return skipped(text, decision);
            }
            decision
        };

        let agents_run: Vec<AgentKind> = AgentKind::ALL
            .into_iter()
            .filter(|kind| decision.needs(*kind) && options.allows(*kind))
            .collect();

        if agents_run.is_empty() {
            debug!("No enabled agent needed for {} row", decision.intent);
            return skipped(text, decision);
        }

        let outputs = self.run_agents(text, &agents_run).await;

        let error = if outputs.completed_count() == 0 {
            Some(format!("All agents failed: {}", outputs.failures().join("; ")))
        } else {
            None
        };

        aggregate(text.to_string(), outputs, decision, agents_run, false, error)
    }

    /// Run every selected agent at once and collect each slot separately.
    async fn run_agents(&self, text: &str, agents_run: &[AgentKind]) -> AgentOutputs {
        let (bias, sentiment, fact_check) = tokio::join!(
            self.slot(AgentKind::Bias, text, agents_run),
            self.slot(AgentKind::Sentiment, text, agents_run),
            self.slot(AgentKind::FactCheck, text, agents_run),
        );

        AgentOutputs {
            bias: settle(AgentKind::Bias, bias, |r| match r {
                AgentResult::Bias(b) => Some(b),
                _ => None,
            }),
            sentiment: settle(AgentKind::Sentiment, sentiment, |r| match r {
                AgentResult::Sentiment(s) => Some(s),
                _ => None,
            }),
            fact_check: settle(AgentKind::FactCheck, fact_check, |r| match r {
                AgentResult::FactCheck(f) => Some(f),
                _ => None,
            }),
        }
    }

    async fn slot(&self, kind: AgentKind, text: &str, agents_run: &[AgentKind]) -> Slot {
        if !agents_run.contains(&kind) {
            return None;
        }

        let agent = self.agents.get(kind);
        debug!("Running {} agent", agent.kind());
        let outcome = match tokio::time::timeout(self.agent_timeout, agent.analyze(text)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AgentError::Timeout(self.agent_timeout)),
        };
        Some(outcome)
    }
}

/// Turn a raw agent slot into the typed field for the result.
fn settle<T>(
    kind: AgentKind,
    slot: Slot,
    extract: impl FnOnce(AgentResult) -> Option<T>,
) -> Option<AgentOutput<T>> {
    let outcome = slot?;
    let output = match outcome {
        Ok(result) => {
            let actual = result.kind();
            match extract(result) {
                Some(value) => AgentOutput::Completed(value),
                None => AgentOutput::Failed {
                    error: AgentError::WrongKind {
                        expected: kind,
                        actual,
                    }
                    .to_string(),
                },
            }
        }
        Err(e) => {
            warn!("{} agent failed: {}", kind, e);
            AgentOutput::Failed {
                error: e.to_string(),
            }
        }
    };
    Some(output)
}

fn skipped(text: &str, decision: RouterDecision) -> AggregatedResult {
    aggregate(
        text.to_string(),
        AgentOutputs::default(),
        decision,
        Vec::new(),
        false,
        None,
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::agent::fakes::{
        bias_result, fact_check_result, sentiment_result, CountingAgent, ScriptedLlm,
    };
    use crate::agent::LlmError;
    use crate::models::{FactCheckStatus, Intent, RiskLevel, SentimentClass};
    use serde_json::{json, Value};
    use std::time::Instant;

    pub(crate) struct Harness {
        pub processor: RowProcessor,
        pub router_llm: Arc<ScriptedLlm>,
        pub bias: Arc<CountingAgent>,
        pub sentiment: Arc<CountingAgent>,
        pub fact_check: Arc<CountingAgent>,
    }

    pub(crate) fn default_bias() -> CountingAgent {
        CountingAgent::new(AgentKind::Bias, |_| Ok(AgentResult::Bias(bias_result(0.9, true))))
    }

    pub(crate) fn default_sentiment() -> CountingAgent {
        CountingAgent::new(AgentKind::Sentiment, |_| {
            Ok(AgentResult::Sentiment(sentiment_result(
                SentimentClass::Negative,
                0.9,
                0.9,
            )))
        })
    }

    pub(crate) fn default_fact_check() -> CountingAgent {
        CountingAgent::new(AgentKind::FactCheck, |_| {
            Ok(AgentResult::FactCheck(fact_check_result(
                FactCheckStatus::Unverified,
                0.6,
            )))
        })
    }

    pub(crate) fn harness(
        router_llm: ScriptedLlm,
        bias: CountingAgent,
        sentiment: CountingAgent,
        fact_check: CountingAgent,
    ) -> Harness {
        harness_with_timeout(router_llm, bias, sentiment, fact_check, Duration::from_secs(5))
    }

    pub(crate) fn harness_with_timeout(
        router_llm: ScriptedLlm,
        bias: CountingAgent,
        sentiment: CountingAgent,
        fact_check: CountingAgent,
        agent_timeout: Duration,
    ) -> Harness {
        let router_llm = Arc::new(router_llm);
        let bias = Arc::new(bias);
        let sentiment = Arc::new(sentiment);
        let fact_check = Arc::new(fact_check);

        let router = Arc::new(TriageRouter::new(router_llm.clone(), Duration::from_secs(15)));
        let agents = AgentSet {
            bias: bias.clone(),
            sentiment: sentiment.clone(),
            fact_check: fact_check.clone(),
        };

        Harness {
            processor: RowProcessor::new(router, agents, agent_timeout),
            router_llm,
            bias,
            sentiment,
            fact_check,
        }
    }

    fn routed(decision: Value) -> Harness {
        harness(
            ScriptedLlm::replying(decision),
            default_bias(),
            default_sentiment(),
            default_fact_check(),
        )
    }

    #[tokio::test]
    async fn test_safe_row_makes_no_agent_calls() {
        let h = routed(json!({"intent": "safe", "confidence": 0.95, "agentsNeeded": []}));

        let result = h
            .processor
            .process_row("The sky is blue.", &AnalysisOptions::default())
            .await;

        assert_eq!(result.risk_score, 0);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.confidence, 1.0);
        assert!(result.agents_run.is_empty());
        assert_eq!(result.routing_decision.intent, Intent::Safe);
        assert_eq!(h.bias.call_count(), 0);
        assert_eq!(h.sentiment.call_count(), 0);
        assert_eq!(h.fact_check.call_count(), 0);
    }

    #[tokio::test]
    async fn test_only_routed_agents_run() {
        let h = routed(json!({"intent": "subjective", "agentsNeeded": ["sentiment"]}));

        let result = h
            .processor
            .process_row("This film was awful.", &AnalysisOptions::default())
            .await;

        assert_eq!(result.agents_run, vec![AgentKind::Sentiment]);
        assert!(result.bias.is_none());
        assert!(result.fact_check.is_none());
        assert_eq!(h.sentiment.call_count(), 1);
        assert_eq!(h.bias.call_count(), 0);
        // 0.9 * 100 * 0.9 * 0.2
        assert_eq!(result.risk_score, 16);
    }

    #[tokio::test]
    async fn test_options_intersect_with_router() {
        let h = routed(json!({"intent": "mixed", "agentsNeeded": ["bias", "sentiment", "factCheck"]}));
        let options = AnalysisOptions {
            check_bias: false,
            check_facts: false,
            ..AnalysisOptions::default()
        };

        let result = h.processor.process_row("text", &options).await;

        assert_eq!(result.agents_run, vec![AgentKind::Sentiment]);
        assert_eq!(h.bias.call_count(), 0);
        assert_eq!(h.fact_check.call_count(), 0);
    }

    #[tokio::test]
    async fn test_all_options_disabled_is_fast_path() {
        let h = routed(json!({"intent": "sensitive", "agentsNeeded": ["bias"]}));
        let options = AnalysisOptions {
            check_bias: false,
            check_sentiment: false,
            check_facts: false,
            skip_routing: false,
        };

        let result = h.processor.process_row("text", &options).await;
        assert!(result.agents_run.is_empty());
        assert_eq!(result.risk_score, 0);
        assert_eq!(h.bias.call_count(), 0);
    }

    #[tokio::test]
    async fn test_skip_routing_runs_everything() {
        let h = routed(json!({"intent": "safe", "agentsNeeded": []}));
        let options = AnalysisOptions {
            skip_routing: true,
            ..AnalysisOptions::default()
        };

        let result = h.processor.process_row("text", &options).await;

        assert_eq!(h.router_llm.call_count(), 0);
        assert_eq!(result.agents_run, AgentKind::ALL.to_vec());
        assert_eq!(h.bias.call_count(), 1);
        assert_eq!(h.sentiment.call_count(), 1);
        assert_eq!(h.fact_check.call_count(), 1);
    }

    #[tokio::test]
    async fn test_router_failure_runs_all_agents() {
        let h = harness(
            ScriptedLlm::failing(),
            default_bias(),
            default_sentiment(),
            default_fact_check(),
        );

        let result = h
            .processor
            .process_row("text", &AnalysisOptions::default())
            .await;

        assert_eq!(result.routing_decision.intent, Intent::Mixed);
        assert_eq!(result.agents_run.len(), 3);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_partial_agent_failure_is_isolated() {
        let h = harness(
            ScriptedLlm::replying(json!({"intent": "mixed", "agentsNeeded": ["bias", "sentiment", "factCheck"]})),
            CountingAgent::new(AgentKind::Bias, |_| {
                Err(AgentError::Llm(LlmError::Api {
                    status: 500,
                    body: "overloaded".to_string(),
                }))
            }),
            default_sentiment(),
            default_fact_check(),
        );

        let result = h
            .processor
            .process_row("text", &AnalysisOptions::default())
            .await;

        assert!(result.error.is_none());
        assert!(result.bias_result().is_none());
        assert!(result
            .bias
            .as_ref()
            .and_then(AgentOutput::error)
            .is_some_and(|e| e.contains("overloaded")));
        assert!(result.sentiment_result().is_some());
        assert!(result.fact_check_result().is_some());
        // sentiment 16.2 + unverified 20, bias contributes nothing
        assert_eq!(result.risk_score, 36);
    }

    #[tokio::test]
    async fn test_all_agents_failing_sets_row_error() {
        let fail = |kind| {
            CountingAgent::new(kind, |_| Err(AgentError::Timeout(Duration::from_secs(1))))
        };
        let h = harness(
            ScriptedLlm::failing(),
            fail(AgentKind::Bias),
            fail(AgentKind::Sentiment),
            fail(AgentKind::FactCheck),
        );

        let result = h
            .processor
            .process_row("text", &AnalysisOptions::default())
            .await;

        assert!(result.error.as_deref().is_some_and(|e| e.starts_with("All agents failed")));
        assert_eq!(result.risk_score, 0);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_wrong_kind_is_an_agent_error() {
        let h = harness(
            ScriptedLlm::replying(json!({"intent": "sensitive", "agentsNeeded": ["bias"]})),
            CountingAgent::new(AgentKind::Bias, |_| {
                Ok(AgentResult::Sentiment(sentiment_result(
                    SentimentClass::Neutral,
                    0.5,
                    0.1,
                )))
            }),
            default_sentiment(),
            default_fact_check(),
        );

        let result = h
            .processor
            .process_row("text", &AnalysisOptions::default())
            .await;
        let error = result.bias.as_ref().and_then(AgentOutput::error).unwrap();
        assert!(error.contains("bias agent returned a sentiment result"));
    }

    #[tokio::test]
    async fn test_agents_run_concurrently_and_time_out() {
        let slow = Duration::from_millis(150);
        let h = harness_with_timeout(
            ScriptedLlm::replying(json!({"intent": "mixed"})),
            default_bias().with_delay(slow),
            default_sentiment().with_delay(slow),
            default_fact_check().with_delay(Duration::from_secs(30)),
            Duration::from_millis(400),
        );

        let started = Instant::now();
        let result = h
            .processor
            .process_row("text", &AnalysisOptions::default())
            .await;
        let elapsed = started.elapsed();

        // sequential calls would need 150 + 150 + 400ms
        assert!(elapsed >= Duration::from_millis(400));
        assert!(elapsed < Duration::from_millis(650));
        assert!(result.bias_result().is_some());
        assert!(result.sentiment_result().is_some());
        assert!(result
            .fact_check
            .as_ref()
            .and_then(AgentOutput::error)
            .is_some_and(|e| e.contains("timed out")));
    }

    #[tokio::test]
    async fn test_empty_text_makes_no_calls() {
        let h = routed(json!({"intent": "mixed"}));
        let result = h
            .processor
            .process_row("   ", &AnalysisOptions::default())
            .await;
        assert_eq!(h.router_llm.call_count(), 0);
        assert_eq!(result.routing_decision.intent, Intent::Safe);
        assert_eq!(result.risk_score, 0);
    }
}
