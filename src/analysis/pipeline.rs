//! Streaming batch controller.
//!
//! Drives the rows of one request through the row processor in
//! fixed-size chunks and exposes the run as a stream of
//! [`PipelineEvent`]s: `start`, one `row` per input row, one `progress`
//! per chunk, then a single `complete`. Chunks are strict barriers; rows
//! inside a chunk run concurrently and are emitted as they resolve.

use crate::analysis::aggregator::{calculate_aggregate_stats, AggregateStats};
use crate::analysis::cache::RequestCache;
use crate::analysis::processor::RowProcessor;
use crate::analysis::stats::{LegacyStats, PipelineMetrics};
use crate::models::{AggregatedResult, AnalysisOptions, AnalyzeRequest, RouterDecision, RowResult};
use crate::normalizer::normalize;
use async_stream::stream;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

pub const DEFAULT_CHUNK_SIZE: usize = 3;
pub const DEFAULT_MAX_ROWS: usize = 100;

/// Request rejected before any processing starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("rows must be a non-empty array of strings")]
    EmptyRows,

    #[error("too many rows: {count} (maximum {max})")]
    TooManyRows { count: usize, max: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub chunk_size: usize,
    pub max_rows: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

/// Payload of the final `complete` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
    pub stats: LegacyStats,
    pub aggregate: AggregateStats,
    pub metrics: PipelineMetrics,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub error_count: usize,
}

impl CompletionSummary {
    pub fn new(results: &[RowResult], total_rows: usize, elapsed: Duration) -> Self {
        let results: Vec<AggregatedResult> = results.iter().map(|r| r.result.clone()).collect();
        let aggregate = calculate_aggregate_stats(&results);
        let metrics = PipelineMetrics::new(&results, &aggregate, elapsed);

        Self {
            stats: LegacyStats::from_results(&results),
            error_count: results.iter().filter(|r| r.error.is_some()).count(),
            processed_rows: results.len(),
            total_rows,
            aggregate,
            metrics,
        }
    }
}

/// One event of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PipelineEvent {
    Start { total: usize },
    Row { result: RowResult },
    Progress { completed: usize, total: usize },
    Complete(CompletionSummary),
}

/// Everything a non-streaming caller needs from a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    /// Row results in input order.
    pub results: Vec<RowResult>,
    #[serde(flatten)]
    pub summary: CompletionSummary,
}

/// Batch size check shared by every entry point that accepts rows.
pub fn validate_len(count: usize, max: usize) -> Result<(), ValidationError> {
    if count == 0 {
        return Err(ValidationError::EmptyRows);
    }
    if count > max {
        return Err(ValidationError::TooManyRows { count, max });
    }
    Ok(())
}

pub struct BatchPipeline {
    processor: Arc<RowProcessor>,
    settings: PipelineSettings,
}

impl BatchPipeline {
    pub fn new(processor: Arc<RowProcessor>, settings: PipelineSettings) -> Self {
        Self {
            processor,
            settings,
        }
    }

    pub fn processor(&self) -> &RowProcessor {
        &self.processor
    }

    pub fn settings(&self) -> PipelineSettings {
        self.settings
    }

    pub fn validate(&self, request: &AnalyzeRequest) -> Result<(), ValidationError> {
        validate_len(request.rows.len(), self.settings.max_rows)
    }

    /// Validate the request and return its event stream. Once the stream
    /// is returned it always ends with a `complete` event.
    pub fn stream(
        &self,
        request: AnalyzeRequest,
    ) -> Result<impl Stream<Item = PipelineEvent> + Send + 'static, ValidationError> {
        self.validate(&request)?;
        Ok(run(
            self.processor.clone(),
            self.settings.chunk_size.max(1),
            request,
        ))
    }
}

fn run(
    processor: Arc<RowProcessor>,
    chunk_size: usize,
    request: AnalyzeRequest,
) -> impl Stream<Item = PipelineEvent> + Send + 'static {
    let AnalyzeRequest { rows, options } = request;

    stream! {
        let started = Instant::now();
        let total = rows.len();
        // Lives exactly as long as this request.
        let cache = RequestCache::new();

        info!("Starting batch analysis of {} rows (chunk size {})", total, chunk_size);
        yield PipelineEvent::Start { total };

        let mut results: Vec<RowResult> = Vec::with_capacity(total);

        for (chunk_index, chunk) in rows.chunks(chunk_size).enumerate() {
            let offset = chunk_index * chunk_size;
            let mut pending: FuturesUnordered<_> = chunk
                .iter()
                .enumerate()
                .map(|(i, raw)| analyze_row(&processor, &cache, offset + i, raw, options))
                .collect();

            while let Some(row) = pending.next().await {
                results.push(row.clone());
                yield PipelineEvent::Row { result: row };
            }

            let completed = results.len().min(total);
            debug!("Chunk {} done ({}/{})", chunk_index + 1, completed, total);
            yield PipelineEvent::Progress { completed, total };
        }

        results.sort_by_key(|r| r.index);
        let summary = CompletionSummary::new(&results, total, started.elapsed());
        info!(
            "Batch complete: {} rows ({} unique), {} errors, {} cache hits, {:.0}% agent calls saved in {}ms",
            summary.processed_rows,
            cache.len().await,
            summary.error_count,
            summary.metrics.cache_hits,
            summary.metrics.cost_savings.savings_percent,
            summary.metrics.processing_time_ms
        );
        yield PipelineEvent::Complete(summary);
    }
}

/// Normalize, consult the cache, and compute on a miss. Panics anywhere
/// in the row are turned into an errored result.
async fn analyze_row(
    processor: &RowProcessor,
    cache: &RequestCache,
    index: usize,
    raw: &str,
    options: AnalysisOptions,
) -> RowResult {
    let normalized = normalize(raw);
    if normalized.is_empty() {
        debug!("Row {} is empty after normalization", index);
    }

    let work = cache.get_or_compute(&normalized.hash, || {
        processor.process_row(&normalized.cleaned_text, &options)
    });

    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(lookup) => {
            if lookup.hit {
                debug!("Row {} served from request cache", index);
            }
            RowResult {
                index,
                hash: normalized.hash.clone(),
                result: lookup.result,
            }
        }
        Err(panic) => {
            let message = panic_message(&*panic);
            error!("Row {} failed: {}", index, message);
            RowResult {
                index,
                hash: normalized.hash.clone(),
                result: AggregatedResult::failed(
                    normalized.cleaned_text.clone(),
                    RouterDecision::unavailable("row processing failed"),
                    format!("Row processing failed: {}", message),
                ),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Drain an event stream into a [`BatchOutcome`], passing every event to
/// `on_event` on the way.
pub async fn collect_outcome<S>(events: S, mut on_event: impl FnMut(&PipelineEvent)) -> BatchOutcome
where
    S: Stream<Item = PipelineEvent>,
{
    futures::pin_mut!(events);

    let mut results = Vec::new();
    let mut total = 0;
    let mut summary = None;

    while let Some(event) = events.next().await {
        on_event(&event);
        match event {
            PipelineEvent::Start { total: t } => total = t,
            PipelineEvent::Row { result } => results.push(result),
            PipelineEvent::Progress { .. } => {}
            PipelineEvent::Complete(s) => summary = Some(s),
        }
    }

    results.sort_by_key(|r: &RowResult| r.index);
    let summary = summary.unwrap_or_else(|| CompletionSummary::new(&results, total, Duration::ZERO));

    BatchOutcome { results, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::fakes::{sentiment_result, CountingAgent, ScriptedLlm};
    use crate::agent::{AgentResult, AgentSet, LlmClient, TriageRouter};
    use crate::analysis::processor::tests::{
        default_bias, default_fact_check, default_sentiment, harness, Harness,
    };
    use crate::models::{AgentKind, Intent, RiskLevel, SentimentClass};
    use serde_json::json;

    /// Invocation counters that stay with the test once the processor
    /// moves into the pipeline.
    struct Counters {
        router_llm: Arc<ScriptedLlm>,
        sentiment: Arc<CountingAgent>,
    }

    fn pipeline(h: Harness, chunk_size: usize) -> (BatchPipeline, Counters) {
        let counters = Counters {
            router_llm: h.router_llm,
            sentiment: h.sentiment,
        };
        let pipeline = BatchPipeline::new(
            Arc::new(h.processor),
            PipelineSettings {
                chunk_size,
                max_rows: DEFAULT_MAX_ROWS,
            },
        );
        (pipeline, counters)
    }

    fn request(rows: &[&str]) -> AnalyzeRequest {
        AnalyzeRequest {
            rows: rows.iter().map(|s| s.to_string()).collect(),
            options: AnalysisOptions::default(),
        }
    }

    async fn events_for(pipeline: &BatchPipeline, rows: &[&str]) -> Vec<PipelineEvent> {
        pipeline.stream(request(rows)).unwrap().collect().await
    }

    fn mixed_harness() -> Harness {
        harness(
            ScriptedLlm::replying(json!({"intent": "mixed"})),
            default_bias(),
            default_sentiment(),
            default_fact_check(),
        )
    }

    #[test]
    fn test_validate_len() {
        assert_eq!(validate_len(0, 100), Err(ValidationError::EmptyRows));
        assert_eq!(validate_len(1, 1), Ok(()));
        assert_eq!(validate_len(100, 100), Ok(()));
        assert_eq!(
            validate_len(101, 100),
            Err(ValidationError::TooManyRows { count: 101, max: 100 })
        );
    }

    #[test]
    fn test_validation() {
        let (pipeline, _) = pipeline(mixed_harness(), 3);

        assert_eq!(pipeline.validate(&request(&[])), Err(ValidationError::EmptyRows));

        let too_many: Vec<String> = (0..101).map(|i| format!("row {}", i)).collect();
        let err = pipeline
            .validate(&AnalyzeRequest {
                rows: too_many,
                options: AnalysisOptions::default(),
            })
            .unwrap_err();
        assert_eq!(err, ValidationError::TooManyRows { count: 101, max: 100 });

        let max: Vec<String> = (0..100).map(|i| format!("row {}", i)).collect();
        assert!(pipeline
            .validate(&AnalyzeRequest {
                rows: max,
                options: AnalysisOptions::default(),
            })
            .is_ok());
    }

    #[tokio::test]
    async fn test_rejected_request_makes_no_calls() {
        let (pipeline, counters) = pipeline(mixed_harness(), 3);
        assert!(pipeline.stream(request(&[])).is_err());
        assert_eq!(counters.router_llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_event_sequence_and_chunk_barriers() {
        let (pipeline, _) = pipeline(mixed_harness(), 3);
        let rows: Vec<String> = (0..10).map(|i| format!("distinct row {}", i)).collect();
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();

        let events = events_for(&pipeline, &rows).await;

        assert_eq!(events.first(), Some(&PipelineEvent::Start { total: 10 }));
        assert!(matches!(events.last(), Some(PipelineEvent::Complete(_))));

        let progress: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Progress { completed, total } => {
                    assert_eq!(*total, 10);
                    Some(*completed)
                }
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![3, 6, 9, 10]);

        // Every row between two progress events belongs to that chunk.
        let mut chunk = 0;
        for event in &events {
            match event {
                PipelineEvent::Row { result } => assert_eq!(result.index / 3, chunk),
                PipelineEvent::Progress { .. } => chunk += 1,
                _ => {}
            }
        }
        assert_eq!(chunk, 4);
    }

    #[tokio::test]
    async fn test_duplicate_rows_hit_cache() {
        let (pipeline, counters) = pipeline(
            harness(
                ScriptedLlm::replying(json!({"intent": "subjective", "agentsNeeded": ["sentiment"]})),
                default_bias(),
                default_sentiment(),
                default_fact_check(),
            ),
            3,
        );

        // Same chunk and across chunks, with whitespace differences.
        let outcome = collect_outcome(
            pipeline
                .stream(request(&["I hate Mondays", "other", "I hate  Mondays ", "I hate Mondays"]))
                .unwrap(),
            |_| {},
        )
        .await;

        assert_eq!(counters.sentiment.call_count(), 2);
        assert_eq!(counters.router_llm.call_count(), 2);

        let same: Vec<&RowResult> = outcome
            .results
            .iter()
            .filter(|r| r.result.text == "I hate Mondays")
            .collect();
        assert_eq!(same.len(), 3);
        assert_eq!(same.iter().filter(|r| !r.result.from_cache).count(), 1);
        assert!(same.windows(2).all(|w| w[0].hash == w[1].hash));
        assert!(same
            .windows(2)
            .all(|w| w[0].result.sentiment == w[1].result.sentiment));

        assert_eq!(outcome.summary.metrics.cache_hits, 2);
        assert_eq!(outcome.summary.metrics.cache_misses, 2);
        assert_eq!(outcome.summary.metrics.agent_invocations.sentiment, 2);
        assert_eq!(outcome.summary.metrics.cost_savings.max_agent_calls, 12);
    }

    #[tokio::test]
    async fn test_row_panic_is_contained() {
        let (pipeline, _) = pipeline(
            harness(
                ScriptedLlm::replying(json!({"intent": "subjective", "agentsNeeded": ["sentiment"]})),
                default_bias(),
                CountingAgent::new(AgentKind::Sentiment, |text| {
                    if text.contains("explode") {
                        panic!("sentiment backend crashed");
                    }
                    Ok(AgentResult::Sentiment(sentiment_result(
                        SentimentClass::Neutral,
                        0.8,
                        0.1,
                    )))
                }),
                default_fact_check(),
            ),
            3,
        );

        let mut progress = Vec::new();
        let outcome = collect_outcome(
            pipeline
                .stream(request(&["fine", "explode now", "also fine", "fine again"]))
                .unwrap(),
            |event| {
                if let PipelineEvent::Progress { completed, .. } = event {
                    progress.push(*completed);
                }
            },
        )
        .await;

        assert_eq!(progress, vec![3, 4]);
        assert_eq!(outcome.summary.processed_rows, 4);
        assert_eq!(outcome.summary.error_count, 1);

        let failed = &outcome.results[1];
        assert_eq!(failed.index, 1);
        assert_eq!(failed.result.risk_score, 0);
        assert_eq!(failed.result.risk_level, RiskLevel::Low);
        assert!(failed
            .result
            .error
            .as_deref()
            .is_some_and(|e| e.contains("sentiment backend crashed")));
        assert!(outcome.results[0].result.error.is_none());
    }

    #[tokio::test]
    async fn test_every_row_failing_still_completes() {
        let (pipeline, _) = pipeline(
            harness(
                ScriptedLlm::failing(),
                CountingAgent::new(AgentKind::Bias, |_| panic!("down")),
                CountingAgent::new(AgentKind::Sentiment, |_| panic!("down")),
                CountingAgent::new(AgentKind::FactCheck, |_| panic!("down")),
            ),
            2,
        );

        let events = events_for(&pipeline, &["a", "b", "c"]).await;
        let Some(PipelineEvent::Complete(summary)) = events.last() else {
            panic!("stream did not complete");
        };
        assert_eq!(summary.total_rows, 3);
        assert_eq!(summary.processed_rows, 3);
        assert_eq!(summary.error_count, 3);
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let llm = Arc::new(ScriptedLlm::new(|prompt| {
            let text = prompt.user.as_str();
            if prompt.system.contains("triage router") {
                if text.contains("sky is blue") {
                    Ok(json!({"intent": "safe", "confidence": 0.95, "agentsNeeded": []}))
                } else if text.contains("Party X") {
                    Ok(json!({
                        "intent": "sensitive",
                        "confidence": 0.9,
                        "agentsNeeded": ["bias", "sentiment"],
                        "contentFlags": {"hasSensitiveTopics": true, "hasEmotionalContent": true}
                    }))
                } else {
                    Ok(json!({"intent": "subjective", "confidence": 0.9, "agentsNeeded": ["sentiment"]}))
                }
            } else if prompt.system.contains("bias auditor") {
                Ok(json!({
                    "political": {"score": 0.95, "leaning": "right", "examples": ["all criminals and thieves"]},
                    "overallBiasScore": 0.9,
                    "flagged": true,
                    "summary": "Sweeping negative generalization about a political party."
                }))
            } else if prompt.system.contains("sentiment classifier") {
                if text.contains("Party X") {
                    Ok(json!({
                        "classification": "negative",
                        "confidence": 0.9,
                        "scores": {"positive": 0.02, "negative": 0.9, "neutral": 0.08}
                    }))
                } else {
                    Ok(json!({
                        "classification": "positive",
                        "confidence": 0.95,
                        "scores": {"positive": 0.93, "negative": 0.02, "neutral": 0.05}
                    }))
                }
            } else {
                Ok(json!({"status": "no_claims", "confidence": 1.0, "findings": []}))
            }
        }));
        let client: Arc<dyn LlmClient> = llm.clone();
        let processor = RowProcessor::new(
            Arc::new(TriageRouter::new(client.clone(), Duration::from_secs(15))),
            AgentSet::from_llm(client),
            Duration::from_secs(30),
        );
        let pipeline = BatchPipeline::new(Arc::new(processor), PipelineSettings::default());

        let outcome = collect_outcome(
            pipeline
                .stream(request(&[
                    "The sky is blue.",
                    "Party X are all criminals and thieves.",
                    "I love sunny days!",
                ]))
                .unwrap(),
            |_| {},
        )
        .await;

        let [safe, sensitive, subjective] = &outcome.results[..] else {
            panic!("expected three results");
        };

        assert_eq!(safe.result.routing_decision.intent, Intent::Safe);
        assert!(safe.result.agents_run.is_empty());
        assert_eq!(safe.result.risk_score, 0);

        assert_eq!(sensitive.result.routing_decision.intent, Intent::Sensitive);
        assert!(sensitive.result.bias_result().is_some_and(|b| b.flagged));
        assert!(sensitive.result.risk_level >= RiskLevel::High);

        assert_eq!(subjective.result.agents_run, vec![AgentKind::Sentiment]);
        assert_eq!(
            subjective.result.sentiment_result().map(|s| s.classification),
            Some(SentimentClass::Positive)
        );
        assert_eq!(subjective.result.risk_score, 0);

        assert!(outcome.summary.metrics.high_risk_count >= 1);
        assert_eq!(outcome.summary.metrics.skipped_rows, 1);
        assert_eq!(outcome.summary.metrics.cost_savings.agent_calls_made, 3);
        // 3 router calls + bias + 2 sentiment
        assert_eq!(llm.call_count(), 6);
    }
}
