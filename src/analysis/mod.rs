//! Row processing, scoring and the batch pipeline.

pub mod aggregator;
pub mod cache;
pub mod pipeline;
pub mod processor;
pub mod stats;

pub use pipeline::{
    collect_outcome, validate_len, BatchOutcome, BatchPipeline, PipelineEvent, PipelineSettings,
    ValidationError,
};
pub use processor::RowProcessor;

use crate::agent::{AgentSet, LlmClient, TriageRouter};
use crate::config::Config;
use std::sync::Arc;

/// Wire the router, agents and pipeline on top of one LLM client.
pub fn build_pipeline(config: &Config, llm: Arc<dyn LlmClient>) -> BatchPipeline {
    let router = Arc::new(TriageRouter::new(llm.clone(), config.router_timeout()));
    let processor = RowProcessor::new(router, AgentSet::from_llm(llm), config.agent_timeout());
    BatchPipeline::new(Arc::new(processor), config.pipeline_settings())
}
