//! Batch report rendering.

pub mod generator;

pub use generator::{generate_json_report, generate_markdown_report};

use crate::analysis::BatchOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    /// Input file the rows were read from.
    pub input: String,
    pub analysis_date: DateTime<Utc>,
    pub model_used: String,
    pub total_rows: usize,
    pub duration_seconds: f64,
}

/// A finished batch together with where and how it ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub metadata: ReportMetadata,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}
