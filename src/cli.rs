//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::{AnalysisOptions, RiskLevel};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Credence - LLM-powered content credibility analysis
///
/// Routes each text through a triage classifier and only runs the bias,
/// sentiment and fact-check agents it actually needs, then scores the
/// combined findings into one risk level per row.
///
/// Examples:
///   credence analyze --input rows.json
///   credence analyze --input comments.txt --format json --fail-on high
///   credence serve --bind 0.0.0.0:8787
///   credence --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Ollama model used by the router and every agent
    ///
    /// Overrides [model].name; defaults to llama3.2:latest
    #[arg(short, long, global = true, env = "CREDENCE_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    ///
    /// Overrides [model].ollama_url; defaults to http://localhost:11434
    #[arg(long, global = true, value_name = "URL", env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .credence.toml in the current directory
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long, global = true)]
    pub temperature: Option<f32>,

    /// HTTP timeout for a single LLM request, in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Generate a default .credence.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Analyze a file of rows and write a report
    Analyze(AnalyzeArgs),

    /// Run the HTTP API
    Serve(ServeArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Rows to analyze: a JSON array of strings (.json) or one row per line
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Fail if any row is at or above this risk level
    ///
    /// Useful for CI pipelines. Exit code 2 when threshold is exceeded.
    /// Values: critical, high, medium, low
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,

    /// Never run the bias agent
    #[arg(long)]
    pub no_bias: bool,

    /// Never run the sentiment agent
    #[arg(long)]
    pub no_sentiment: bool,

    /// Never run the fact-check agent
    #[arg(long)]
    pub no_facts: bool,

    /// Run every enabled agent on every row without asking the router
    #[arg(long)]
    pub skip_routing: bool,

    /// Rows processed concurrently per chunk
    #[arg(long, value_name = "ROWS")]
    pub chunk_size: Option<usize>,

    /// Maximum rows accepted in one batch
    #[arg(long, value_name = "ROWS")]
    pub max_rows: Option<usize>,
}

impl AnalyzeArgs {
    pub fn options(&self) -> AnalysisOptions {
        AnalysisOptions {
            check_bias: !self.no_bias,
            check_sentiment: !self.no_sentiment,
            check_facts: !self.no_facts,
            skip_routing: self.skip_routing,
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on (overrides [server].bind)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Risk threshold for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl FailOnLevel {
    pub fn risk_level(self) -> RiskLevel {
        match self {
            FailOnLevel::Low => RiskLevel::Low,
            FailOnLevel::Medium => RiskLevel::Medium,
            FailOnLevel::High => RiskLevel::High,
            FailOnLevel::Critical => RiskLevel::Critical,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.command.is_none() {
            return Err("A subcommand is required: analyze or serve".to_string());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(Command::Analyze(ref analyze)) = self.command {
            if analyze.chunk_size == Some(0) {
                return Err("Chunk size must be at least 1".to_string());
            }
            if analyze.max_rows == Some(0) {
                return Err("Max rows must be at least 1".to_string());
            }
            if !analyze.input.is_file() {
                return Err(format!(
                    "Input file does not exist: {}",
                    analyze.input.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
