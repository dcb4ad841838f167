//! Configuration file handling.
//!
//! Settings come from a `.credence.toml` file; CLI flags and environment
//! variables are merged on top with [`Config::merge_with_args`].

use crate::agent::ClientConfig;
use crate::analysis::PipelineSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = ".credence.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub agents: AgentsConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default report path for `analyze`.
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
        }
    }
}

fn default_output() -> String {
    "credence_report.md".to_string()
}

/// LLM model settings shared by the router and the agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub name: String,

    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP timeout for a single LLM request.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Retries on transport failures.
    #[serde(default = "default_retries")]
    pub retries: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            retries: default_retries(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout() -> u64 {
    60
}

fn default_retries() -> usize {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Upper bound on one classification; past it the router fails open.
    #[serde(default = "default_router_timeout")]
    pub timeout_seconds: u64,

    /// Concurrent classifications for `/api/route`.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_router_timeout(),
            batch_concurrency: default_batch_concurrency(),
        }
    }
}

fn default_router_timeout() -> u64 {
    15
}

fn default_batch_concurrency() -> usize {
    crate::agent::router::DEFAULT_BATCH_CONCURRENCY
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Upper bound on one agent call.
    #[serde(default = "default_agent_timeout")]
    pub timeout_seconds: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_agent_timeout(),
        }
    }
}

fn default_agent_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_rows: default_max_rows(),
        }
    }
}

fn default_chunk_size() -> usize {
    crate::analysis::pipeline::DEFAULT_CHUNK_SIZE
}

fn default_max_rows() -> usize {
    crate::analysis::pipeline::DEFAULT_MAX_ROWS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the current directory.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(DEFAULT_CONFIG_FILE);

        if path.exists() {
            Ok(Some(Self::load(&path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given on the command line or through their env vars
    /// override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }

        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        if let Some(crate::cli::Command::Analyze(ref analyze)) = args.command {
            if let Some(chunk_size) = analyze.chunk_size {
                self.pipeline.chunk_size = chunk_size;
            }
            if let Some(max_rows) = analyze.max_rows {
                self.pipeline.max_rows = max_rows;
            }
            if let Some(ref output) = analyze.output {
                self.general.output = output.display().to_string();
            }
        }

        if let Some(crate::cli::Command::Serve(ref serve)) = args.command {
            if let Some(ref bind) = serve.bind {
                self.server.bind = bind.clone();
            }
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            ollama_url: self.model.ollama_url.clone(),
            model_name: self.model.name.clone(),
            temperature: self.model.temperature,
            timeout_seconds: self.model.timeout_seconds,
            retries: self.model.retries,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            chunk_size: self.pipeline.chunk_size,
            max_rows: self.pipeline.max_rows,
        }
    }

    pub fn router_timeout(&self) -> Duration {
        Duration::from_secs(self.router.timeout_seconds)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agents.timeout_seconds)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
