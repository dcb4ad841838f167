//! Credence - routed content credibility analysis
//!
//! Classifies each text with a triage router, runs only the bias,
//! sentiment and fact-check agents it needs, and folds their findings
//! into a 0-100 risk score. Runs as a batch CLI or as an HTTP service
//! streaming results over Server-Sent Events.
//!
//! Exit codes:
//!   0 - Success (no rows above threshold, or no --fail-on set)
//!   1 - Runtime error (connection, config, unreadable input, etc.)
//!   2 - Rows found at or above the --fail-on risk level

mod agent;
mod analysis;
mod cli;
mod config;
mod models;
mod normalizer;
mod report;
mod server;

use agent::{LlmClient, OllamaClient};
use analysis::{collect_outcome, PipelineEvent};
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{AnalyzeArgs, Args, Command, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use models::AnalyzeRequest;
use report::{BatchReport, ReportMetadata};
use server::AppState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("Credence v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let result = match args.command {
        Some(Command::Analyze(ref analyze)) => run_analyze(&args, analyze).await,
        Some(Command::Serve(_)) => run_serve(&args).await.map(|_| 0),
        None => Ok(0),
    };

    match result {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Credence failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .credence.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    std::fs::write(path, Config::default_toml())
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize the model, timeouts, chunk size, and more.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` takes precedence over the verbosity flags.
fn init_logging(args: &Args) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(args.log_level()).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load configuration from file or use defaults, then apply CLI overrides.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        Config::load(config_path)?
    } else {
        match Config::load_default() {
            Ok(Some(config)) => {
                info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
                config
            }
            Ok(None) => {
                debug!("No config file found, using defaults");
                Config::default()
            }
            Err(e) => {
                warn!("Failed to load config: {:#}", e);
                Config::default()
            }
        }
    };

    config.merge_with_args(args);
    Ok(config)
}

fn connect(config: &Config) -> Result<Arc<dyn LlmClient>> {
    let client = OllamaClient::new(config.client_config())
        .context("Failed to create the Ollama client")?;
    Ok(Arc::new(client))
}

/// Run a batch from a file. Returns the exit code (0 or 2).
async fn run_analyze(args: &Args, analyze: &AnalyzeArgs) -> Result<i32> {
    let start_time = Instant::now();
    let config = load_config(args)?;

    let rows = read_rows(&analyze.input)?;
    let total = rows.len();
    println!("📥 Loaded {} rows from {}", total, analyze.input.display());

    println!("🤖 Model: {} ({})", config.model.name, config.model.ollama_url);
    let pipeline = analysis::build_pipeline(&config, connect(&config)?);

    let request = AnalyzeRequest {
        rows,
        options: analyze.options(),
    };
    let events = pipeline.stream(request)?;

    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total as u64)
    };
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rows ({eta})")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let outcome = collect_outcome(events, |event| match event {
        PipelineEvent::Progress { completed, .. } => progress.set_position(*completed as u64),
        PipelineEvent::Row { result } => {
            if let Some(ref err) = result.result.error {
                progress.println(format!("   ⚠️  Row {}: {}", result.index, err));
            }
        }
        _ => {}
    })
    .await;
    progress.finish_and_clear();

    let duration = start_time.elapsed().as_secs_f64();
    let report = BatchReport {
        metadata: ReportMetadata {
            input: analyze.input.display().to_string(),
            analysis_date: Utc::now(),
            model_used: config.model.name.clone(),
            total_rows: total,
            duration_seconds: duration,
        },
        outcome,
    };

    let output = match analyze.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    let output_path = output_path(analyze, &config);
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    let summary = &report.outcome.summary;
    let dist = &summary.aggregate.risk_distribution;
    println!("\n📊 Analysis Summary:");
    println!(
        "   Rows: {} | Errors: {} | Cache hits: {}",
        summary.processed_rows, summary.error_count, summary.metrics.cache_hits
    );
    println!(
        "   - 🔴 Critical: {} | 🟠 High: {} | 🟡 Medium: {} | 🟢 Low: {}",
        dist.critical, dist.high, dist.medium, dist.low
    );
    println!(
        "   Agent calls: {} of {} ({:.0}% saved by routing)",
        summary.metrics.cost_savings.agent_calls_made,
        summary.metrics.cost_savings.max_agent_calls,
        summary.metrics.cost_savings.savings_percent
    );
    println!("   Duration: {:.1}s", duration);
    println!("\n✅ Analysis complete! Report saved to: {}", output_path.display());

    if let Some(fail_level) = analyze.fail_on {
        let threshold = fail_level.risk_level();
        let above = report
            .outcome
            .results
            .iter()
            .any(|r| r.result.risk_level >= threshold);

        if above {
            eprintln!(
                "\n⛔ Rows found at or above {} risk. Failing (exit code 2).",
                threshold
            );
            return Ok(2);
        }
    }

    Ok(0)
}

async fn run_serve(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let llm = connect(&config)?;
    let model = llm.model_name().to_string();
    let pipeline = analysis::build_pipeline(&config, llm);

    println!("🌐 Serving on http://{}", config.server.bind);
    println!("   Model: {} ({})", model, config.model.ollama_url);

    let state = AppState {
        pipeline: Arc::new(pipeline),
        model,
        route_concurrency: config.router.batch_concurrency,
    };

    server::serve(&config.server.bind, state).await
}

/// Read rows from a JSON array of strings (`.json`) or one row per
/// non-empty line.
fn read_rows(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content).with_context(|| {
            format!(
                "{} must contain a JSON array of strings",
                path.display()
            )
        })
    } else {
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }
}

/// The explicit `--output`, else the configured default with its
/// extension matched to the format.
fn output_path(analyze: &AnalyzeArgs, config: &Config) -> PathBuf {
    if let Some(ref output) = analyze.output {
        return output.clone();
    }

    let path = PathBuf::from(&config.general.output);
    match analyze.format {
        OutputFormat::Json => path.with_extension("json"),
        OutputFormat::Markdown => path,
    }
}
