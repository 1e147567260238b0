//! `loadtest`: drive a preset load pattern against an OpenAI-compatible API.
//!
//! ```bash
//! # Three-iteration smoke check against the embeddings endpoint
//! loadtest run --scenario smoke --target embeddings
//!
//! # Recovery run with a config file, JSON report and Prometheus dump
//! loadtest run --scenario recovery --target completions \
//!   --config harness.toml --report-json report.json --prometheus-out metrics.prom
//!
//! # Show the stage timeline without sending traffic
//! loadtest plan --scenario spike --target completions
//!
//! # Fill-in-the-middle completions against a code model
//! OPENAI_CODING_MODEL=qwen-coder loadtest run --scenario prefix-caching --target completions
//! ```
//!
//! ## Environment Variables
//!
//! - `OPENAI_BASE_URL`, `OPENAI_API_KEY`, `OPENAI_COMPLETION_MODEL`,
//!   `OPENAI_EMBEDDING_MODEL`, `OPENAI_CODING_MODEL`: target overrides
//! - `MAX_TOKENS`, `MAX_OUTPUT_TOKENS`: `prefix-caching` and `decode-heavy`
//!   token budgets
//! - `VUS`, `TIME_WAIT`, `TIME_RAMP_UP`, `TIME_LOAD`, `TIME_RAMP_DOWN`:
//!   `load` pattern timings
//! - `LOG_FORMAT=json`: structured JSON output
//! - `RUST_LOG=info`: log level filter (default: info)

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tokio_prompt_loadtest::config::duration::parse_duration;
use tokio_prompt_loadtest::config::loader::{apply_env_overrides, load_from_file};
use tokio_prompt_loadtest::config::validation::{collapse, validate, ConfigError};
use tokio_prompt_loadtest::config::export_schema;
use tokio_prompt_loadtest::report::{RunMeta, RunReport};
use tokio_prompt_loadtest::scenarios::{self, ScenarioKind, Target};
use tokio_prompt_loadtest::{
    init_tracing, metrics, Config, Executor, HarnessError, HttpTransport, MetricSink, Transport,
};
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "loadtest", version, about = "Load patterns and recovery analysis for OpenAI-compatible APIs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a preset against the configured API.
    Run(RunArgs),
    /// Print the stage timeline and phase boundaries without sending traffic.
    Plan(PresetArgs),
    /// Print the JSON schema of the config file.
    Schema,
}

#[derive(Debug, Args)]
struct PresetArgs {
    /// Load pattern or workload shape.
    #[arg(long, value_enum)]
    scenario: ScenarioKind,
    /// API surface under test.
    #[arg(long, value_enum)]
    target: Target,
    /// TOML config file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Peak worker count for the `load` pattern.
    #[arg(long)]
    vus: Option<u32>,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    preset: PresetArgs,
    /// Hard wall-clock limit, e.g. `10m`.
    #[arg(long, value_parser = parse_duration)]
    deadline: Option<Duration>,
    /// Write the report as JSON.
    #[arg(long)]
    report_json: Option<PathBuf>,
    /// Write the Prometheus text exposition at end of run.
    #[arg(long)]
    prometheus_out: Option<PathBuf>,
}

fn resolve_config(path: Option<&Path>, vus: Option<u32>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => load_from_file(path)?,
        None => Config::default(),
    };
    apply_env_overrides(&mut config)?;
    if let Some(vus) = vus {
        config.runs.vus = vus;
    }
    validate(&config).map_err(collapse)?;
    Ok(config)
}

async fn run(args: RunArgs) -> Result<bool, HarnessError> {
    let mut config = resolve_config(args.preset.config.as_deref(), args.preset.vus)?;
    if args.deadline.is_some() {
        config.executor.deadline = args.deadline;
    }
    if args.prometheus_out.is_some() {
        config.observability.prometheus_out = args.prometheus_out;
    }

    if let Err(e) = init_tracing(config.observability.log_format) {
        eprintln!("{e}");
    }
    metrics::init_metrics()?;

    let preset = scenarios::preset(args.preset.scenario, args.preset.target, &config)?;
    let sink = Arc::new(MetricSink::new());
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config.target.request_timeout)?);
    let client = scenarios::build_client(&config, &preset, transport, Arc::clone(&sink));
    let detector = preset.detector(&sink)?;
    let body = Arc::new(preset.body(client, detector.clone()));
    let executor = Executor::new(
        preset.scenario.clone(),
        Arc::clone(&sink),
        preset.executor_options(&config),
    );

    let (abort_tx, abort_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            let _ = abort_tx.send(true);
        }
    });

    info!(
        scenario = preset.name(),
        base_url = %config.target.base_url,
        total = ?preset.scenario.total_duration(),
        "starting run"
    );
    let meta = RunMeta {
        scenario: preset.name().to_string(),
        target: preset.target.to_string(),
        started_at: Utc::now(),
    };
    let summary = executor.run(body, abort_rx).await;

    let report = RunReport::collect(
        meta,
        summary,
        &sink,
        detector.as_ref().map(|d| d.snapshot()),
        &preset.thresholds,
    );
    println!("{}", report.render_text());

    if let Some(path) = &args.report_json {
        report.write_json(path)?;
        info!(path = %path.display(), "report written");
    }
    if let Some(path) = &config.observability.prometheus_out {
        std::fs::write(path, metrics::gather_metrics())
            .map_err(|e| HarnessError::Other(format!("writing {}: {e}", path.display())))?;
        info!(path = %path.display(), "prometheus exposition written");
    }

    Ok(report.passed())
}

fn plan(args: &PresetArgs) -> Result<(), HarnessError> {
    let config = resolve_config(args.config.as_deref(), args.vus)?;
    let preset = scenarios::preset(args.scenario, args.target, &config)?;
    print!("{}", preset.plan());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Plan(args) => plan(&args).map(|()| true),
        Command::Schema => export_schema()
            .map(|schema| println!("{schema}"))
            .map(|()| true)
            .map_err(|e| HarnessError::Other(format!("schema export failed: {e}"))),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            warn!("one or more thresholds failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, kind = e.kind(), "loadtest failed");
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
