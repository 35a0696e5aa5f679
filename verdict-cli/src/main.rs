//! Verdict CLI — batch classification runner.
//!
//! Loads a classification template (TOML) and a dataset (JSONL/CSV),
//! runs the evaluation engine over every row, and prints the aligned
//! results. Ships only offline mock clients; real provider transports
//! plug in through the `ModelClient` trait.

mod dataset;
mod mock;
mod output;
mod template_file;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use verdict_core::{
    ClassificationRunner, MediaFetchProcessor, MockModelClient, ModelClient, RetryConfig,
    RunnerConfig,
};

/// Verdict: LLM-judged classification with constrained label rails
#[derive(Parser, Debug)]
#[command(name = "verdict", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a classification template over a dataset
    Run(RunArgs),
    /// Validate a template file and show its rails and variables
    Validate {
        /// Template definition (TOML)
        template: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Template definition (TOML)
    #[arg(short, long)]
    template: PathBuf,

    /// Dataset file (.jsonl, .ndjson, or .csv)
    #[arg(short, long)]
    data: PathBuf,

    /// Dataset columns holding URI references to fetch
    #[arg(long = "uri-column")]
    uri_columns: Vec<String>,

    /// Resolve URI cells to inline base64 before templating
    #[arg(long)]
    fetch_media: bool,

    /// Worker pool size
    #[arg(short, long, default_value_t = 4)]
    concurrency: usize,

    /// Request an explanation for each label
    #[arg(long)]
    explain: bool,

    /// Retries per model call after the initial attempt
    #[arg(long, default_value_t = 2)]
    retries: u32,

    /// Initial retry backoff in milliseconds
    #[arg(long, default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Match rails case-sensitively
    #[arg(long)]
    case_sensitive: bool,

    /// Fixed reply for the offline mock client
    #[arg(long)]
    respond_with: Option<String>,

    /// Keyword rule for the offline mock client (pattern=reply, repeatable)
    #[arg(long = "rule")]
    rules: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Table,
    Jsonl,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Commands::Run(args) => run(args).await,
        Commands::Validate { template } => validate(&template),
    }
}

fn build_client(args: &RunArgs) -> Result<Arc<dyn ModelClient>> {
    if !args.rules.is_empty() {
        let fallback = args.respond_with.clone().unwrap_or_default();
        return Ok(Arc::new(mock::KeywordClient::from_rule_specs(
            &args.rules,
            fallback,
        )?));
    }
    if let Some(text) = &args.respond_with {
        return Ok(Arc::new(MockModelClient::with_response(text.clone())));
    }
    bail!(
        "no model client configured: this build ships only offline clients, \
         pass --respond-with or --rule"
    );
}

async fn run(args: RunArgs) -> Result<()> {
    let template = template_file::load(&args.template)?;
    let data = dataset::load(&args.data, &args.uri_columns)?;
    let client = build_client(&args)?;

    let config = RunnerConfig {
        concurrency: args.concurrency,
        provide_explanation: args.explain,
        retry: RetryConfig {
            max_retries: args.retries,
            initial_backoff_ms: args.retry_backoff_ms,
            ..RetryConfig::default()
        },
        normalize_case: !args.case_sensitive,
    };

    let mut runner = ClassificationRunner::new(template).with_config(config);
    if args.fetch_media {
        runner = runner.with_processor(Arc::new(
            MediaFetchProcessor::new().with_timeout(Duration::from_secs(30)),
        ));
    }

    // Ctrl-C abandons in-flight rows; completed rows are still printed.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            signal_cancel.cancel();
        }
    });

    let result = runner.run_with_cancellation(data, client, cancel).await?;

    match args.output {
        OutputFormat::Table => output::print_table(&result),
        OutputFormat::Jsonl => {
            output::print_jsonl(&result)?;
            output::print_summary(&result);
        }
    }
    Ok(())
}

fn validate(path: &PathBuf) -> Result<()> {
    let template = template_file::load(path)?;
    println!("template ok: {} part(s)", template.parts().len());
    println!("rails: {}", template.rails().join(", "));
    let variables: Vec<String> = template.variables().into_iter().collect();
    println!("variables: {}", variables.join(", "));
    println!(
        "explanation template: {}",
        if template.explanation().is_some() {
            "present"
        } else {
            "absent"
        }
    );
    Ok(())
}
