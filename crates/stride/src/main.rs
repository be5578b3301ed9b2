//! Run a tool-use agent task, or a long-context task over a document.
//!
//! Reads the API key from `STRIDE_API_KEY` (falling back to
//! `OPENROUTER_KEY`). Logs go to stderr and are filtered with `RUST_LOG`;
//! the final answer is printed to stdout.
//!
//! # Examples
//!
//! ```sh
//! # Ordinary task with extra arguments
//! stride run --goal "Name three prime numbers above 100." --arg format=list
//!
//! # Long-context question over a file
//! stride long-context --query "Who signed the agreement?" --context-file contract.txt
//!
//! # Pipe the document, process four chunks at a time, keep the trajectories
//! cat book.md | stride long-context --query "List every city mentioned." --stdin \
//!   --parallel-chunks 4 --trajectory-out run.json
//! ```

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use stride::agent::{
    AgentConfig, ExtraArgs, GenerationOptions, Harness, LoggingHandler, parse_extra_arg,
};
use stride::agent::task::{CONTEXT_KEY, QUERY_KEY};
use stride::api::{LlmClient, Provider};
use stride::error::{Error, Result};
use stride::longctx::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP, LongContextAgent, LongContextConfig};
use stride::tools::{ThinkTool, ToolRegistry};
use stride::{DEFAULT_MODEL, HttpBackend};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Step-bounded tool-use agent with a long-context pipeline.
#[derive(Parser)]
#[command(name = "stride", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an ordinary task.
    Run(RunArgs),
    /// Answer a query over a document too large for one model call.
    LongContext(LongContextArgs),
}

#[derive(Args)]
struct RunArgs {
    /// What the agent should accomplish
    #[arg(long)]
    goal: String,

    /// Extra task argument as key=value (repeatable)
    #[arg(long = "arg", value_parser = parse_extra_arg)]
    args: Vec<(String, String)>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct LongContextArgs {
    /// The question to answer from the document
    #[arg(long)]
    query: String,

    /// Read the document from this file
    #[arg(long, required_unless_present = "stdin", conflicts_with = "stdin")]
    context_file: Option<PathBuf>,

    /// Read the document from stdin
    #[arg(long)]
    stdin: bool,

    /// Base per-chunk instruction
    #[arg(
        long,
        default_value = "Extract the information in this chunk that helps answer the query."
    )]
    goal: String,

    /// Target chunk size in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Overlap between consecutive chunks in bytes
    #[arg(long, default_value_t = DEFAULT_OVERLAP)]
    overlap: usize,

    /// Step budget of each chunk loop
    #[arg(long, default_value_t = 4)]
    chunk_steps: u32,

    /// Number of chunks processed at once
    #[arg(long, default_value_t = 1)]
    parallel_chunks: usize,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct CommonArgs {
    // ── Provider ───────────────────────────────────────────────
    /// Endpoint: openrouter, openai or zhipu
    #[arg(long, default_value = "openrouter")]
    provider: String,

    /// Custom OpenAI-compatible chat completions URL (overrides --provider)
    #[arg(long)]
    base_url: Option<String>,

    /// Model identifier
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    // ── Loop ───────────────────────────────────────────────────
    /// Maximum model calls per task
    #[arg(long, default_value_t = 20)]
    max_steps: u32,

    /// Give up on the task after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Retries for transient provider failures
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Dispatch the tool calls of one step concurrently
    #[arg(long)]
    parallel_tool_calls: bool,

    // ── Sampling ───────────────────────────────────────────────
    /// Maximum tokens per model reply
    #[arg(long, default_value_t = 4096)]
    max_tokens: u32,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.5)]
    temperature: f32,

    /// Nucleus sampling threshold
    #[arg(long)]
    top_p: Option<f32>,

    /// Top-k sampling
    #[arg(long)]
    top_k: Option<u32>,

    // ── Output ─────────────────────────────────────────────────
    /// Write the execution record as JSON to this path
    #[arg(long)]
    trajectory_out: Option<PathBuf>,
}

impl CommonArgs {
    fn generation(&self) -> GenerationOptions {
        let mut options = GenerationOptions::default()
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_parallel_tool_calls(self.parallel_tool_calls)
            .with_retries(self.max_retries);
        if let Some(p) = self.top_p {
            options = options.with_top_p(p);
        }
        if let Some(k) = self.top_k {
            options = options.with_top_k(k);
        }
        options
    }

    fn agent_config(&self) -> AgentConfig {
        let config = AgentConfig::new()
            .with_max_steps(self.max_steps)
            .with_generation(self.generation());
        match self.timeout_secs {
            Some(secs) => config.with_task_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }

    fn client(&self) -> Result<LlmClient> {
        let provider = Provider::from_name(&self.provider, self.base_url.as_deref())
            .ok_or_else(|| Error::Configuration(format!("unknown provider '{}'", self.provider)))?;
        let api_key = std::env::var("STRIDE_API_KEY")
            .or_else(|_| std::env::var("OPENROUTER_KEY"))
            .map_err(|_| Error::Configuration("set STRIDE_API_KEY (or OPENROUTER_KEY)".into()))?;
        let backend = HttpBackend::new(provider, api_key)?;
        Ok(LlmClient::new(backend, &self.model))
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Cancel `token` on Ctrl-C so in-flight calls stop and the task ends as
/// cancelled.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, cancelling...");
            token.cancel();
        }
    });
}

fn read_document(args: &LongContextArgs) -> Result<String> {
    match &args.context_file {
        Some(path) => {
            std::fs::read_to_string(path).map_err(|e| Error::io(path.display().to_string(), e))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| Error::io("<stdin>", e))?;
            Ok(buf)
        }
    }
}

fn write_record(path: &Path, record: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(path, json).map_err(|e| Error::io(path.display().to_string(), e))
}

/// Print the answer and return whether the task completed.
fn report(final_result: Option<&str>, state: &stride::agent::TerminalState) -> bool {
    if let Some(result) = final_result {
        println!("{result}");
    }
    if !state.is_completed() {
        eprintln!("Task ended: {state}");
    }
    state.is_completed()
}

// ── Commands ───────────────────────────────────────────────────────

async fn run(args: RunArgs) -> Result<bool> {
    let client = args.common.client()?;
    let tools = ToolRegistry::new().with(ThinkTool);
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let extra_args: ExtraArgs = args.args.into_iter().collect();
    let execution = Harness::new(&client, &tools, args.common.agent_config())
        .with_event_handler(&LoggingHandler)
        .with_cancellation(cancel)
        .new_task(args.goal, extra_args)
        .execute()
        .await;

    if let Some(path) = &args.common.trajectory_out {
        write_record(path, &execution)?;
    }
    Ok(report(
        execution.final_result.as_deref(),
        &execution.terminal_state,
    ))
}

async fn long_context(args: LongContextArgs) -> Result<bool> {
    let document = read_document(&args)?;
    let client = args.common.client()?;
    let tools = ToolRegistry::new().with(ThinkTool);
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let long = LongContextConfig::default()
        .with_chunk_size(args.chunk_size)
        .with_overlap(args.overlap)
        .with_chunk_max_steps(args.chunk_steps)
        .with_parallel_chunks(args.parallel_chunks)
        .with_chunk_options(
            GenerationOptions::default()
                .with_max_tokens(2500)
                .with_temperature(0.3)
                .with_parallel_tool_calls(args.common.parallel_tool_calls)
                .with_retries(args.common.max_retries),
        );

    let mut extra_args = ExtraArgs::new();
    extra_args.insert(CONTEXT_KEY.into(), document);
    extra_args.insert(QUERY_KEY.into(), args.query);

    let agent = LongContextAgent::new(&client, &tools, args.common.agent_config(), long)
        .with_event_handler(&LoggingHandler)
        .with_cancellation(cancel);
    let execution = agent.new_task(args.goal, extra_args).execute().await;

    if let Some(path) = &args.common.trajectory_out {
        write_record(path, &execution)?;
    }
    Ok(report(
        execution.final_result.as_deref(),
        &execution.terminal_state,
    ))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let outcome = match cli.command {
        Command::Run(args) => run(args).await,
        Command::LongContext(args) => long_context(args).await,
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    }
}
