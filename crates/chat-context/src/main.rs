//! Compact a conversation window read from a file or stdin.
//!
//! Prints the `CompactionResult` as JSON on stdout; logs go to stderr.
//! Summarization reads `OPENROUTER_KEY`; provider editing reads
//! `ANTHROPIC_API_KEY` and `CONTEXT_EDIT_URL`.
//!
//! # Examples
//!
//! ```sh
//! # Compact a window to fit 8k tokens, keeping the last 6 messages
//! chat-context --input window.json --max-tokens 8000 --keep-recent 6
//!
//! # Budget from a config file, system prompt counted against it
//! cat window.json | chat-context --config budget.json \
//!   --system-prompt-file prompt.txt --tool-count 12
//!
//! # Just measure
//! chat-context --input window.json --estimate-only
//!
//! # Verbose decisions
//! RUST_LOG=chat_context=debug chat-context --input window.json --strategy provider-edit
//! ```

use chat_context::context::budget::{ContextBudget, StrategyKind};
use chat_context::context::manager::ContextManager;
use chat_context::{ContextError, Message};
use clap::Parser;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Keep a tool-augmented conversation inside its token budget.
#[derive(Parser)]
#[command(name = "chat-context", version)]
struct Cli {
    // ── Input ──────────────────────────────────────────────────
    /// JSON file holding an array of messages (default: stdin)
    #[arg(long)]
    input: Option<PathBuf>,

    /// ContextBudget JSON file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    // ── Budget overrides ───────────────────────────────────────
    /// Hard token ceiling that triggers compaction
    #[arg(long)]
    max_tokens: Option<usize>,

    /// Most recent messages kept verbatim
    #[arg(long)]
    keep_recent: Option<usize>,

    /// File whose text is sent as the system prompt (counted against the budget)
    #[arg(long)]
    system_prompt_file: Option<PathBuf>,

    /// Number of tool schemas declared to the model
    #[arg(long)]
    tool_count: Option<usize>,

    // ── Strategy ───────────────────────────────────────────────
    /// summarize, provider-edit or truncate
    #[arg(long)]
    strategy: Option<StrategyKind>,

    /// Model used for summarization
    #[arg(long)]
    model: Option<String>,

    /// Timeout for each strategy's network call, in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    // ── Output ─────────────────────────────────────────────────
    /// Print the usage estimate and exit without compacting
    #[arg(long)]
    estimate_only: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn read_messages(input: Option<&Path>) -> Result<Vec<Message>, ContextError> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

fn build_budget(cli: &Cli) -> Result<ContextBudget, ContextError> {
    let mut budget = match &cli.config {
        Some(path) => ContextBudget::load(path)?,
        None => ContextBudget::default(),
    };
    if let Some(max) = cli.max_tokens {
        budget.max_tokens = max;
    }
    if let Some(keep) = cli.keep_recent {
        budget = budget.with_keep_recent(keep);
    }
    if let Some(path) = &cli.system_prompt_file {
        budget = budget.with_system_prompt(std::fs::read_to_string(path)?);
    }
    if let Some(n) = cli.tool_count {
        budget = budget.with_tool_count(n);
    }
    if let Some(strategy) = cli.strategy {
        budget = budget.with_strategy(strategy);
    }
    if let Some(model) = &cli.model {
        budget = budget.with_summary_model(model.clone());
    }
    if let Some(secs) = cli.timeout_secs {
        budget = budget.with_timeout(Duration::from_secs(secs));
    }
    budget.validate()?;
    Ok(budget)
}

async fn run(cli: &Cli) -> Result<String, ContextError> {
    let budget = build_budget(cli)?;
    let messages = read_messages(cli.input.as_deref())?;

    if cli.estimate_only {
        let usage = budget.estimate_usage(&messages);
        tracing::info!("{}", usage.to_log_string());
        return Ok(serde_json::to_string_pretty(&usage)?);
    }

    let manager = ContextManager::from_env(budget);
    let result = manager.manage(&messages).await;
    Ok(serde_json::to_string_pretty(&result)?)
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
