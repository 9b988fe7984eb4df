//! Summarize text with any supported provider and print the result.
//!
//! The API key is read from `--api-key` or the provider's usual environment
//! variable (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `OPENROUTER_KEY`).
//! Ollama needs none.
//!
//! # Examples
//!
//! ```sh
//! # Summarize an argument
//! precis --user "Rust is a multi-paradigm programming language..."
//!
//! # Summarize a file in Chinese with Anthropic
//! cat article.md | precis --stdin --provider anthropic --language chinese
//!
//! # Cache by URL; the second run is answered from the store
//! curl -s https://example.com | precis --stdin --content-key https://example.com
//!
//! # Local model
//! precis --provider ollama --model llama3.1 --user "..."
//! ```

use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use precis::cache::{JsonFileKvStore, KvStore, MemoryKvStore, SummaryCache};
use precis::orchestrator::{Orchestrator, OrchestratorConfig};
use precis::provider::{ProviderKind, ProviderRegistry};
use precis::{ChatRequest, Language, Message};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Summarize text with any supported provider and print the result.
#[derive(Parser)]
#[command(name = "precis", version)]
struct Cli {
    // ── Content ────────────────────────────────────────────────
    /// Text to summarize
    #[arg(long)]
    user: Option<String>,

    /// Read content from stdin
    #[arg(long)]
    stdin: bool,

    /// System prompt; turns the input into a conversation sent as-is
    #[arg(long)]
    system: Option<String>,

    // ── Provider ───────────────────────────────────────────────
    /// openai, anthropic, openrouter or ollama
    #[arg(long, default_value = "openai")]
    provider: ProviderKind,

    /// Model identifier (provider default when omitted)
    #[arg(long)]
    model: Option<String>,

    /// Base URL override
    #[arg(long)]
    endpoint: Option<String>,

    /// Provider routing preference (OpenRouter: comma-separated order)
    #[arg(long)]
    routing_key: Option<String>,

    /// API key (falls back to the provider's environment variable)
    #[arg(long, env = "PRECIS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    // ── Output ─────────────────────────────────────────────────
    /// english or chinese
    #[arg(long, default_value = "english", value_parser = parse_language)]
    language: Language,

    // ── Cache ──────────────────────────────────────────────────
    /// Cache key for the content, e.g. its URL
    #[arg(long)]
    content_key: Option<String>,

    /// Ignore any cached summary and refresh it
    #[arg(long)]
    force_refresh: bool,

    /// JSON store for the summary cache (in-memory when omitted)
    #[arg(long, env = "PRECIS_STORE")]
    store: Option<PathBuf>,

    /// Print the full JSON response
    #[arg(long)]
    raw: bool,
}

fn parse_language(s: &str) -> Result<Language, String> {
    match s.to_ascii_lowercase().as_str() {
        "english" | "en" => Ok(Language::English),
        "chinese" | "zh" => Ok(Language::Chinese),
        other => Err(format!("unknown language '{other}' (expected english or chinese)")),
    }
}

fn key_env_var(provider: ProviderKind) -> Option<&'static str> {
    match provider {
        ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
        ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
        ProviderKind::OpenRouter => Some("OPENROUTER_KEY"),
        ProviderKind::Ollama => None,
    }
}

fn read_stdin_content() -> anyhow::Result<String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read stdin")?;
    Ok(buf)
}

fn build_user_content(cli: &Cli) -> anyhow::Result<String> {
    let stdin_text = if cli.stdin {
        Some(read_stdin_content()?)
    } else {
        None
    };

    match (&cli.user, stdin_text) {
        (Some(msg), Some(piped)) => Ok(format!("{msg}\n\n{piped}")),
        (Some(msg), None) => Ok(msg.clone()),
        (None, Some(piped)) => Ok(piped),
        (None, None) => bail!("provide --user, --stdin, or both"),
    }
}

fn build_request(cli: &Cli, content: String) -> ChatRequest {
    let mut messages = Vec::new();
    if let Some(sys) = &cli.system {
        messages.push(Message::system(sys));
    }
    messages.push(Message::user(content));

    let mut request = ChatRequest::new(cli.provider, messages)
        .with_language(cli.language)
        .with_force_refresh(cli.force_refresh);
    let api_key = cli
        .api_key
        .clone()
        .or_else(|| key_env_var(cli.provider).and_then(|v| std::env::var(v).ok()));
    if let Some(key) = api_key {
        request = request.with_api_key(key);
    }
    if let Some(model) = &cli.model {
        request = request.with_model(model);
    }
    if let Some(endpoint) = &cli.endpoint {
        request = request.with_endpoint(endpoint);
    }
    if let Some(routing) = &cli.routing_key {
        request = request.with_routing_key(routing);
    }
    if let Some(key) = &cli.content_key {
        request = request.with_content_key(key);
    }
    request
}

async fn run(cli: &Cli) -> anyhow::Result<String> {
    let content = build_user_content(cli)?;
    let request = build_request(cli, content);

    let store: Arc<dyn KvStore> = match &cli.store {
        Some(path) => Arc::new(
            JsonFileKvStore::open(path)
                .await
                .with_context(|| format!("failed to open store {}", path.display()))?,
        ),
        None => Arc::new(MemoryKvStore::new()),
    };
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        SummaryCache::new(store),
        ProviderRegistry::with_defaults(),
    );

    let response = orchestrator.chat(request).await;
    if cli.raw {
        return serde_json::to_string_pretty(&response).context("failed to format response");
    }
    match (response.summary, response.error) {
        (Some(summary), _) => Ok(summary),
        (None, Some(error)) => bail!(error),
        (None, None) => bail!("provider returned no summary"),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}
