//! Serve the summarization orchestrator over HTTP.
//!
//! Runs the RPC endpoint on top of a persistent summary cache and an
//! optional directory of text pages, and sweeps expired request records in
//! the background until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p precis-web
//! cargo run -p precis-web -- --port 8080 --pages-dir ./pages
//! cargo run -p precis-web -- --cache-max-entries 500 --cache-expiry-days 30
//! ```
//!
//! Then call the endpoint with curl:
//!
//! ```bash
//! curl -s localhost:3001/api/rpc -d '{"action":"listTargets"}'
//! curl -s localhost:3001/api/rpc -d '{"action":"submitSummary","data":{
//!   "messages":[{"role":"user","content":"..."}],
//!   "provider":"openai","apiKey":"sk-...","contentKey":"https://example.com"}}'
//! curl -s localhost:3001/api/rpc -d '{"action":"status","requestId":"rq-..."}'
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use precis::cache::{CacheSettings, JsonFileKvStore, SummaryCache};
use precis::orchestrator::{Orchestrator, OrchestratorConfig};
use precis::provider::ProviderRegistry;
use precis_web::{DirPageSource, MemoryPageSource, PageSource, WebConfig, spawn_web};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Summarization RPC server.
#[derive(Parser)]
#[command(name = "precis-web", version, about = "Summarization RPC server")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port for the RPC server.
    #[arg(long, env = "PRECIS_PORT", default_value_t = 3001)]
    port: u16,

    /// JSON store backing the summary cache.
    #[arg(long, env = "PRECIS_STORE", default_value = "precis-store.json")]
    store: PathBuf,

    /// Directory of text pages served as targets (none when omitted).
    #[arg(long, env = "PRECIS_PAGES_DIR")]
    pages_dir: Option<PathBuf>,

    /// Persist a new cache capacity before serving.
    #[arg(long)]
    cache_max_entries: Option<usize>,

    /// Persist a new cache expiry (days) before serving.
    #[arg(long)]
    cache_expiry_days: Option<u64>,

    /// Seconds a request record is kept after creation.
    #[arg(long, default_value_t = 600)]
    retention_secs: u64,

    /// Seconds between sweeps of expired request records.
    #[arg(long, default_value_t = 60)]
    cleanup_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    // 1. Cache on top of the JSON store.
    let store = JsonFileKvStore::open(&args.store)
        .await
        .with_context(|| format!("failed to open store {}", args.store.display()))?;
    let cache = SummaryCache::new(Arc::new(store));

    if args.cache_max_entries.is_some() || args.cache_expiry_days.is_some() {
        let current = cache.settings().await.context("failed to read cache settings")?;
        let settings = CacheSettings {
            max_entries: args.cache_max_entries.unwrap_or(current.max_entries),
            expiry_days: args.cache_expiry_days.unwrap_or(current.expiry_days),
        };
        cache
            .configure(settings)
            .await
            .context("failed to save cache settings")?;
        info!(
            "cache configured: {} entries, {} days",
            settings.max_entries, settings.expiry_days
        );
    }

    // 2. Orchestrator with every built-in provider.
    let config = OrchestratorConfig::default()
        .with_retention(Duration::from_secs(args.retention_secs))
        .with_cleanup_interval(Duration::from_secs(args.cleanup_secs));
    let orchestrator = Orchestrator::new(config, cache, ProviderRegistry::with_defaults());

    // 3. Page source.
    let pages: Arc<dyn PageSource> = match &args.pages_dir {
        Some(dir) => Arc::new(DirPageSource::new(dir)),
        None => Arc::new(MemoryPageSource::new()),
    };

    // 4. Serve until Ctrl-C.
    let shutdown = CancellationToken::new();
    let janitor = orchestrator.spawn_janitor(shutdown.clone());
    let web_config = WebConfig {
        bind_addr: SocketAddr::new(args.host, args.port),
    };
    let (addr, server) = spawn_web(orchestrator, pages, web_config, shutdown.clone())
        .await
        .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;
    println!("RPC: http://{addr}/api/rpc");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutting down");
    shutdown.cancel();

    server.await.context("server task panicked")??;
    janitor.await.context("janitor task panicked")?;
    Ok(())
}
