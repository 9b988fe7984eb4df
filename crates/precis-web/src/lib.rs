//! HTTP boundary for the `precis` summarization orchestrator.
//!
//! `precis-web` exposes the orchestrator and a [`PageSource`] through a
//! message-based RPC endpoint: callers `POST /api/rpc` a JSON object whose
//! `action` tag selects the operation.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use precis::prelude::*;
//! use precis_web::{DirPageSource, WebConfig, spawn_web};
//! use tokio_util::sync::CancellationToken;
//!
//! let orchestrator = Orchestrator::new(
//!     OrchestratorConfig::default(),
//!     SummaryCache::new(Arc::new(MemoryKvStore::new())),
//!     ProviderRegistry::with_defaults(),
//! );
//! let pages = Arc::new(DirPageSource::new("./pages"));
//! let shutdown = CancellationToken::new();
//!
//! let (addr, server) = spawn_web(orchestrator, pages, WebConfig::default(), shutdown.clone()).await?;
//! println!("RPC: http://{addr}/api/rpc");
//! ```
//!
//! # Actions
//!
//! | `action` | Fields | Response |
//! |----------|--------|----------|
//! | `listTargets` | | `{"targets": [{id, url, title}]}` |
//! | `extractText` | `targetId` | `{"text": ...}` |
//! | `submitSummary` | `data`, `requestId?` | `{"requestId": ...}` |
//! | `status` | `requestId` | pending request record, 404 if unknown |
//! | `submitChat` | `data` | `{summary?, provider, model?, cached, error?}` |
//! | `cacheStats` | | `{"count", "size"}` |
//! | `clearCache` | | `{"ok": true}` |
//! | `getContext` | `targetId` | `{"messages": [...] or null}` |
//! | `clearContext` | `targetId` | `{"ok": true}` |

mod api;
pub mod pages;
mod server;

pub use api::{AppState, RpcAction, RpcError};
pub use pages::{DirPageSource, MemoryPageSource, PageError, PageSource, Target};
pub use server::build_router;

use std::net::SocketAddr;
use std::sync::Arc;

use precis::orchestrator::Orchestrator;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
        }
    }
}

/// Spawn the web server on a Tokio task.
///
/// Returns the bound address and the server task, which finishes after
/// `shutdown` is cancelled and in-flight connections drain.
pub async fn spawn_web(
    orchestrator: Orchestrator,
    pages: Arc<dyn PageSource>,
    config: WebConfig,
    shutdown: CancellationToken,
) -> std::io::Result<(SocketAddr, JoinHandle<std::io::Result<()>>)> {
    let router = build_router(AppState {
        orchestrator,
        pages,
    });
    server::start_server(router, config.bind_addr, shutdown).await
}
