//! Axum server setup and router construction.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api::{self, AppState};

/// Build the full axum router.
///
/// The router serves:
/// - RPC at `POST /api/rpc`
/// - Liveness at `GET /api/health`
pub fn build_router(state: AppState) -> Router {
    // Browser extensions and pages on other origins call the RPC endpoint.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/rpc", post(api::post_rpc))
        .route("/api/health", get(api::get_health))
        .with_state(state)
        .layer(cors)
}

/// Bind `bind_addr` and serve `router` on a Tokio task until `shutdown` is
/// cancelled. Returns the bound address and the server task.
pub async fn start_server(
    router: Router,
    bind_addr: SocketAddr,
    shutdown: CancellationToken,
) -> std::io::Result<(SocketAddr, JoinHandle<std::io::Result<()>>)> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    info!("listening on http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
    });

    Ok((addr, handle))
}
