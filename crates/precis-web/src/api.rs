//! Message-based RPC handlers.
//!
//! Every call is a `POST /api/rpc` with a JSON body selecting the operation
//! by its `action` tag; one request gets one JSON response. Unknown or
//! malformed actions are answered with `400 {"error": ...}`.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use precis::orchestrator::Orchestrator;
use precis::{ChatRequest, StoreError};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::pages::{PageError, PageSource};

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub pages: Arc<dyn PageSource>,
}

/// One RPC call, selected by `action`.
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RpcAction {
    ListTargets,
    ExtractText {
        target_id: String,
    },
    SubmitSummary {
        data: ChatRequest,
        #[serde(default)]
        request_id: Option<String>,
    },
    Status {
        request_id: String,
    },
    SubmitChat {
        data: ChatRequest,
    },
    CacheStats,
    ClearCache,
    GetContext {
        target_id: String,
    },
    ClearContext {
        target_id: String,
    },
}

impl RpcAction {
    fn name(&self) -> &'static str {
        match self {
            RpcAction::ListTargets => "listTargets",
            RpcAction::ExtractText { .. } => "extractText",
            RpcAction::SubmitSummary { .. } => "submitSummary",
            RpcAction::Status { .. } => "status",
            RpcAction::SubmitChat { .. } => "submitChat",
            RpcAction::CacheStats => "cacheStats",
            RpcAction::ClearCache => "clearCache",
            RpcAction::GetContext { .. } => "getContext",
            RpcAction::ClearContext { .. } => "clearContext",
        }
    }
}

/// An RPC failure, rendered as `{"error": "..."}` with a matching status.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error("cache unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("failed to encode response: {0}")]
    Internal(#[from] serde_json::Error),
}

impl RpcError {
    fn status(&self) -> StatusCode {
        match self {
            RpcError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RpcError::NotFound(_) | RpcError::Page(PageError::NotFound(_)) => StatusCode::NOT_FOUND,
            RpcError::Page(PageError::Io(_)) | RpcError::Store(_) | RpcError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("rpc failed: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// POST /api/rpc: dispatch one action.
pub async fn post_rpc(State(app): State<AppState>, body: Bytes) -> Result<Json<Value>, RpcError> {
    let action: RpcAction =
        serde_json::from_slice(&body).map_err(|e| RpcError::BadRequest(e.to_string()))?;
    debug!("rpc {}", action.name());
    dispatch(&app, action).await.map(Json)
}

async fn dispatch(app: &AppState, action: RpcAction) -> Result<Value, RpcError> {
    let orch = &app.orchestrator;
    match action {
        RpcAction::ListTargets => {
            let targets = app.pages.list_targets().await?;
            Ok(json!({ "targets": targets }))
        }
        RpcAction::ExtractText { target_id } => {
            let text = app.pages.extract_text(&target_id).await?;
            Ok(json!({ "text": text }))
        }
        RpcAction::SubmitSummary { data, request_id } => {
            let id = orch.submit(data, request_id).await;
            Ok(json!({ "requestId": id }))
        }
        RpcAction::Status { request_id } => {
            let record = orch
                .status(&request_id)
                .ok_or_else(|| RpcError::NotFound(format!("unknown request id '{request_id}'")))?;
            to_value(&record)
        }
        RpcAction::SubmitChat { data } => to_value(&orch.chat(data).await),
        RpcAction::CacheStats => to_value(&orch.cache_stats().await?),
        RpcAction::ClearCache => {
            orch.clear_cache().await?;
            Ok(json!({ "ok": true }))
        }
        RpcAction::GetContext { target_id } => {
            Ok(json!({ "messages": orch.context(&target_id) }))
        }
        RpcAction::ClearContext { target_id } => {
            orch.clear_context(&target_id);
            Ok(json!({ "ok": true }))
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    Ok(serde_json::to_value(value)?)
}

/// GET /api/health: liveness probe.
pub async fn get_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
