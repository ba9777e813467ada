//! Read API and on-demand trigger.
//!
//! | Route | Description |
//! |---|---|
//! | `GET /health` | liveness plus whether a cycle is running |
//! | `GET /api/articles?source=&limit=&offset=` | stored articles, newest first |
//! | `GET /api/entities?type=&limit=` | entities joined with their article |
//! | `POST /api/trigger-fetch` | start a cycle in the background |

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::ingest::Ingestor;
use crate::storage::{Article, ArticleQuery, EntityQuery, EntityRecord, Store, StoreError};

pub struct AppState {
    pub store: Store,
    pub ingestor: Ingestor,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/articles", get(list_articles))
        .route("/api/entities", get(list_entities))
        .route("/api/trigger-fetch", post(trigger_fetch))
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "API listening");
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

// ============================================================================
// Errors
// ============================================================================

/// Store failures surface as an opaque 500; details go to the log only.
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "API request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "Internal Server Error" })),
        )
            .into_response()
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cycle_running: bool,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        cycle_running: state.ingestor.is_running(),
    })
}

// ============================================================================
// Articles
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ArticleParams {
    pub source: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ArticleParams>,
) -> Result<Json<Vec<Article>>, ApiError> {
    let defaults = ArticleQuery::default();
    let query = ArticleQuery {
        source: params.source.filter(|s| !s.is_empty()),
        limit: params.limit.unwrap_or(defaults.limit),
        offset: params.offset.unwrap_or(defaults.offset),
    };
    Ok(Json(state.store.list_articles(&query).await?))
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct EntityParams {
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_entities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EntityParams>,
) -> Result<Json<Vec<EntityRecord>>, ApiError> {
    let query = EntityQuery {
        entity_type: params.entity_type.filter(|t| !t.is_empty()),
        limit: params.limit.unwrap_or(EntityQuery::default().limit),
    };
    Ok(Json(state.store.list_entities(&query).await?))
}

// ============================================================================
// Trigger
// ============================================================================

#[derive(Serialize)]
pub struct TriggerResponse {
    pub started: bool,
    pub message: &'static str,
}

/// 202 when a cycle was started, 200 when one was already running.
pub async fn trigger_fetch(State(state): State<Arc<AppState>>) -> (StatusCode, Json<TriggerResponse>) {
    if state.ingestor.trigger().started {
        (
            StatusCode::ACCEPTED,
            Json(TriggerResponse {
                started: true,
                message: "Ingestion cycle started",
            }),
        )
    } else {
        (
            StatusCode::OK,
            Json(TriggerResponse {
                started: false,
                message: "Ingestion cycle already running",
            }),
        )
    }
}
