//! HTTP status service.
//!
//! Runs on each game host next to the server container.  Every request to
//! `/server-info` performs one remote-console query; failures come back as
//! `{"error": "..."}` with a status reflecting the failure class and never
//! take the service down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{error, info, warn};
use tower_http::cors::CorsLayer;

use crate::error::Error;
use crate::registry::FleetRegistry;
use crate::runtime::{QueryError, RemoteQueryRunner};
use crate::status::query_status;
use crate::types::{ServerRecord, StatusReport};

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<dyn RemoteQueryRunner>,
    pub registry: FleetRegistry,
    pub query_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("registry error: {0}")]
    Registry(#[from] Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Query(QueryError::ContainerNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Query(QueryError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/server-info", get(server_info))
        .route("/servers", get(servers))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "hello root" }))
}

async fn server_info(State(state): State<AppState>) -> Result<Json<StatusReport>, ApiError> {
    match query_status(state.runner.as_ref(), state.query_timeout).await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            warn!("Status query failed: {}", e);
            Err(e.into())
        }
    }
}

async fn servers(State(state): State<AppState>) -> Result<Json<Vec<ServerRecord>>, ApiError> {
    let registry = state.registry.clone();
    let listed = tokio::task::spawn_blocking(move || registry.list())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    listed.map(Json).map_err(|e| {
        error!("Failed to read registry: {}", e);
        e.into()
    })
}

/// Serve until Ctrl+C.
pub async fn serve(bind: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Status service listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down..."),
                Err(err) => error!("Unable to listen for shutdown signal: {}", err),
            }
        })
        .await?;
    Ok(())
}
