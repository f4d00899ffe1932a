use crate::state::AppState;
use crate::types::{ChatError, Result};
use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub database: String,
    pub formatter: &'static str,
    pub features: Vec<&'static str>,
}

pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "ok" })
}

pub async fn readiness(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let db_ok = match crate::db::ping(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Readiness check: DB error: {}", e);
            false
        }
    };

    let status_code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(ReadinessResponse {
            status: if db_ok { "ready" } else { "unready" }.to_string(),
            database: if db_ok { "ok" } else { "error" }.to_string(),
            formatter: state.formatter.engine_name(),
            features: state.capabilities.feature_names(),
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyUpdate {
    pub api_key: Option<String>,
}

/// Replaces the backend API key. Only reachable from the local machine.
pub async fn set_api_key(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(update): Json<ApiKeyUpdate>,
) -> Result<Json<serde_json::Value>> {
    let ip = addr.ip();
    if !ip.is_loopback() {
        tracing::warn!("Blocked admin access attempt from {}", ip);
        return Err(ChatError::Forbidden("Unauthorized".to_string()).into());
    }

    state.backend.api_key().set(update.api_key);
    let api_key_set = state.backend.api_key().is_set();
    tracing::info!("Backend API key updated (set: {})", api_key_set);

    Ok(Json(serde_json::json!({
        "success": true,
        "api_key_set": api_key_set,
    })))
}
