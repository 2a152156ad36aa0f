// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health probes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::transport::state::AppState;

/// `GET /health` — overall status summary.
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let store_ok = s.store.ping().is_ok();
    let body = serde_json::json!({
        "status": if store_ok { "ok" } else { "degraded" },
        "uptimeSecs": s.started_at.elapsed().as_secs(),
        "runningAgents": s.supervisor.get_running_count().await,
        "connectedClients": s.clients.client_count().await,
    });
    if store_ok {
        (StatusCode::OK, Json(body))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}

/// `GET /health/live` — process liveness.
pub async fn health_live() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /health/ready` — 503 until the durable store answers.
pub async fn health_ready(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match s.store.ping() {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "ready": true }))),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "ready": false }))),
    }
}
