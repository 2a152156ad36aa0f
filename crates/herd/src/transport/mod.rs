// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP and WebSocket transports over the shared application state.

pub mod http;
pub mod state;
pub mod ws;
pub mod ws_msg;

pub use state::AppState;

use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the full API router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        // Health
        .route("/health", get(http::health))
        .route("/health/live", get(http::health_live))
        .route("/health/ready", get(http::health_ready))
        // Workspaces
        .route("/workspaces", get(http::list_workspaces).post(http::create_workspace))
        .route(
            "/workspaces/{id}",
            get(http::get_workspace).delete(http::delete_workspace),
        )
        .route("/workspaces/{id}/refresh", post(http::refresh_workspace))
        .route(
            "/workspaces/{id}/worktrees",
            get(http::list_worktrees).post(http::create_worktree),
        )
        .route(
            "/workspaces/{id}/worktrees/{wid}",
            get(http::get_worktree).put(http::update_worktree).delete(http::delete_worktree),
        )
        // Worktrees
        .route("/worktrees/reorder", put(http::reorder_worktrees))
        .route("/worktrees/{wid}/checkout", post(http::checkout_worktree))
        .route("/worktrees/{wid}/status", get(http::worktree_status))
        .route("/worktrees/{wid}/branches", get(http::worktree_branches))
        // Agents
        .route("/agents", get(http::list_agents).post(http::create_agent))
        .route("/agents/reorder", put(http::reorder_agents))
        .route(
            "/agents/{id}",
            get(http::get_agent).put(http::update_agent).delete(http::delete_agent),
        )
        .route("/agents/{id}/fork", post(http::fork_agent))
        .route("/agents/{id}/restore", post(http::restore_agent))
        .route("/agents/{id}/messages", get(http::list_messages))
        .route("/agents/{id}/message", post(http::send_message))
        .route("/agents/{id}/start", post(http::start_agent))
        .route("/agents/{id}/stop", post(http::stop_agent))
        .route("/agents/{id}/resume", post(http::resume_agent))
        .route("/agents/{id}/status", get(http::agent_status))
        // Usage
        .route("/usage", get(http::usage))
        // Streaming
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `GET /` — service identity document.
async fn index() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "herd",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
