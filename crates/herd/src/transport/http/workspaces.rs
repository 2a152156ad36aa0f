// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace HTTP handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::model::WorkspaceApi;
use crate::transport::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkspaceRequest {
    pub path: String,
}

/// `GET /workspaces`
pub async fn list_workspaces(
    State(s): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let workspaces = s.services.workspaces.list()?;
    Ok(Json(workspaces.into_iter().map(WorkspaceApi::from).collect::<Vec<_>>()))
}

/// `POST /workspaces`
pub async fn create_workspace(
    State(s): State<Arc<AppState>>,
    Json(body): Json<CreateWorkspaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.path.trim().is_empty() {
        return Err(ApiError::validation("path must not be empty"));
    }
    let workspace = s.services.workspaces.register(&body.path).await?;
    Ok((StatusCode::CREATED, Json(WorkspaceApi::from(workspace))))
}

/// `GET /workspaces/{id}`
pub async fn get_workspace(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(WorkspaceApi::from(s.services.workspaces.get(&id)?)))
}

/// `DELETE /workspaces/{id}`
pub async fn delete_workspace(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    s.services.workspaces.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /workspaces/{id}/refresh` — re-sync worktrees from git.
pub async fn refresh_workspace(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = s.services.workspaces.refresh(&id).await?;
    Ok(Json(WorkspaceApi::from(workspace)))
}
