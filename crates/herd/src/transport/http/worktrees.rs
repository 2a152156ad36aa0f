// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree HTTP handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::model::{SortMode, WorktreeApi};
use crate::service::CreateWorktree;
use crate::store::WorktreePatch;
use crate::transport::state::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorktreeRequest {
    pub path: String,
    pub branch: String,
    #[serde(default)]
    pub create_branch: bool,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorktreeRequest {
    pub name: Option<String>,
    pub sort_mode: Option<SortMode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub branch: String,
    #[serde(default)]
    pub create_branch: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderWorktreesRequest {
    pub worktree_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteWorktreeQuery {
    #[serde(default)]
    pub force: bool,
}

/// `GET /workspaces/{id}/worktrees`
pub async fn list_worktrees(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let worktrees = s.services.workspaces.worktrees(&id)?;
    Ok(Json(worktrees.into_iter().map(WorktreeApi::from).collect::<Vec<_>>()))
}

/// `POST /workspaces/{id}/worktrees`
pub async fn create_worktree(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CreateWorktreeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.path.trim().is_empty() || body.branch.trim().is_empty() {
        return Err(ApiError::validation("path and branch must not be empty"));
    }
    let worktree = s
        .services
        .worktrees
        .create(
            &id,
            CreateWorktree {
                path: body.path,
                branch: body.branch,
                create_branch: body.create_branch,
                name: body.name,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(WorktreeApi::from(worktree))))
}

/// `GET /workspaces/{id}/worktrees/{wid}`
pub async fn get_worktree(
    State(s): State<Arc<AppState>>,
    Path((_id, wid)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(WorktreeApi::from(s.services.worktrees.get(&wid)?)))
}

/// `PUT /workspaces/{id}/worktrees/{wid}`
pub async fn update_worktree(
    State(s): State<Arc<AppState>>,
    Path((_id, wid)): Path<(String, String)>,
    Json(body): Json<UpdateWorktreeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let worktree = s.services.worktrees.update(
        &wid,
        WorktreePatch { name: body.name, sort_mode: body.sort_mode, ..Default::default() },
    )?;
    Ok(Json(WorktreeApi::from(worktree)))
}

/// `DELETE /workspaces/{id}/worktrees/{wid}?force=`
pub async fn delete_worktree(
    State(s): State<Arc<AppState>>,
    Path((_id, wid)): Path<(String, String)>,
    Query(query): Query<DeleteWorktreeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    s.services.worktrees.delete(&wid, query.force).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /worktrees/{wid}/checkout`
pub async fn checkout_worktree(
    State(s): State<Arc<AppState>>,
    Path(wid): Path<String>,
    Json(body): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.branch.trim().is_empty() {
        return Err(ApiError::validation("branch must not be empty"));
    }
    let worktree =
        s.services.worktrees.checkout(&wid, &body.branch, body.create_branch).await?;
    Ok(Json(WorktreeApi::from(worktree)))
}

/// `PUT /worktrees/reorder`
pub async fn reorder_worktrees(
    State(s): State<Arc<AppState>>,
    Json(body): Json<ReorderWorktreesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    s.services.worktrees.reorder(&body.worktree_ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /worktrees/{wid}/status`
pub async fn worktree_status(
    State(s): State<Arc<AppState>>,
    Path(wid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(s.services.worktrees.status(&wid).await?))
}

/// `GET /worktrees/{wid}/branches`
pub async fn worktree_branches(
    State(s): State<Arc<AppState>>,
    Path(wid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(s.services.worktrees.branches(&wid).await?))
}
