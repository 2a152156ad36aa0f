// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent HTTP handlers.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::model::{AgentApi, AgentMode, AgentStatus, MessageApi, Permission};
use crate::service::{CreateAgent, UpdateAgent};
use crate::transport::state::AppState;

const DEFAULT_MESSAGE_LIMIT: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAgentsQuery {
    pub worktree_id: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    pub worktree_id: String,
    pub name: Option<String>,
    pub mode: Option<AgentMode>,
    pub permissions: Option<BTreeSet<Permission>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAgentRequest {
    pub name: Option<String>,
    pub mode: Option<AgentMode>,
    pub permissions: Option<BTreeSet<Permission>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteAgentQuery {
    pub archive: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForkAgentRequest {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderAgentsRequest {
    pub worktree_id: String,
    pub agent_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListMessagesQuery {
    pub limit: Option<usize>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAgentRequest {
    pub initial_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopAgentQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePageResponse {
    pub messages: Vec<MessageApi>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusResponse {
    pub agent: AgentApi,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervisor_status: Option<AgentStatus>,
}

/// `GET /agents?worktreeId=&status=&includeDeleted=`
pub async fn list_agents(
    State(s): State<Arc<AppState>>,
    Query(query): Query<ListAgentsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status_filter = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(
            AgentStatus::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown status {raw}")))?,
        ),
    };

    let agents = match query.worktree_id.as_deref() {
        Some(worktree_id) => {
            s.store.worktrees().find_by_id(worktree_id)?;
            s.store.agents().find_by_worktree(worktree_id, query.include_deleted)?
        }
        None => s.store.agents().find_all(query.include_deleted)?,
    };

    let agents: Vec<AgentApi> = agents
        .into_iter()
        .filter(|a| status_filter.is_none_or(|wanted| a.status == wanted))
        .map(AgentApi::from)
        .collect();
    Ok(Json(agents))
}

/// `POST /agents`
pub async fn create_agent(
    State(s): State<Arc<AppState>>,
    Json(body): Json<CreateAgentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = s
        .services
        .agents
        .create_agent(
            &body.worktree_id,
            CreateAgent { name: body.name, mode: body.mode, permissions: body.permissions },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(AgentApi::from(agent))))
}

/// `GET /agents/{id}`
pub async fn get_agent(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(AgentApi::from(s.store.agents().find_by_id(&id)?)))
}

/// `PUT /agents/{id}`
pub async fn update_agent(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateAgentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = s
        .services
        .agents
        .update_agent(
            &id,
            UpdateAgent { name: body.name, mode: body.mode, permissions: body.permissions },
        )
        .await?;
    Ok(Json(AgentApi::from(agent)))
}

/// `DELETE /agents/{id}?archive=` — archive (soft-delete) by default.
pub async fn delete_agent(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<DeleteAgentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    s.services.agents.delete_agent(&id, query.archive.unwrap_or(true)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /agents/{id}/fork`
pub async fn fork_agent(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<ForkAgentRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let name = body.and_then(|Json(b)| b.name);
    let fork = s.services.agents.fork_agent(&id, name).await?;
    Ok((StatusCode::CREATED, Json(AgentApi::from(fork))))
}

/// `POST /agents/{id}/restore`
pub async fn restore_agent(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = s.services.agents.restore_agent(&id).await?;
    Ok(Json(AgentApi::from(agent)))
}

/// `PUT /agents/reorder`
pub async fn reorder_agents(
    State(s): State<Arc<AppState>>,
    Json(body): Json<ReorderAgentsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    s.services.agents.reorder_agents(&body.worktree_id, &body.agent_ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /agents/{id}/messages?limit=&before=`
pub async fn list_messages(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = s.services.agents.list_messages(
        &id,
        query.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT),
        query.before.as_deref(),
    )?;
    Ok(Json(MessagePageResponse {
        messages: page.messages.into_iter().map(MessageApi::from).collect(),
        has_more: page.has_more,
    }))
}

/// `POST /agents/{id}/message` — 202 with the delivery outcome.
pub async fn send_message(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.content.is_empty() {
        return Err(ApiError::validation("content must not be empty"));
    }
    let outcome = s.services.agents.send_message_to_agent(&id, &body.content).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

/// `POST /agents/{id}/start`
pub async fn start_agent(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<StartAgentRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let initial_prompt = body.and_then(|Json(b)| b.initial_prompt);
    let agent = s.services.agents.start_agent(&id, initial_prompt).await?;
    Ok(Json(AgentApi::from(agent)))
}

/// `POST /agents/{id}/stop?force=`
pub async fn stop_agent(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<StopAgentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = s.services.agents.stop_agent(&id, query.force).await?;
    Ok(Json(AgentApi::from(agent)))
}

/// `POST /agents/{id}/resume`
pub async fn resume_agent(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = s.services.agents.resume_agent(&id).await?;
    Ok(Json(AgentApi::from(agent)))
}

/// `GET /agents/{id}/status`
pub async fn agent_status(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (agent, record) = s.services.agents.runtime_status(&id).await?;
    Ok(Json(AgentStatusResponse {
        agent: AgentApi::from(agent),
        running: record.is_some(),
        supervisor_status: record.map(|r| r.status),
    }))
}
