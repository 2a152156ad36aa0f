// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent orchestration: composes the store, the supervisor, and the
//! broadcaster into the externally offered agent operations.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::broadcaster::Broadcaster;
use crate::error::{ApiError, Result};
use crate::id;
use crate::model::{
    default_permissions, Agent, AgentApi, AgentMode, AgentStatus, MessageRole, Permission,
};
use crate::store::{AgentPatch, MessagePage, NewMessage, Store};
use crate::supervisor::{ProcessRecord, SpawnRequest, Supervisor};
use crate::transport::ws_msg::WorkspaceChange;

/// Outcome of `send_message_to_agent`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub status: &'static str,
    pub running: bool,
}

/// Fields accepted by `create_agent`.
#[derive(Debug, Clone, Default)]
pub struct CreateAgent {
    pub name: Option<String>,
    pub mode: Option<AgentMode>,
    pub permissions: Option<BTreeSet<Permission>>,
}

/// Fields accepted by `update_agent`.
#[derive(Debug, Clone, Default)]
pub struct UpdateAgent {
    pub name: Option<String>,
    pub mode: Option<AgentMode>,
    pub permissions: Option<BTreeSet<Permission>>,
}

pub struct AgentService {
    store: Arc<Store>,
    supervisor: Arc<Supervisor>,
    broadcaster: Arc<Broadcaster>,
}

impl AgentService {
    pub fn new(
        store: Arc<Store>,
        supervisor: Arc<Supervisor>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self { store, supervisor, broadcaster }
    }

    pub async fn create_agent(&self, worktree_id: &str, spec: CreateAgent) -> Result<Agent> {
        let worktree = self.store.worktrees().find_by_id(worktree_id)?;
        let name = match spec.name {
            Some(name) => name,
            None => {
                let existing = self.store.agents().find_by_worktree(worktree_id, false)?;
                format!("Agent {}", existing.len() + 1)
            }
        };
        let agent = self.store.agents().create(
            worktree_id,
            &name,
            spec.mode.unwrap_or_default(),
            spec.permissions.unwrap_or_else(default_permissions),
            None,
        )?;
        self.store.workspaces().increment_agent_count(&worktree.workspace_id)?;
        self.broadcaster
            .broadcast_workspace_update(
                &worktree.workspace_id,
                WorkspaceChange::AgentAdded,
                agent_data(&agent),
            )
            .await;
        Ok(agent)
    }

    pub async fn update_agent(&self, agent_id: &str, spec: UpdateAgent) -> Result<Agent> {
        let agent = self.store.agents().update(
            agent_id,
            AgentPatch {
                name: spec.name,
                mode: spec.mode,
                permissions: spec.permissions,
                ..Default::default()
            },
        )?;
        let workspace_id = self.workspace_of(&agent)?;
        self.broadcaster
            .broadcast_workspace_update(
                &workspace_id,
                WorkspaceChange::AgentUpdated,
                agent_data(&agent),
            )
            .await;
        Ok(agent)
    }

    /// Soft-delete by default; hard-delete when `archive` is false. A
    /// running agent is stopped (gracefully) first.
    pub async fn delete_agent(&self, agent_id: &str, archive: bool) -> Result<()> {
        let agent = self.store.agents().find_by_id(agent_id)?;
        let workspace_id = self.workspace_of(&agent)?;

        if self.supervisor.is_running(agent_id).await {
            self.supervisor.stop_agent(agent_id, false).await?;
        }

        let was_deleted = agent.deleted_at.is_some();
        if archive {
            self.store.agents().soft_delete(agent_id)?;
        } else {
            self.store.agents().hard_delete(agent_id)?;
        }
        if !was_deleted {
            self.store.workspaces().decrement_agent_count(&workspace_id)?;
        }

        self.broadcaster
            .broadcast_workspace_update(
                &workspace_id,
                WorkspaceChange::AgentRemoved,
                serde_json::json!({ "agentId": agent_id }),
            )
            .await;
        Ok(())
    }

    /// Create a sibling agent with the same mode and permissions, recording
    /// the source as its parent.
    pub async fn fork_agent(&self, agent_id: &str, name: Option<String>) -> Result<Agent> {
        let source = self.store.agents().find_by_id(agent_id)?;
        let worktree = self.store.worktrees().find_by_id(&source.worktree_id)?;

        let fork = self.store.agents().create(
            &source.worktree_id,
            &name.unwrap_or_else(|| format!("{} (fork)", source.name)),
            source.mode,
            source.permissions.clone(),
            Some(&source.id),
        )?;
        self.store.workspaces().increment_agent_count(&worktree.workspace_id)?;
        self.broadcaster
            .broadcast_workspace_update(
                &worktree.workspace_id,
                WorkspaceChange::AgentAdded,
                agent_data(&fork),
            )
            .await;
        Ok(fork)
    }

    pub async fn restore_agent(&self, agent_id: &str) -> Result<Agent> {
        let agent = self.store.agents().find_by_id(agent_id)?;
        if agent.deleted_at.is_none() {
            return Err(ApiError::conflict(format!("agent {agent_id} is not deleted")));
        }
        let restored = self.store.agents().restore(agent_id)?;
        let workspace_id = self.workspace_of(&restored)?;
        self.store.workspaces().increment_agent_count(&workspace_id)?;
        self.broadcaster
            .broadcast_workspace_update(
                &workspace_id,
                WorkspaceChange::AgentAdded,
                agent_data(&restored),
            )
            .await;
        Ok(restored)
    }

    /// Reorder the non-deleted agents of a worktree. The given set must
    /// equal the current non-deleted set exactly.
    pub async fn reorder_agents(&self, worktree_id: &str, ordered_ids: &[String]) -> Result<()> {
        self.store.worktrees().find_by_id(worktree_id)?;
        let current = self.store.agents().find_by_worktree(worktree_id, false)?;

        let current_ids: BTreeSet<&str> = current.iter().map(|a| a.id.as_str()).collect();
        let given_ids: BTreeSet<&str> = ordered_ids.iter().map(String::as_str).collect();
        if current_ids != given_ids || ordered_ids.len() != current.len() {
            return Err(ApiError::conflict(
                "reorder set does not match the worktree's agents",
            ));
        }

        self.store.agents().reorder(worktree_id, ordered_ids)
    }

    pub async fn start_agent(&self, agent_id: &str, initial_prompt: Option<String>) -> Result<Agent> {
        let agent = self.store.agents().find_by_id(agent_id)?;
        if agent.deleted_at.is_some() {
            return Err(ApiError::conflict(format!("agent {agent_id} is deleted")));
        }
        if self.supervisor.is_running(agent_id).await {
            return Err(ApiError::conflict(format!("agent {agent_id} is already running")));
        }
        let worktree = self.store.worktrees().find_by_id(&agent.worktree_id)?;

        let record = self
            .supervisor
            .spawn_agent(SpawnRequest {
                agent_id: agent_id.to_owned(),
                working_dir: PathBuf::from(&worktree.path),
                mode: agent.mode,
                permissions: agent.permissions.clone(),
                initial_prompt,
                session_id: agent.session_id.clone(),
            })
            .await?;

        let updated = self.store.agents().update(
            agent_id,
            AgentPatch {
                status: Some(AgentStatus::Running),
                pid: Some(Some(record.pid as i64)),
                started_at: Some(Some(record.started_at.clone())),
                stopped_at: Some(None),
                ..Default::default()
            },
        )?;
        self.broadcaster.publish_status(agent_id, agent.status, AgentStatus::Running).await;
        Ok(updated)
    }

    /// Stop an agent. Idempotent: stopping an unsupervised agent still
    /// settles the row as finished.
    pub async fn stop_agent(&self, agent_id: &str, force: bool) -> Result<Agent> {
        let agent = self.store.agents().find_by_id(agent_id)?;
        if self.supervisor.is_running(agent_id).await {
            self.supervisor.stop_agent(agent_id, force).await?;
        }
        let updated = self.store.agents().update(
            agent_id,
            AgentPatch {
                status: Some(AgentStatus::Finished),
                pid: Some(None),
                stopped_at: Some(Some(id::now_iso())),
                ..Default::default()
            },
        )?;
        if agent.status != AgentStatus::Finished {
            self.broadcaster.publish_status(agent_id, agent.status, AgentStatus::Finished).await;
        }
        Ok(updated)
    }

    /// Re-spawn with the stored session id.
    pub async fn resume_agent(&self, agent_id: &str) -> Result<Agent> {
        let agent = self.store.agents().find_by_id(agent_id)?;
        let Some(session_id) = agent.session_id.clone() else {
            return Err(ApiError::conflict(format!("agent {agent_id} has no session to resume")));
        };
        if self.supervisor.is_running(agent_id).await {
            return Err(ApiError::conflict(format!("agent {agent_id} is already running")));
        }
        let worktree = self.store.worktrees().find_by_id(&agent.worktree_id)?;

        let record = self
            .supervisor
            .spawn_agent(SpawnRequest {
                agent_id: agent_id.to_owned(),
                working_dir: PathBuf::from(&worktree.path),
                mode: agent.mode,
                permissions: agent.permissions.clone(),
                initial_prompt: None,
                session_id: Some(session_id),
            })
            .await?;

        let updated = self.store.agents().update(
            agent_id,
            AgentPatch {
                status: Some(AgentStatus::Running),
                pid: Some(Some(record.pid as i64)),
                started_at: Some(Some(record.started_at.clone())),
                stopped_at: Some(None),
                ..Default::default()
            },
        )?;
        self.broadcaster.publish_status(agent_id, agent.status, AgentStatus::Running).await;
        Ok(updated)
    }

    /// Persist the user message; deliver it to the child when supervised,
    /// queue it otherwise.
    pub async fn send_message_to_agent(&self, agent_id: &str, content: &str) -> Result<SendOutcome> {
        self.store.agents().find_by_id(agent_id)?;
        self.store.messages().create(NewMessage::text(agent_id, MessageRole::User, content))?;

        if self.supervisor.is_running(agent_id).await {
            self.supervisor.send_message(agent_id, content).await?;
            Ok(SendOutcome { status: "sent", running: true })
        } else {
            Ok(SendOutcome { status: "queued", running: false })
        }
    }

    pub fn list_messages(
        &self,
        agent_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<MessagePage> {
        self.store.agents().find_by_id(agent_id)?;
        self.store.messages().list(agent_id, limit, before)
    }

    /// The stored row plus the live supervisor record, if any.
    pub async fn runtime_status(&self, agent_id: &str) -> Result<(Agent, Option<ProcessRecord>)> {
        let agent = self.store.agents().find_by_id(agent_id)?;
        let record = self.supervisor.get_process(agent_id).await;
        Ok((agent, record))
    }

    fn workspace_of(&self, agent: &Agent) -> Result<String> {
        Ok(self.store.worktrees().find_by_id(&agent.worktree_id)?.workspace_id)
    }
}

fn agent_data(agent: &Agent) -> serde_json::Value {
    serde_json::to_value(AgentApi::from(agent.clone())).unwrap_or_default()
}

#[cfg(test)]
#[path = "agents_tests.rs"]
mod tests;
