// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree management over the git wrapper and the store.

use std::path::Path;
use std::sync::Arc;

use crate::broadcaster::Broadcaster;
use crate::error::{ApiError, Result};
use crate::git::{self, GitStatus};
use crate::model::Worktree;
use crate::store::{NewWorktree, Store, WorktreePatch};
use crate::supervisor::Supervisor;
use crate::transport::ws_msg::WorkspaceChange;

use super::workspaces::worktree_data;

/// Fields accepted by `create`.
#[derive(Debug, Clone)]
pub struct CreateWorktree {
    pub path: String,
    pub branch: String,
    pub create_branch: bool,
    pub name: Option<String>,
}

pub struct WorktreeService {
    store: Arc<Store>,
    supervisor: Arc<Supervisor>,
    broadcaster: Arc<Broadcaster>,
}

impl WorktreeService {
    pub fn new(
        store: Arc<Store>,
        supervisor: Arc<Supervisor>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self { store, supervisor, broadcaster }
    }

    pub fn get(&self, worktree_id: &str) -> Result<Worktree> {
        self.store.worktrees().find_by_id(worktree_id)
    }

    /// Create a git worktree and register it under the workspace.
    pub async fn create(&self, workspace_id: &str, spec: CreateWorktree) -> Result<Worktree> {
        let workspace = self.store.workspaces().find_by_id(workspace_id)?;

        git::add_worktree(
            Path::new(&workspace.path),
            &spec.path,
            &spec.branch,
            spec.create_branch,
        )
        .await?;

        let worktree = self.store.worktrees().create(NewWorktree {
            workspace_id: workspace.id.clone(),
            name: spec.name.unwrap_or_else(|| {
                Path::new(&spec.path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| spec.path.clone())
            }),
            branch: spec.branch,
            path: spec.path,
            is_main: false,
        })?;
        self.store.workspaces().increment_worktree_count(&workspace.id)?;

        self.broadcaster
            .broadcast_workspace_update(
                &workspace.id,
                WorkspaceChange::WorktreeAdded,
                worktree_data(&worktree),
            )
            .await;
        Ok(worktree)
    }

    pub fn update(&self, worktree_id: &str, patch: WorktreePatch) -> Result<Worktree> {
        self.store.worktrees().update(worktree_id, patch)
    }

    /// Remove the git worktree and its rows. The main worktree cannot be
    /// removed. Supervised agents under the tree are force-stopped.
    pub async fn delete(&self, worktree_id: &str, force: bool) -> Result<()> {
        let worktree = self.store.worktrees().find_by_id(worktree_id)?;
        if worktree.is_main {
            return Err(ApiError::conflict("cannot remove the main worktree"));
        }
        let workspace = self.store.workspaces().find_by_id(&worktree.workspace_id)?;

        for agent in self.store.agents().find_by_worktree(worktree_id, true)? {
            self.supervisor.stop_agent(&agent.id, true).await?;
        }

        git::remove_worktree(Path::new(&workspace.path), &worktree.path, force).await?;
        self.store.worktrees().hard_delete(worktree_id)?;
        self.store.workspaces().recalculate_counts(&workspace.id)?;

        self.broadcaster
            .broadcast_workspace_update(
                &workspace.id,
                WorkspaceChange::WorktreeRemoved,
                serde_json::json!({ "worktreeId": worktree_id }),
            )
            .await;
        Ok(())
    }

    /// Check out a branch inside the worktree directory and record it.
    pub async fn checkout(
        &self,
        worktree_id: &str,
        branch: &str,
        create_branch: bool,
    ) -> Result<Worktree> {
        let worktree = self.store.worktrees().find_by_id(worktree_id)?;
        git::checkout(Path::new(&worktree.path), branch, create_branch).await?;
        self.store.worktrees().update(
            worktree_id,
            WorktreePatch { branch: Some(branch.to_owned()), ..Default::default() },
        )
    }

    pub async fn reorder(&self, ordered_ids: &[String]) -> Result<()> {
        if ordered_ids.is_empty() {
            return Err(ApiError::validation("worktreeIds must not be empty"));
        }
        self.store.worktrees().reorder(ordered_ids)
    }

    pub async fn status(&self, worktree_id: &str) -> Result<GitStatus> {
        let worktree = self.store.worktrees().find_by_id(worktree_id)?;
        git::status(Path::new(&worktree.path)).await
    }

    pub async fn branches(&self, worktree_id: &str) -> Result<Vec<String>> {
        let worktree = self.store.worktrees().find_by_id(worktree_id)?;
        git::list_branches(Path::new(&worktree.path)).await
    }
}
