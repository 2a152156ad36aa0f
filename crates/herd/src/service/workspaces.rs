// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace registration and git re-sync.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::broadcaster::Broadcaster;
use crate::error::{ApiError, Result};
use crate::git;
use crate::model::{Workspace, Worktree, WorktreeApi};
use crate::store::{NewWorktree, Store};
use crate::supervisor::Supervisor;
use crate::transport::ws_msg::WorkspaceChange;

pub struct WorkspaceService {
    store: Arc<Store>,
    supervisor: Arc<Supervisor>,
    broadcaster: Arc<Broadcaster>,
}

impl WorkspaceService {
    pub fn new(
        store: Arc<Store>,
        supervisor: Arc<Supervisor>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self { store, supervisor, broadcaster }
    }

    /// Register a git repository root and discover its worktrees.
    pub async fn register(&self, path: &str) -> Result<Workspace> {
        let root = PathBuf::from(path);
        if !root.is_dir() {
            return Err(ApiError::validation(format!("path {path} is not a directory")));
        }
        if !git::is_git_repo(&root).await {
            return Err(ApiError::validation(format!("path {path} is not a git repository")));
        }

        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_owned());
        let workspace = self.store.workspaces().create(&name, path)?;

        self.sync_worktrees(&workspace).await?;
        self.store.workspaces().recalculate_counts(&workspace.id)
    }

    pub fn list(&self) -> Result<Vec<Workspace>> {
        self.store.workspaces().find_all()
    }

    pub fn get(&self, workspace_id: &str) -> Result<Workspace> {
        self.store.workspaces().find_by_id(workspace_id)
    }

    pub fn worktrees(&self, workspace_id: &str) -> Result<Vec<Worktree>> {
        self.store.workspaces().find_by_id(workspace_id)?;
        self.store.worktrees().find_by_workspace(workspace_id)
    }

    /// Delete the workspace and everything under it. Supervised agents are
    /// force-stopped first.
    pub async fn delete(&self, workspace_id: &str) -> Result<()> {
        let workspace = self.store.workspaces().find_by_id(workspace_id)?;
        for worktree in self.store.worktrees().find_by_workspace(&workspace.id)? {
            for agent in self.store.agents().find_by_worktree(&worktree.id, true)? {
                self.supervisor.stop_agent(&agent.id, true).await?;
            }
        }
        self.store.workspaces().hard_delete(workspace_id)
    }

    /// Re-sync worktree rows from `git worktree list`: add newly discovered
    /// trees, drop vanished ones, and recompute the derived counts.
    pub async fn refresh(&self, workspace_id: &str) -> Result<Workspace> {
        let workspace = self.store.workspaces().find_by_id(workspace_id)?;

        let discovered = git::list_worktrees(Path::new(&workspace.path)).await?;
        let known = self.store.worktrees().find_by_workspace(&workspace.id)?;

        for tree in &discovered {
            if known.iter().any(|w| w.path == tree.path) {
                continue;
            }
            let created = self.store.worktrees().create(NewWorktree {
                workspace_id: workspace.id.clone(),
                name: worktree_name(&tree.path),
                branch: tree.branch.clone(),
                path: tree.path.clone(),
                is_main: tree.is_main,
            })?;
            self.broadcaster
                .broadcast_workspace_update(
                    &workspace.id,
                    WorkspaceChange::WorktreeAdded,
                    worktree_data(&created),
                )
                .await;
        }

        for row in &known {
            if discovered.iter().any(|t| t.path == row.path) {
                continue;
            }
            self.store.worktrees().hard_delete(&row.id)?;
            self.broadcaster
                .broadcast_workspace_update(
                    &workspace.id,
                    WorkspaceChange::WorktreeRemoved,
                    serde_json::json!({ "worktreeId": row.id }),
                )
                .await;
        }

        self.store.workspaces().recalculate_counts(&workspace.id)
    }

    /// Create rows for every git-reported worktree missing from the store.
    async fn sync_worktrees(&self, workspace: &Workspace) -> Result<()> {
        let discovered = git::list_worktrees(Path::new(&workspace.path)).await?;
        for tree in discovered {
            if self.store.worktrees().find_by_path(&workspace.id, &tree.path)?.is_some() {
                continue;
            }
            self.store.worktrees().create(NewWorktree {
                workspace_id: workspace.id.clone(),
                name: worktree_name(&tree.path),
                branch: tree.branch.clone(),
                path: tree.path,
                is_main: tree.is_main,
            })?;
        }
        Ok(())
    }
}

fn worktree_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_owned())
}

pub(crate) fn worktree_data(worktree: &Worktree) -> serde_json::Value {
    serde_json::to_value(WorktreeApi::from(worktree.clone())).unwrap_or_default()
}
