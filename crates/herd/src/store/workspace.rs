// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace repository.

use rusqlite::{params, Connection, Row};

use super::Store;
use crate::error::{ApiError, Result};
use crate::id::{self, IdPrefix};
use crate::model::Workspace;

pub struct WorkspaceRepo<'a> {
    pub(super) store: &'a Store,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: row.get("id")?,
        name: row.get("name")?,
        path: row.get("path")?,
        worktree_count: row.get("worktree_count")?,
        agent_count: row.get("agent_count")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const COLUMNS: &str = "id, name, path, worktree_count, agent_count, created_at, updated_at";

fn get(conn: &Connection, id: &str) -> Result<Workspace> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM workspaces WHERE id = ?1"),
        params![id],
        from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            ApiError::not_found(format!("workspace {id} not found"))
        }
        other => other.into(),
    })
}

impl WorkspaceRepo<'_> {
    /// Insert a workspace; the path must be unique.
    pub fn create(&self, name: &str, path: &str) -> Result<Workspace> {
        let now = id::now_iso();
        let ws_id = id::generate(IdPrefix::Workspace);
        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO workspaces (id, name, path, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![ws_id, name, path, now],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(code, _)
                    if code.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    ApiError::conflict(format!("workspace path {path} already registered"))
                }
                other => other.into(),
            })?;
            get(conn, &ws_id)
        })
    }

    pub fn find_by_id(&self, id: &str) -> Result<Workspace> {
        self.store.with_conn(|conn| get(conn, id))
    }

    pub fn find_by_path(&self, path: &str) -> Result<Option<Workspace>> {
        self.store.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM workspaces WHERE path = ?1"),
                params![path],
                from_row,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other.into()),
            })
        })
    }

    pub fn find_all(&self) -> Result<Vec<Workspace>> {
        self.store.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM workspaces ORDER BY created_at"))?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
        })
    }

    pub fn rename(&self, id: &str, name: &str) -> Result<Workspace> {
        self.store.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE workspaces SET name = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, name, id::now_iso()],
            )?;
            if changed == 0 {
                return Err(ApiError::not_found(format!("workspace {id} not found")));
            }
            get(conn, id)
        })
    }

    /// Physically remove; cascades to worktrees, agents, and messages.
    pub fn hard_delete(&self, id: &str) -> Result<()> {
        self.store.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM workspaces WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(ApiError::not_found(format!("workspace {id} not found")));
            }
            Ok(())
        })
    }

    pub fn increment_worktree_count(&self, id: &str) -> Result<()> {
        self.bump(id, "worktree_count", 1)
    }

    pub fn decrement_worktree_count(&self, id: &str) -> Result<()> {
        self.bump(id, "worktree_count", -1)
    }

    pub fn increment_agent_count(&self, id: &str) -> Result<()> {
        self.bump(id, "agent_count", 1)
    }

    pub fn decrement_agent_count(&self, id: &str) -> Result<()> {
        self.bump(id, "agent_count", -1)
    }

    fn bump(&self, id: &str, column: &str, delta: i64) -> Result<()> {
        self.store.with_conn(|conn| {
            // Clamped at zero on decrement.
            conn.execute(
                &format!(
                    "UPDATE workspaces
                     SET {column} = MAX(0, {column} + ?2), updated_at = ?3
                     WHERE id = ?1"
                ),
                params![id, delta, id::now_iso()],
            )?;
            Ok(())
        })
    }

    /// Recompute both derived counters from the ground truth in one
    /// transaction: worktree-count = worktrees, agent-count = non-deleted
    /// agents joined via worktrees.
    pub fn recalculate_counts(&self, id: &str) -> Result<Workspace> {
        self.store.with_tx(|tx| {
            tx.execute(
                "UPDATE workspaces SET
                     worktree_count = (
                         SELECT COUNT(*) FROM worktrees WHERE workspace_id = ?1
                     ),
                     agent_count = (
                         SELECT COUNT(*) FROM agents a
                         JOIN worktrees w ON a.worktree_id = w.id
                         WHERE w.workspace_id = ?1 AND a.deleted_at IS NULL
                     ),
                     updated_at = ?2
                 WHERE id = ?1",
                params![id, id::now_iso()],
            )?;
            get(tx, id)
        })
    }
}
