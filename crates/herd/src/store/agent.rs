// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent repository.
//!
//! Display order is contiguous 0..N over the non-deleted agents of a
//! worktree after every create and reorder. Soft-delete keeps the row,
//! stamps `deleted_at`, and clears the pid.

use std::collections::BTreeSet;

use rusqlite::{params, Connection, Row};

use super::Store;
use crate::error::{ApiError, Result};
use crate::id::{self, IdPrefix};
use crate::model::{default_permissions, Agent, AgentMode, AgentStatus, Permission};

pub struct AgentRepo<'a> {
    pub(super) store: &'a Store,
}

/// Partial update; only provided fields are written. `pid`, `session_id`,
/// `started_at`, and `stopped_at` are double-optional so callers can set
/// them to null.
#[derive(Debug, Clone, Default)]
pub struct AgentPatch {
    pub name: Option<String>,
    pub status: Option<AgentStatus>,
    pub context_level: Option<i64>,
    pub mode: Option<AgentMode>,
    pub permissions: Option<BTreeSet<Permission>>,
    pub pid: Option<Option<i64>>,
    pub session_id: Option<Option<String>>,
    pub started_at: Option<Option<String>>,
    pub stopped_at: Option<Option<String>>,
}

impl AgentPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.status.is_none()
            && self.context_level.is_none()
            && self.mode.is_none()
            && self.permissions.is_none()
            && self.pid.is_none()
            && self.session_id.is_none()
            && self.started_at.is_none()
            && self.stopped_at.is_none()
    }
}

const COLUMNS: &str = "id, worktree_id, name, status, context_level, mode, permissions, \
                       display_order, pid, session_id, parent_agent_id, created_at, updated_at, \
                       started_at, stopped_at, deleted_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    let status: String = row.get("status")?;
    let mode: String = row.get("mode")?;
    let permissions: String = row.get("permissions")?;
    Ok(Agent {
        id: row.get("id")?,
        worktree_id: row.get("worktree_id")?,
        name: row.get("name")?,
        status: AgentStatus::parse(&status).unwrap_or(AgentStatus::Finished),
        context_level: row.get("context_level")?,
        mode: AgentMode::parse(&mode).unwrap_or_default(),
        permissions: parse_permissions(&permissions),
        display_order: row.get("display_order")?,
        pid: row.get("pid")?,
        session_id: row.get("session_id")?,
        parent_agent_id: row.get("parent_agent_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        started_at: row.get("started_at")?,
        stopped_at: row.get("stopped_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn parse_permissions(json: &str) -> BTreeSet<Permission> {
    serde_json::from_str::<Vec<Permission>>(json)
        .map(|v| v.into_iter().collect())
        .unwrap_or_else(|_| default_permissions())
}

fn serialize_permissions(permissions: &BTreeSet<Permission>) -> String {
    serde_json::to_string(&permissions.iter().collect::<Vec<_>>())
        .unwrap_or_else(|_| "[\"read\"]".to_owned())
}

fn get(conn: &Connection, id: &str) -> Result<Agent> {
    conn.query_row(&format!("SELECT {COLUMNS} FROM agents WHERE id = ?1"), params![id], from_row)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                ApiError::not_found(format!("agent {id} not found"))
            }
            other => other.into(),
        })
}

impl AgentRepo<'_> {
    /// Insert an agent at the end of its worktree's display order.
    /// New agents start `waiting` with no pid.
    pub fn create(
        &self,
        worktree_id: &str,
        name: &str,
        mode: AgentMode,
        permissions: BTreeSet<Permission>,
        parent_agent_id: Option<&str>,
    ) -> Result<Agent> {
        let now = id::now_iso();
        let agent_id = id::generate(IdPrefix::Agent);
        self.store.with_tx(|tx| {
            let next_order: i64 = tx.query_row(
                "SELECT COALESCE(MAX(display_order) + 1, 0) FROM agents
                 WHERE worktree_id = ?1 AND deleted_at IS NULL",
                params![worktree_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO agents
                     (id, worktree_id, name, status, mode, permissions, display_order,
                      parent_agent_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'waiting', ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    agent_id,
                    worktree_id,
                    name,
                    mode.as_str(),
                    serialize_permissions(&permissions),
                    next_order,
                    parent_agent_id,
                    now
                ],
            )?;
            get(tx, &agent_id)
        })
    }

    pub fn find_by_id(&self, id: &str) -> Result<Agent> {
        self.store.with_conn(|conn| get(conn, id))
    }

    pub fn find_by_worktree(&self, worktree_id: &str, include_deleted: bool) -> Result<Vec<Agent>> {
        let filter = if include_deleted { "" } else { "AND deleted_at IS NULL" };
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM agents WHERE worktree_id = ?1 {filter}
                 ORDER BY display_order, created_at"
            ))?;
            let rows = stmt.query_map(params![worktree_id], from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
        })
    }

    pub fn find_deleted_by_worktree(&self, worktree_id: &str) -> Result<Vec<Agent>> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM agents
                 WHERE worktree_id = ?1 AND deleted_at IS NOT NULL
                 ORDER BY deleted_at DESC"
            ))?;
            let rows = stmt.query_map(params![worktree_id], from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
        })
    }

    /// Agents whose status is running or waiting and that are not deleted.
    pub fn find_active(&self) -> Result<Vec<Agent>> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM agents
                 WHERE status IN ('running', 'waiting') AND deleted_at IS NULL
                 ORDER BY created_at"
            ))?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
        })
    }

    pub fn find_all(&self, include_deleted: bool) -> Result<Vec<Agent>> {
        let filter = if include_deleted { "" } else { "WHERE deleted_at IS NULL" };
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM agents {filter} ORDER BY created_at"
            ))?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
        })
    }

    /// Write only the provided fields. An empty patch returns the current
    /// row unchanged.
    pub fn update(&self, id: &str, patch: AgentPatch) -> Result<Agent> {
        if patch.is_empty() {
            return self.find_by_id(id);
        }
        self.store.with_tx(|tx| {
            let current = get(tx, id)?;
            tx.execute(
                "UPDATE agents SET
                     name = ?2, status = ?3, context_level = ?4, mode = ?5, permissions = ?6,
                     pid = ?7, session_id = ?8, started_at = ?9, stopped_at = ?10,
                     updated_at = ?11
                 WHERE id = ?1",
                params![
                    id,
                    patch.name.unwrap_or(current.name),
                    patch.status.unwrap_or(current.status).as_str(),
                    patch.context_level.unwrap_or(current.context_level),
                    patch.mode.unwrap_or(current.mode).as_str(),
                    serialize_permissions(&patch.permissions.unwrap_or(current.permissions)),
                    patch.pid.unwrap_or(current.pid),
                    patch.session_id.unwrap_or(current.session_id),
                    patch.started_at.unwrap_or(current.started_at),
                    patch.stopped_at.unwrap_or(current.stopped_at),
                    id::now_iso()
                ],
            )?;
            get(tx, id)
        })
    }

    /// Stamp `deleted_at`, mark finished, clear the pid.
    pub fn soft_delete(&self, id: &str) -> Result<Agent> {
        self.store.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE agents SET deleted_at = ?2, status = 'finished', pid = NULL,
                     updated_at = ?2
                 WHERE id = ?1",
                params![id, id::now_iso()],
            )?;
            if changed == 0 {
                return Err(ApiError::not_found(format!("agent {id} not found")));
            }
            get(tx, id)
        })
    }

    /// Clear `deleted_at` and reinstate the agent as waiting.
    pub fn restore(&self, id: &str) -> Result<Agent> {
        self.store.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE agents SET deleted_at = NULL, status = 'waiting', updated_at = ?2
                 WHERE id = ?1",
                params![id, id::now_iso()],
            )?;
            if changed == 0 {
                return Err(ApiError::not_found(format!("agent {id} not found")));
            }
            get(tx, id)
        })
    }

    pub fn hard_delete(&self, id: &str) -> Result<()> {
        self.store.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM agents WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(ApiError::not_found(format!("agent {id} not found")));
            }
            Ok(())
        })
    }

    /// Assign display-order = index for each id, in one transaction.
    /// Fails if any id does not belong to the worktree.
    pub fn reorder(&self, worktree_id: &str, ordered_ids: &[String]) -> Result<()> {
        self.store.with_tx(|tx| {
            for agent_id in ordered_ids {
                let owner = get(tx, agent_id)?.worktree_id;
                if owner != worktree_id {
                    return Err(ApiError::conflict(format!(
                        "agent {agent_id} does not belong to worktree {worktree_id}"
                    )));
                }
            }
            let now = id::now_iso();
            for (index, agent_id) in ordered_ids.iter().enumerate() {
                tx.execute(
                    "UPDATE agents SET display_order = ?2, updated_at = ?3 WHERE id = ?1",
                    params![agent_id, index as i64, now],
                )?;
            }
            Ok(())
        })
    }

    /// Crash recovery: any row still claiming a pid gets pid = null and
    /// status = error. Returns the number of rows touched.
    pub fn clear_pid_for_running_agents(&self) -> Result<usize> {
        self.store.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE agents SET pid = NULL, status = 'error', updated_at = ?1
                 WHERE pid IS NOT NULL",
                params![id::now_iso()],
            )?;
            Ok(changed)
        })
    }
}
