// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree repository.

use rusqlite::{params, Connection, Row};

use super::Store;
use crate::error::{ApiError, Result};
use crate::id::{self, IdPrefix};
use crate::model::{SortMode, Worktree};

pub struct WorktreeRepo<'a> {
    pub(super) store: &'a Store,
}

/// Fields for a new worktree row.
#[derive(Debug, Clone)]
pub struct NewWorktree {
    pub workspace_id: String,
    pub name: String,
    pub branch: String,
    pub path: String,
    pub is_main: bool,
}

/// Partial update; only provided fields are written.
#[derive(Debug, Clone, Default)]
pub struct WorktreePatch {
    pub name: Option<String>,
    pub branch: Option<String>,
    pub sort_mode: Option<SortMode>,
}

impl WorktreePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.branch.is_none() && self.sort_mode.is_none()
    }
}

const COLUMNS: &str = "id, workspace_id, name, branch, path, sort_mode, display_order, is_main, \
                       created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Worktree> {
    let sort_mode: String = row.get("sort_mode")?;
    Ok(Worktree {
        id: row.get("id")?,
        workspace_id: row.get("workspace_id")?,
        name: row.get("name")?,
        branch: row.get("branch")?,
        path: row.get("path")?,
        sort_mode: SortMode::parse(&sort_mode).unwrap_or_default(),
        display_order: row.get("display_order")?,
        is_main: row.get("is_main")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn get(conn: &Connection, id: &str) -> Result<Worktree> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM worktrees WHERE id = ?1"),
        params![id],
        from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            ApiError::not_found(format!("worktree {id} not found"))
        }
        other => other.into(),
    })
}

impl WorktreeRepo<'_> {
    /// Insert a worktree at the end of its workspace's display order.
    pub fn create(&self, new: NewWorktree) -> Result<Worktree> {
        let now = id::now_iso();
        let wt_id = id::generate(IdPrefix::Worktree);
        self.store.with_tx(|tx| {
            let next_order: i64 = tx.query_row(
                "SELECT COALESCE(MAX(display_order) + 1, 0) FROM worktrees
                 WHERE workspace_id = ?1",
                params![new.workspace_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO worktrees
                     (id, workspace_id, name, branch, path, display_order, is_main,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    wt_id,
                    new.workspace_id,
                    new.name,
                    new.branch,
                    new.path,
                    next_order,
                    new.is_main,
                    now
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(code, _)
                    if code.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    ApiError::conflict(format!(
                        "worktree path {} already registered in workspace",
                        new.path
                    ))
                }
                other => other.into(),
            })?;
            get(tx, &wt_id)
        })
    }

    pub fn find_by_id(&self, id: &str) -> Result<Worktree> {
        self.store.with_conn(|conn| get(conn, id))
    }

    pub fn find_by_workspace(&self, workspace_id: &str) -> Result<Vec<Worktree>> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM worktrees WHERE workspace_id = ?1
                 ORDER BY display_order, created_at"
            ))?;
            let rows = stmt.query_map(params![workspace_id], from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
        })
    }

    pub fn find_by_path(&self, workspace_id: &str, path: &str) -> Result<Option<Worktree>> {
        self.store.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM worktrees WHERE workspace_id = ?1 AND path = ?2"),
                params![workspace_id, path],
                from_row,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other.into()),
            })
        })
    }

    pub fn update(&self, id: &str, patch: WorktreePatch) -> Result<Worktree> {
        if patch.is_empty() {
            return self.find_by_id(id);
        }
        self.store.with_tx(|tx| {
            let current = get(tx, id)?;
            tx.execute(
                "UPDATE worktrees SET name = ?2, branch = ?3, sort_mode = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    id,
                    patch.name.unwrap_or(current.name),
                    patch.branch.unwrap_or(current.branch),
                    patch.sort_mode.unwrap_or(current.sort_mode).as_str(),
                    id::now_iso()
                ],
            )?;
            get(tx, id)
        })
    }

    pub fn hard_delete(&self, id: &str) -> Result<()> {
        self.store.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM worktrees WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(ApiError::not_found(format!("worktree {id} not found")));
            }
            Ok(())
        })
    }

    /// Assign display-order = index for each id, in one transaction. Every id
    /// must belong to the same workspace.
    pub fn reorder(&self, ordered_ids: &[String]) -> Result<()> {
        self.store.with_tx(|tx| {
            let mut workspace_id: Option<String> = None;
            for tree_id in ordered_ids {
                let owner = get(tx, tree_id)?.workspace_id;
                match workspace_id {
                    None => workspace_id = Some(owner),
                    Some(ref ws) if *ws == owner => {}
                    Some(_) => {
                        return Err(ApiError::conflict(
                            "worktrees belong to different workspaces",
                        ));
                    }
                }
            }
            let now = id::now_iso();
            for (index, tree_id) in ordered_ids.iter().enumerate() {
                tx.execute(
                    "UPDATE worktrees SET display_order = ?2, updated_at = ?3 WHERE id = ?1",
                    params![tree_id, index as i64, now],
                )?;
            }
            Ok(())
        })
    }
}
