// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedded single-writer relational store.
//!
//! One SQLite file in WAL mode behind a mutex. All repository operations are
//! synchronous and transactional; constraint violations surface as
//! [`ErrorCode::Conflict`](crate::error::ErrorCode), everything else as
//! `StorageError`.

mod agent;
mod message;
mod schema;
mod usage;
mod workspace;
mod worktree;

pub use agent::{AgentPatch, AgentRepo};
pub use message::{MessagePage, MessageRepo, NewMessage};
pub use usage::{UsageDelta, UsageRepo};
pub use workspace::WorkspaceRepo;
pub use worktree::{NewWorktree, WorktreePatch, WorktreeRepo};

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::error::Result;

/// Handle to the durable store. Cheap to share behind an `Arc`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database file and apply pending migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::error::ApiError::storage(format!("create data dir: {e}")))?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        let version: i64 =
            conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        for (index, migration) in schema::MIGRATIONS.iter().enumerate() {
            let target = index as i64 + 1;
            if target <= version {
                continue;
            }
            let tx = conn.transaction()?;
            tx.execute_batch(migration)?;
            tx.pragma_update(None, "user_version", target)?;
            tx.commit()?;
            tracing::info!(version = target, "applied schema migration");
        }
        Ok(())
    }

    /// Run `f` with the connection locked.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` inside a transaction; committed on `Ok`, rolled back on `Err`.
    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub fn workspaces(&self) -> WorkspaceRepo<'_> {
        WorkspaceRepo { store: self }
    }

    pub fn worktrees(&self) -> WorktreeRepo<'_> {
        WorktreeRepo { store: self }
    }

    pub fn agents(&self) -> AgentRepo<'_> {
        AgentRepo { store: self }
    }

    pub fn messages(&self) -> MessageRepo<'_> {
        MessageRepo { store: self }
    }

    pub fn usage(&self) -> UsageRepo<'_> {
        UsageRepo { store: self }
    }

    /// Lightweight readiness probe: a trivial query must succeed.
    pub fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
