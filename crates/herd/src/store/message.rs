// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message repository. Messages are immutable once written.

use rusqlite::{params, Row};

use super::Store;
use crate::error::Result;
use crate::id::{self, IdPrefix};
use crate::model::{Message, MessageRole};

pub struct MessageRepo<'a> {
    pub(super) store: &'a Store,
}

/// Fields for a new message row.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub agent_id: String,
    pub role: MessageRole,
    pub content: String,
    pub token_count: Option<i64>,
    pub tool_name: Option<String>,
    pub tool_input: Option<String>,
    pub tool_output: Option<String>,
    pub is_complete: bool,
}

impl NewMessage {
    pub fn text(agent_id: &str, role: MessageRole, content: &str) -> Self {
        Self {
            agent_id: agent_id.to_owned(),
            role,
            content: content.to_owned(),
            token_count: None,
            tool_name: None,
            tool_input: None,
            tool_output: None,
            is_complete: true,
        }
    }
}

/// One page of messages, newest first, with a continuation flag.
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

const COLUMNS: &str = "id, agent_id, role, content, token_count, tool_name, tool_input, \
                       tool_output, is_complete, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get("role")?;
    Ok(Message {
        id: row.get("id")?,
        agent_id: row.get("agent_id")?,
        role: MessageRole::parse(&role).unwrap_or(MessageRole::System),
        content: row.get("content")?,
        token_count: row.get("token_count")?,
        tool_name: row.get("tool_name")?,
        tool_input: row.get("tool_input")?,
        tool_output: row.get("tool_output")?,
        is_complete: row.get("is_complete")?,
        created_at: row.get("created_at")?,
    })
}

impl MessageRepo<'_> {
    pub fn create(&self, new: NewMessage) -> Result<Message> {
        let msg_id = id::generate(IdPrefix::Message);
        let now = id::now_iso();
        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages
                     (id, agent_id, role, content, token_count, tool_name, tool_input,
                      tool_output, is_complete, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    msg_id,
                    new.agent_id,
                    new.role.as_str(),
                    new.content,
                    new.token_count,
                    new.tool_name,
                    new.tool_input,
                    new.tool_output,
                    new.is_complete,
                    now
                ],
            )?;
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"),
                params![msg_id],
                from_row,
            )
            .map_err(Into::into)
        })
    }

    /// Page backwards by id cursor: messages strictly older than `before`
    /// (or the newest when absent), newest first. Insertion order is the
    /// paging order; the cursor id is resolved to its insertion position.
    pub fn list(&self, agent_id: &str, limit: usize, before: Option<&str>) -> Result<MessagePage> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM messages
                 WHERE agent_id = ?1
                   AND (?2 IS NULL
                        OR rowid < (SELECT rowid FROM messages WHERE id = ?2))
                 ORDER BY rowid DESC LIMIT ?3"
            ))?;
            // One extra row decides has_more without a second query.
            let rows = stmt.query_map(params![agent_id, before, limit as i64 + 1], from_row)?;
            let mut messages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            let has_more = messages.len() > limit;
            messages.truncate(limit);
            Ok(MessagePage { messages, has_more })
        })
    }

    pub fn count_for_agent(&self, agent_id: &str) -> Result<i64> {
        self.store.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE agent_id = ?1",
                params![agent_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
        })
    }
}
