// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Numbered, forward-only schema migrations.
//!
//! `PRAGMA user_version` records the last applied migration. Never edit an
//! existing entry; append a new one.

pub const MIGRATIONS: &[&str] = &[
    // 1: initial schema
    r#"
    CREATE TABLE workspaces (
        id             TEXT PRIMARY KEY,
        name           TEXT NOT NULL,
        path           TEXT NOT NULL UNIQUE,
        worktree_count INTEGER NOT NULL DEFAULT 0,
        agent_count    INTEGER NOT NULL DEFAULT 0,
        created_at     TEXT NOT NULL,
        updated_at     TEXT NOT NULL
    );

    CREATE TABLE worktrees (
        id            TEXT PRIMARY KEY,
        workspace_id  TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
        name          TEXT NOT NULL,
        branch        TEXT NOT NULL DEFAULT '',
        path          TEXT NOT NULL,
        sort_mode     TEXT NOT NULL DEFAULT 'free',
        display_order INTEGER NOT NULL DEFAULT 0,
        is_main       INTEGER NOT NULL DEFAULT 0,
        created_at    TEXT NOT NULL,
        updated_at    TEXT NOT NULL,
        UNIQUE (workspace_id, path)
    );
    CREATE INDEX idx_worktrees_workspace ON worktrees(workspace_id);

    CREATE TABLE agents (
        id              TEXT PRIMARY KEY,
        worktree_id     TEXT NOT NULL REFERENCES worktrees(id) ON DELETE CASCADE,
        name            TEXT NOT NULL,
        status          TEXT NOT NULL DEFAULT 'waiting',
        context_level   INTEGER NOT NULL DEFAULT 0,
        mode            TEXT NOT NULL DEFAULT 'regular',
        permissions     TEXT NOT NULL DEFAULT '["read"]',
        display_order   INTEGER NOT NULL DEFAULT 0,
        pid             INTEGER,
        session_id      TEXT,
        parent_agent_id TEXT,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL,
        started_at      TEXT,
        stopped_at      TEXT,
        deleted_at      TEXT
    );
    CREATE INDEX idx_agents_worktree ON agents(worktree_id);
    CREATE INDEX idx_agents_status ON agents(status);

    CREATE TABLE messages (
        id          TEXT PRIMARY KEY,
        agent_id    TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
        role        TEXT NOT NULL,
        content     TEXT NOT NULL,
        token_count INTEGER,
        tool_name   TEXT,
        tool_input  TEXT,
        tool_output TEXT,
        is_complete INTEGER NOT NULL DEFAULT 1,
        created_at  TEXT NOT NULL
    );
    CREATE INDEX idx_messages_agent ON messages(agent_id);
    "#,
    // 2: append-only usage stats
    r#"
    CREATE TABLE usage_stats (
        date          TEXT NOT NULL,
        period        TEXT NOT NULL,
        input_tokens  INTEGER NOT NULL DEFAULT 0,
        output_tokens INTEGER NOT NULL DEFAULT 0,
        total_tokens  INTEGER NOT NULL DEFAULT 0,
        request_count INTEGER NOT NULL DEFAULT 0,
        error_count   INTEGER NOT NULL DEFAULT 0,
        models        TEXT NOT NULL DEFAULT '{}',
        PRIMARY KEY (date, period)
    );
    "#,
];
