// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain types and the row ⇄ API mapping.
//!
//! Row structs mirror storage columns (snake_case); API structs define the
//! wire shape (camelCase). The `From` impls here are the source of truth for
//! the external JSON representation.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// -- Enums --------------------------------------------------------------------

/// Tracked lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Running,
    Waiting,
    Error,
    Finished,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Error => "error",
            Self::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "waiting" => Some(Self::Waiting),
            "error" => Some(Self::Error),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }

    /// Running and waiting agents are "active": they have a live child.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Waiting)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission handling mode passed to the agent command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Auto,
    Plan,
    Regular,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Plan => "plan",
            Self::Regular => "regular",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "plan" => Some(Self::Plan),
            "regular" => Some(Self::Regular),
            _ => None,
        }
    }
}

impl Default for AgentMode {
    fn default() -> Self {
        Self::Regular
    }
}

/// Tool permission granted to an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Execute,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Execute => "execute",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "execute" => Some(Self::Execute),
            _ => None,
        }
    }
}

/// Default permission set for new agents.
pub fn default_permissions() -> BTreeSet<Permission> {
    BTreeSet::from([Permission::Read])
}

/// Worktree presentation sort mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    Free,
    Status,
    Name,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Status => "status",
            Self::Name => "name",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Self::Free),
            "status" => Some(Self::Status),
            "name" => Some(Self::Name),
            _ => None,
        }
    }
}

impl Default for SortMode {
    fn default() -> Self {
        Self::Free
    }
}

/// Author role of a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

/// Aggregation period for usage stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsagePeriod {
    Daily,
    Weekly,
    Monthly,
}

impl UsagePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }
}

// -- Row structs --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub path: String,
    pub worktree_count: i64,
    pub agent_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Worktree {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub branch: String,
    pub path: String,
    pub sort_mode: SortMode,
    pub display_order: i64,
    pub is_main: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub id: String,
    pub worktree_id: String,
    pub name: String,
    pub status: AgentStatus,
    pub context_level: i64,
    pub mode: AgentMode,
    pub permissions: BTreeSet<Permission>,
    pub display_order: i64,
    pub pid: Option<i64>,
    pub session_id: Option<String>,
    pub parent_agent_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub stopped_at: Option<String>,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub agent_id: String,
    pub role: MessageRole,
    pub content: String,
    pub token_count: Option<i64>,
    pub tool_name: Option<String>,
    pub tool_input: Option<String>,
    pub tool_output: Option<String>,
    pub is_complete: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsageStat {
    pub date: String,
    pub period: UsagePeriod,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub request_count: i64,
    pub error_count: i64,
    /// Per-model token breakdown, stored as a JSON object.
    pub models: serde_json::Value,
}

// -- API shapes ---------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceApi {
    pub id: String,
    pub name: String,
    pub path: String,
    pub worktree_count: i64,
    pub agent_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Workspace> for WorkspaceApi {
    fn from(row: Workspace) -> Self {
        Self {
            id: row.id,
            name: row.name,
            path: row.path,
            worktree_count: row.worktree_count,
            agent_count: row.agent_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeApi {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub branch: String,
    pub path: String,
    pub sort_mode: SortMode,
    pub display_order: i64,
    pub is_main: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Worktree> for WorktreeApi {
    fn from(row: Worktree) -> Self {
        Self {
            id: row.id,
            workspace_id: row.workspace_id,
            name: row.name,
            branch: row.branch,
            path: row.path,
            sort_mode: row.sort_mode,
            display_order: row.display_order,
            is_main: row.is_main,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentApi {
    pub id: String,
    pub worktree_id: String,
    pub name: String,
    pub status: AgentStatus,
    pub context_level: i64,
    pub mode: AgentMode,
    pub permissions: Vec<Permission>,
    pub display_order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_agent_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
}

impl From<Agent> for AgentApi {
    fn from(row: Agent) -> Self {
        Self {
            id: row.id,
            worktree_id: row.worktree_id,
            name: row.name,
            status: row.status,
            context_level: row.context_level,
            mode: row.mode,
            permissions: row.permissions.into_iter().collect(),
            display_order: row.display_order,
            pid: row.pid,
            session_id: row.session_id,
            parent_agent_id: row.parent_agent_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            stopped_at: row.stopped_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageApi {
    pub id: String,
    pub agent_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<String>,
    pub is_complete: bool,
    pub created_at: String,
}

impl From<Message> for MessageApi {
    fn from(row: Message) -> Self {
        Self {
            id: row.id,
            agent_id: row.agent_id,
            role: row.role,
            content: row.content,
            token_count: row.token_count,
            tool_name: row.tool_name,
            tool_input: row.tool_input,
            tool_output: row.tool_output,
            is_complete: row.is_complete,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStatApi {
    pub date: String,
    pub period: UsagePeriod,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub request_count: i64,
    pub error_count: i64,
    pub models: serde_json::Value,
}

impl From<UsageStat> for UsageStatApi {
    fn from(row: UsageStat) -> Self {
        Self {
            date: row.date,
            period: row.period,
            input_tokens: row.input_tokens,
            output_tokens: row.output_tokens,
            total_tokens: row.total_tokens,
            request_count: row.request_count,
            error_count: row.error_count,
            models: row.models,
        }
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
