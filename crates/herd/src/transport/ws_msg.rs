// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket message types and the `{type, payload, timestamp}` envelope.
//!
//! Both directions use adjacently-tagged JSON (`{"type": "...", "payload":
//! {...}}`); server frames additionally carry a top-level RFC-3339
//! timestamp injected at send time.

use serde::{Deserialize, Serialize};

use crate::model::{AgentStatus, MessageRole};

// -- Client → server ----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "subscribe:agent", rename_all = "camelCase")]
    SubscribeAgent { agent_id: String },
    #[serde(rename = "unsubscribe:agent", rename_all = "camelCase")]
    UnsubscribeAgent { agent_id: String },
    #[serde(rename = "subscribe:workspace", rename_all = "camelCase")]
    SubscribeWorkspace { workspace_id: String },
    #[serde(rename = "unsubscribe:workspace", rename_all = "camelCase")]
    UnsubscribeWorkspace { workspace_id: String },
    #[serde(rename = "ping")]
    Ping,
}

/// The message types a client may send; unknown types are rejected with
/// `UNKNOWN_MESSAGE_TYPE` before payload validation.
pub const CLIENT_MESSAGE_TYPES: &[&str] = &[
    "subscribe:agent",
    "unsubscribe:agent",
    "subscribe:workspace",
    "unsubscribe:workspace",
    "ping",
];

// -- Server → client ----------------------------------------------------------

/// Change discriminator for `workspace:updated` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceChange {
    WorktreeAdded,
    WorktreeRemoved,
    AgentAdded,
    AgentRemoved,
    AgentUpdated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "agent:output", rename_all = "camelCase")]
    AgentOutput {
        agent_id: String,
        content: String,
        role: MessageRole,
        is_streaming: bool,
    },
    #[serde(rename = "agent:status", rename_all = "camelCase")]
    AgentStatus {
        agent_id: String,
        previous: AgentStatus,
        status: AgentStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "agent:context", rename_all = "camelCase")]
    AgentContext { agent_id: String, context_level: u8 },
    #[serde(rename = "agent:error", rename_all = "camelCase")]
    AgentError { agent_id: String, code: String, message: String },
    #[serde(rename = "agent:terminated", rename_all = "camelCase")]
    AgentTerminated {
        agent_id: String,
        exit_code: Option<i32>,
        signal: Option<String>,
        reason: String,
    },
    #[serde(rename = "workspace:updated", rename_all = "camelCase")]
    WorkspaceUpdated {
        workspace_id: String,
        change: WorkspaceChange,
        data: serde_json::Value,
    },
    #[serde(rename = "usage:updated")]
    UsageUpdated { data: serde_json::Value },
    #[serde(rename = "pong")]
    Pong { timestamp: String },
    #[serde(rename = "error")]
    Error { code: String, message: String },
    #[serde(rename = "subscribed")]
    Subscribed {
        #[serde(rename = "type")]
        kind: String,
        id: String,
    },
    #[serde(rename = "unsubscribed")]
    Unsubscribed {
        #[serde(rename = "type")]
        kind: String,
        id: String,
    },
}

/// Serialize a server message into its wire frame, stamping the envelope
/// timestamp.
pub fn to_frame(message: &ServerMessage) -> String {
    let mut value = serde_json::to_value(message).unwrap_or_else(|_| {
        serde_json::json!({
            "type": "error",
            "payload": {"code": "INTERNAL_ERROR", "message": "serialization failed"},
        })
    });
    if let Some(object) = value.as_object_mut() {
        object.insert("timestamp".to_owned(), serde_json::json!(crate::id::now_iso()));
    }
    value.to_string()
}

#[cfg(test)]
#[path = "ws_msg_tests.rs"]
mod tests;
