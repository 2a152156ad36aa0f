// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed event stream emitted by the supervisor.

use crate::model::AgentStatus;

/// Events emitted by the supervisor, tagged with the source agent id.
///
/// `Exit` is terminal for an agent id: the supervisor entry and output
/// buffer are gone by the time it is observed, and no further events for
/// that id follow.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    /// A chunk of stdout (`streaming: true`), or the end-of-stream flush
    /// (`streaming: false`, empty text) emitted at exit when the
    /// accumulated buffer is non-empty.
    Output { agent_id: String, text: String, streaming: bool },
    /// The tracked status changed.
    Status { agent_id: String, status: AgentStatus },
    /// A context-level percentage was recognized on stderr.
    Context { agent_id: String, level: u8 },
    /// A waiting cue was recognized; complementary to `Status(Waiting)`.
    Waiting { agent_id: String },
    /// An OS-level child error (I/O failure on a stream or the reaper).
    ProcessError { agent_id: String, message: String },
    /// The child exited. Exactly one per successful spawn.
    Exit { agent_id: String, code: Option<i32>, signal: Option<String> },
}

impl SupervisorEvent {
    /// Return the agent identifier for this event.
    pub fn agent_id(&self) -> &str {
        match self {
            Self::Output { agent_id, .. }
            | Self::Status { agent_id, .. }
            | Self::Context { agent_id, .. }
            | Self::Waiting { agent_id }
            | Self::ProcessError { agent_id, .. }
            | Self::Exit { agent_id, .. } => agent_id,
        }
    }
}
