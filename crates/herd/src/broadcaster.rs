// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event broadcaster: couples the supervisor's event stream to the durable
//! store and fans typed messages out to subscribed clients.
//!
//! The broadcaster is the only consumer of supervisor events and the only
//! writer of event-driven agent state. It keeps a short-lived previous-status
//! map for transition reasoning and a per-agent output accumulator for
//! assistant message persistence; both are purged on exit and error.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use crate::clients::ClientManager;
use crate::model::{AgentStatus, MessageRole, UsagePeriod};
use crate::store::{AgentPatch, NewMessage, Store, UsageDelta};
use crate::supervisor::SupervisorEvent;
use crate::transport::ws_msg::{ServerMessage, WorkspaceChange};
use crate::id;

/// Crude chars-per-token divisor used to estimate token counts from raw
/// output; the agent CLI does not report real counts on its streams.
const CHARS_PER_TOKEN: usize = 4;

pub struct Broadcaster {
    store: Arc<Store>,
    clients: Arc<ClientManager>,
    prev_status: Mutex<HashMap<String, AgentStatus>>,
    pending_output: Mutex<HashMap<String, String>>,
}

impl Broadcaster {
    pub fn new(store: Arc<Store>, clients: Arc<ClientManager>) -> Self {
        Self {
            store,
            clients,
            prev_status: Mutex::new(HashMap::new()),
            pending_output: Mutex::new(HashMap::new()),
        }
    }

    /// Drain the supervisor event stream until shutdown.
    pub fn spawn_pump(
        self: &Arc<Self>,
        mut rx: broadcast::Receiver<SupervisorEvent>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let broadcaster = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(event) => broadcaster.handle_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "broadcaster lagged behind supervisor");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    /// Apply one supervisor event: durable update first, then fan-out.
    pub async fn handle_event(&self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::Output { agent_id, text, streaming: true } => {
                self.pending_output.lock().await.entry(agent_id.clone()).or_default().push_str(&text);
                self.clients
                    .broadcast_to_agent_subscribers(
                        &agent_id,
                        &ServerMessage::AgentOutput {
                            agent_id: agent_id.clone(),
                            content: text,
                            role: MessageRole::Assistant,
                            is_streaming: true,
                        },
                    )
                    .await;
            }
            SupervisorEvent::Output { agent_id, streaming: false, .. } => {
                let persisted = self.finalize_output(&agent_id).await;
                // End-of-stream marker; emitted only after buffered output.
                if persisted {
                    self.clients
                        .broadcast_to_agent_subscribers(
                            &agent_id,
                            &ServerMessage::AgentOutput {
                                agent_id: agent_id.clone(),
                                content: String::new(),
                                role: MessageRole::Assistant,
                                is_streaming: false,
                            },
                        )
                        .await;
                }
            }
            SupervisorEvent::Status { agent_id, status } => {
                let previous = self.swap_previous(&agent_id, status).await;
                if previous == Some(status) {
                    return;
                }
                self.update_agent(
                    &agent_id,
                    AgentPatch { status: Some(status), ..Default::default() },
                )
                .await;
                let previous = previous.unwrap_or(AgentStatus::Finished);
                self.publish_status(&agent_id, previous, status).await;
            }
            SupervisorEvent::Context { agent_id, level } => {
                self.update_agent(
                    &agent_id,
                    AgentPatch { context_level: Some(level as i64), ..Default::default() },
                )
                .await;
                self.clients
                    .broadcast_to_agent_subscribers(
                        &agent_id,
                        &ServerMessage::AgentContext {
                            agent_id: agent_id.clone(),
                            context_level: level,
                        },
                    )
                    .await;
            }
            SupervisorEvent::Waiting { agent_id } => {
                tracing::debug!(agent_id = %agent_id, "agent waiting for input");
            }
            SupervisorEvent::ProcessError { agent_id, message } => {
                self.prev_status.lock().await.insert(agent_id.clone(), AgentStatus::Error);
                self.update_agent(
                    &agent_id,
                    AgentPatch {
                        status: Some(AgentStatus::Error),
                        pid: Some(None),
                        stopped_at: Some(Some(id::now_iso())),
                        ..Default::default()
                    },
                )
                .await;
                self.clients
                    .broadcast_to_agent_subscribers(
                        &agent_id,
                        &ServerMessage::AgentError {
                            agent_id: agent_id.clone(),
                            code: "PROCESS_ERROR".to_owned(),
                            message,
                        },
                    )
                    .await;
            }
            SupervisorEvent::Exit { agent_id, code, signal } => {
                let _ = self.finalize_output(&agent_id).await;
                let prior = self.prev_status.lock().await.remove(&agent_id);

                // A clean exit or a user-delivered stop signal settles as
                // finished; anything else is an error.
                let user_stopped =
                    matches!(signal.as_deref(), Some("SIGTERM") | Some("SIGINT"));
                let status = if code == Some(0) || user_stopped {
                    AgentStatus::Finished
                } else {
                    AgentStatus::Error
                };
                self.update_agent(
                    &agent_id,
                    AgentPatch {
                        status: Some(status),
                        pid: Some(None),
                        stopped_at: Some(Some(id::now_iso())),
                        ..Default::default()
                    },
                )
                .await;

                let reason = exit_reason(code, signal.as_deref(), prior);
                self.clients
                    .broadcast_to_agent_subscribers(
                        &agent_id,
                        &ServerMessage::AgentTerminated {
                            agent_id: agent_id.clone(),
                            exit_code: code,
                            signal,
                            reason: reason.to_owned(),
                        },
                    )
                    .await;
            }
        }
    }

    /// Broadcast a status transition; used both by the pump and by the agent
    /// service when it changes status imperatively (start/stop).
    pub async fn publish_status(
        &self,
        agent_id: &str,
        previous: AgentStatus,
        status: AgentStatus,
    ) {
        self.prev_status.lock().await.insert(agent_id.to_owned(), status);
        let reason = status_reason(status);
        self.clients
            .broadcast_to_agent_subscribers(
                agent_id,
                &ServerMessage::AgentStatus {
                    agent_id: agent_id.to_owned(),
                    previous,
                    status,
                    reason: reason.map(str::to_owned),
                },
            )
            .await;
    }

    /// Imperative workspace-change broadcast used by the services on
    /// mutations.
    pub async fn broadcast_workspace_update(
        &self,
        workspace_id: &str,
        change: WorkspaceChange,
        data: serde_json::Value,
    ) {
        self.clients
            .broadcast_to_workspace_subscribers(
                workspace_id,
                &ServerMessage::WorkspaceUpdated {
                    workspace_id: workspace_id.to_owned(),
                    change,
                    data,
                },
            )
            .await;
    }

    /// Usage observation broadcast, sent to every connected client.
    pub async fn broadcast_usage_update(&self, data: serde_json::Value) {
        self.clients.broadcast(&ServerMessage::UsageUpdated { data }).await;
    }

    /// Persist the accumulated assistant output, if any, and record usage.
    /// Returns whether a message was persisted.
    async fn finalize_output(&self, agent_id: &str) -> bool {
        let accumulated = self.pending_output.lock().await.remove(agent_id);
        let Some(content) = accumulated.filter(|c| !c.is_empty()) else {
            return false;
        };

        let token_estimate = (content.len() / CHARS_PER_TOKEN) as i64;
        let mut message = NewMessage::text(agent_id, MessageRole::Assistant, &content);
        message.token_count = Some(token_estimate);
        if let Err(e) = self.store.messages().create(message) {
            tracing::warn!(agent_id = %agent_id, error = %e, "failed to persist assistant message");
            return false;
        }

        let delta = UsageDelta {
            output_tokens: token_estimate,
            request_count: 1,
            ..Default::default()
        };
        for period in [UsagePeriod::Daily, UsagePeriod::Weekly, UsagePeriod::Monthly] {
            if let Err(e) = self.store.usage().record(period, &delta) {
                tracing::warn!(error = %e, "failed to record usage");
            }
        }
        if let Ok(stats) = self.store.usage().find_by_period(UsagePeriod::Daily) {
            if let Some(today) = stats.first() {
                if let Ok(data) = serde_json::to_value(crate::model::UsageStatApi::from(today.clone())) {
                    self.broadcast_usage_update(data).await;
                }
            }
        }
        true
    }

    async fn swap_previous(
        &self,
        agent_id: &str,
        status: AgentStatus,
    ) -> Option<AgentStatus> {
        let mut map = self.prev_status.lock().await;
        let previous = map.insert(agent_id.to_owned(), status);
        if previous.is_some() {
            return previous;
        }
        drop(map);
        // First event for this agent: fall back to the stored row.
        self.store.agents().find_by_id(agent_id).ok().map(|a| a.status)
    }

    async fn update_agent(&self, agent_id: &str, patch: AgentPatch) {
        if let Err(e) = self.store.agents().update(agent_id, patch) {
            tracing::warn!(agent_id = %agent_id, error = %e, "event-driven agent update failed");
        }
    }
}

/// Reason attached to `agent:status` transitions.
fn status_reason(status: AgentStatus) -> Option<&'static str> {
    match status {
        AgentStatus::Waiting => Some("awaiting_input"),
        AgentStatus::Error => Some("process_error"),
        AgentStatus::Finished => Some("completed"),
        AgentStatus::Running => None,
    }
}

/// Reason attached to `agent:terminated` frames.
fn exit_reason(code: Option<i32>, signal: Option<&str>, prior: Option<AgentStatus>) -> &'static str {
    match signal {
        Some("SIGTERM") | Some("SIGINT") => "user_stopped",
        _ if code == Some(0) && prior != Some(AgentStatus::Error) => "completed",
        _ => "error",
    }
}

#[cfg(test)]
#[path = "broadcaster_tests.rs"]
mod tests;
