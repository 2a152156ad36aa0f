// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process registry of connected WebSocket observers.
//!
//! The manager owns each client's transport handle (an unbounded frame
//! queue drained by the connection task). Sends are fire-and-forget: a
//! client whose queue is gone counts as "not sent", never as an error.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::id::{self, IdPrefix};
use crate::transport::ws_msg::{to_frame, ServerMessage};

/// Why a client connection is being closed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    /// Missed too many pings; closed with a going-away code.
    Stale,
    /// Server shutting down.
    Shutdown,
}

/// One connected observer session.
pub struct ConnectedClient {
    pub id: String,
    pub connected_at: String,
    sender: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    close_cause: RwLock<Option<CloseCause>>,
    subscribed_agents: RwLock<HashSet<String>>,
    subscribed_workspaces: RwLock<HashSet<String>>,
    last_ping: RwLock<Instant>,
}

impl ConnectedClient {
    /// Queue one frame; returns whether the transport accepted it.
    pub fn send(&self, message: &ServerMessage) -> bool {
        self.sender.send(to_frame(message)).is_ok()
    }

    /// Token cancelled when the server decides to close this connection.
    pub fn closed(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn close_cause(&self) -> Option<CloseCause> {
        *self.close_cause.read().await
    }

    async fn close(&self, cause: CloseCause) {
        *self.close_cause.write().await = Some(cause);
        self.cancel.cancel();
    }

    pub async fn subscribed_to_agent(&self, agent_id: &str) -> bool {
        self.subscribed_agents.read().await.contains(agent_id)
    }

    pub async fn subscribed_to_workspace(&self, workspace_id: &str) -> bool {
        self.subscribed_workspaces.read().await.contains(workspace_id)
    }
}

/// Registry of connected clients with subscription-filtered fan-out.
pub struct ClientManager {
    clients: RwLock<HashMap<String, Arc<ConnectedClient>>>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self { clients: RwLock::new(HashMap::new()) }
    }

    /// Register a fresh client; returns the record and the frame queue the
    /// connection task must drain.
    pub async fn add_client(&self) -> (Arc<ConnectedClient>, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let client = Arc::new(ConnectedClient {
            id: id::generate(IdPrefix::Client),
            connected_at: id::now_iso(),
            sender,
            cancel: CancellationToken::new(),
            close_cause: RwLock::new(None),
            subscribed_agents: RwLock::new(HashSet::new()),
            subscribed_workspaces: RwLock::new(HashSet::new()),
            last_ping: RwLock::new(Instant::now()),
        });
        self.clients.write().await.insert(client.id.clone(), Arc::clone(&client));
        tracing::debug!(client_id = %client.id, "client connected");
        (client, receiver)
    }

    /// Drop a client record; subsequent sends to it are no-ops.
    pub async fn remove_client(&self, client_id: &str) {
        if self.clients.write().await.remove(client_id).is_some() {
            tracing::debug!(client_id = %client_id, "client removed");
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn subscribe_to_agent(&self, client_id: &str, agent_id: &str) {
        if let Some(client) = self.get(client_id).await {
            client.subscribed_agents.write().await.insert(agent_id.to_owned());
        }
    }

    pub async fn unsubscribe_from_agent(&self, client_id: &str, agent_id: &str) {
        if let Some(client) = self.get(client_id).await {
            client.subscribed_agents.write().await.remove(agent_id);
        }
    }

    pub async fn subscribe_to_workspace(&self, client_id: &str, workspace_id: &str) {
        if let Some(client) = self.get(client_id).await {
            client.subscribed_workspaces.write().await.insert(workspace_id.to_owned());
        }
    }

    pub async fn unsubscribe_from_workspace(&self, client_id: &str, workspace_id: &str) {
        if let Some(client) = self.get(client_id).await {
            client.subscribed_workspaces.write().await.remove(workspace_id);
        }
    }

    pub async fn update_ping(&self, client_id: &str) {
        if let Some(client) = self.get(client_id).await {
            *client.last_ping.write().await = Instant::now();
        }
    }

    /// Clients whose last ping is older than `max_age`.
    pub async fn get_stale_clients(&self, max_age: Duration) -> Vec<Arc<ConnectedClient>> {
        let clients = self.clients.read().await;
        let mut stale = Vec::new();
        for client in clients.values() {
            if client.last_ping.read().await.elapsed() > max_age {
                stale.push(Arc::clone(client));
            }
        }
        stale
    }

    /// Close a stale client's transport; its connection task drives the
    /// actual removal.
    pub async fn disconnect_stale(&self, client: &ConnectedClient) {
        tracing::info!(client_id = %client.id, "disconnecting stale client");
        client.close(CloseCause::Stale).await;
    }

    /// Send to every client; returns the number of successful sends.
    pub async fn broadcast(&self, message: &ServerMessage) -> usize {
        let clients = self.clients.read().await;
        clients.values().filter(|c| c.send(message)).count()
    }

    /// Send to clients subscribed to the given agent.
    pub async fn broadcast_to_agent_subscribers(
        &self,
        agent_id: &str,
        message: &ServerMessage,
    ) -> usize {
        let clients = self.clients.read().await;
        let mut sent = 0;
        for client in clients.values() {
            if client.subscribed_to_agent(agent_id).await && client.send(message) {
                sent += 1;
            }
        }
        sent
    }

    /// Send to clients subscribed to the given workspace.
    pub async fn broadcast_to_workspace_subscribers(
        &self,
        workspace_id: &str,
        message: &ServerMessage,
    ) -> usize {
        let clients = self.clients.read().await;
        let mut sent = 0;
        for client in clients.values() {
            if client.subscribed_to_workspace(workspace_id).await && client.send(message) {
                sent += 1;
            }
        }
        sent
    }

    /// Close every transport with the shutdown cause and empty the registry.
    pub async fn cleanup(&self) {
        let mut clients = self.clients.write().await;
        for (_, client) in clients.drain() {
            client.close(CloseCause::Shutdown).await;
        }
    }

    async fn get(&self, client_id: &str) -> Option<Arc<ConnectedClient>> {
        self.clients.read().await.get(client_id).cloned()
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "clients_tests.rs"]
mod tests;
