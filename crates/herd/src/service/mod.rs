// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration services composing the store, supervisor, and broadcaster.

mod agents;
mod workspaces;
mod worktrees;

pub use agents::{AgentService, CreateAgent, SendOutcome, UpdateAgent};
pub use workspaces::WorkspaceService;
pub use worktrees::{CreateWorktree, WorktreeService};

use std::sync::Arc;

use crate::broadcaster::Broadcaster;
use crate::store::Store;
use crate::supervisor::Supervisor;

/// All services, constructed once at startup and shared by the transports.
pub struct Services {
    pub agents: AgentService,
    pub workspaces: WorkspaceService,
    pub worktrees: WorktreeService,
}

impl Services {
    pub fn new(
        store: Arc<Store>,
        supervisor: Arc<Supervisor>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            agents: AgentService::new(
                Arc::clone(&store),
                Arc::clone(&supervisor),
                Arc::clone(&broadcaster),
            ),
            workspaces: WorkspaceService::new(
                Arc::clone(&store),
                Arc::clone(&supervisor),
                Arc::clone(&broadcaster),
            ),
            worktrees: WorktreeService::new(store, supervisor, broadcaster),
        }
    }
}
