// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared state threaded through every transport handler.
//!
//! Constructed once at startup; a fresh instance per test gives full
//! isolation (no globals).

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::broadcaster::Broadcaster;
use crate::clients::ClientManager;
use crate::service::Services;
use crate::store::Store;
use crate::supervisor::Supervisor;

pub struct AppState {
    pub store: Arc<Store>,
    pub supervisor: Arc<Supervisor>,
    pub clients: Arc<ClientManager>,
    pub broadcaster: Arc<Broadcaster>,
    pub services: Services,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        supervisor: Arc<Supervisor>,
        clients: Arc<ClientManager>,
        broadcaster: Arc<Broadcaster>,
        shutdown: CancellationToken,
    ) -> Self {
        let services = Services::new(
            Arc::clone(&store),
            Arc::clone(&supervisor),
            Arc::clone(&broadcaster),
        );
        Self {
            store,
            supervisor,
            clients,
            broadcaster,
            services,
            shutdown,
            started_at: Instant::now(),
        }
    }
}
