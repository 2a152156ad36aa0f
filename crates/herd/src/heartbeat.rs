// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic liveness sweep over connected clients.
//!
//! Every `interval` the sweeper closes clients that have not pinged within
//! `stale_after` (default 3× the interval). Closing cancels the client's
//! transport token; the connection task's own teardown drives removal.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::clients::ClientManager;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(90);

pub struct Heartbeat {
    manager: Arc<ClientManager>,
    interval: Duration,
    stale_after: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Heartbeat {
    pub fn new(manager: Arc<ClientManager>, interval: Duration, stale_after: Duration) -> Self {
        Self { manager, interval, stale_after, task: Mutex::new(None) }
    }

    /// Start the sweep timer. Repeated starts are no-ops.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let manager = Arc::clone(&self.manager);
        let interval = self.interval;
        let stale_after = self.stale_after;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick would sweep an empty registry.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let stale = manager.get_stale_clients(stale_after).await;
                for client in stale {
                    manager.disconnect_stale(&client).await;
                }
            }
        }));
    }

    /// Stop and clear the timer.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
