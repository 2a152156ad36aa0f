// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::Heartbeat;
use crate::clients::{ClientManager, CloseCause};

#[tokio::test]
async fn stale_client_is_closed_within_an_interval() {
    let manager = Arc::new(ClientManager::new());
    let (client, _rx) = manager.add_client().await;
    let token = client.closed();

    let heartbeat = Heartbeat::new(
        Arc::clone(&manager),
        Duration::from_millis(20),
        Duration::from_millis(40),
    );
    heartbeat.start();

    timeout(Duration::from_secs(2), token.cancelled())
        .await
        .expect("stale client was not closed in time");
    assert_eq!(client.close_cause().await, Some(CloseCause::Stale));
}

#[tokio::test]
async fn pinging_client_stays_connected() {
    let manager = Arc::new(ClientManager::new());
    let (client, _rx) = manager.add_client().await;
    let token = client.closed();

    let heartbeat = Heartbeat::new(
        Arc::clone(&manager),
        Duration::from_millis(20),
        Duration::from_millis(60),
    );
    heartbeat.start();

    for _ in 0..10 {
        manager.update_ping(&client.id).await;
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
    assert!(!token.is_cancelled());
}

#[tokio::test]
async fn start_is_idempotent_and_stop_clears() {
    let manager = Arc::new(ClientManager::new());
    let heartbeat =
        Heartbeat::new(manager, Duration::from_millis(20), Duration::from_millis(60));

    heartbeat.start();
    heartbeat.start();
    assert!(heartbeat.is_running());

    heartbeat.stop();
    assert!(!heartbeat.is_running());

    heartbeat.start();
    assert!(heartbeat.is_running());
    heartbeat.stop();
}
