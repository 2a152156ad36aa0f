// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::{ClientManager, CloseCause};
use crate::transport::ws_msg::ServerMessage;

fn pong() -> ServerMessage {
    ServerMessage::Pong { timestamp: "2026-01-01T00:00:00.000Z".to_owned() }
}

#[tokio::test]
async fn add_and_remove_client() {
    let manager = ClientManager::new();
    let (client, _rx) = manager.add_client().await;
    assert!(client.id.starts_with("cl_"));
    assert_eq!(manager.client_count().await, 1);

    manager.remove_client(&client.id).await;
    assert_eq!(manager.client_count().await, 0);
}

#[tokio::test]
async fn broadcast_counts_successful_sends() {
    let manager = ClientManager::new();
    let (_a, mut rx_a) = manager.add_client().await;
    let (_b, _rx_b) = manager.add_client().await;

    assert_eq!(manager.broadcast(&pong()).await, 2);
    assert!(rx_a.recv().await.is_some());
}

#[tokio::test]
async fn dropped_transport_counts_as_not_sent() {
    let manager = ClientManager::new();
    let (_a, rx_a) = manager.add_client().await;
    drop(rx_a);
    assert_eq!(manager.broadcast(&pong()).await, 0);
}

#[tokio::test]
async fn agent_fanout_respects_subscriptions() {
    let manager = ClientManager::new();
    let (subscriber, mut sub_rx) = manager.add_client().await;
    let (_other, mut other_rx) = manager.add_client().await;

    manager.subscribe_to_agent(&subscriber.id, "ag_1").await;

    let sent = manager.broadcast_to_agent_subscribers("ag_1", &pong()).await;
    assert_eq!(sent, 1);
    assert!(sub_rx.recv().await.is_some());
    assert!(other_rx.try_recv().is_err());

    manager.unsubscribe_from_agent(&subscriber.id, "ag_1").await;
    assert_eq!(manager.broadcast_to_agent_subscribers("ag_1", &pong()).await, 0);
}

#[tokio::test]
async fn workspace_fanout_respects_subscriptions() {
    let manager = ClientManager::new();
    let (subscriber, mut sub_rx) = manager.add_client().await;
    manager.subscribe_to_workspace(&subscriber.id, "ws_1").await;

    assert_eq!(manager.broadcast_to_workspace_subscribers("ws_1", &pong()).await, 1);
    assert_eq!(manager.broadcast_to_workspace_subscribers("ws_2", &pong()).await, 0);
    assert!(sub_rx.recv().await.is_some());
}

#[tokio::test]
async fn stale_detection_tracks_pings() {
    let manager = ClientManager::new();
    let (client, _rx) = manager.add_client().await;

    assert!(manager.get_stale_clients(Duration::from_secs(60)).await.is_empty());

    tokio::time::sleep(Duration::from_millis(30)).await;
    let stale = manager.get_stale_clients(Duration::from_millis(10)).await;
    assert_eq!(stale.len(), 1);

    manager.update_ping(&client.id).await;
    assert!(manager.get_stale_clients(Duration::from_millis(10)).await.is_empty());
}

#[tokio::test]
async fn disconnect_stale_cancels_with_cause() {
    let manager = ClientManager::new();
    let (client, _rx) = manager.add_client().await;
    let token = client.closed();
    assert!(!token.is_cancelled());

    manager.disconnect_stale(&client).await;
    assert!(token.is_cancelled());
    assert_eq!(client.close_cause().await, Some(CloseCause::Stale));
}

#[tokio::test]
async fn cleanup_closes_everyone_with_shutdown_cause() {
    let manager = ClientManager::new();
    let (a, _rx_a) = manager.add_client().await;
    let (b, _rx_b) = manager.add_client().await;

    manager.cleanup().await;
    assert_eq!(manager.client_count().await, 0);
    assert_eq!(a.close_cause().await, Some(CloseCause::Shutdown));
    assert_eq!(b.close_cause().await, Some(CloseCause::Shutdown));
}

#[tokio::test]
async fn sends_after_removal_are_noops() {
    let manager = ClientManager::new();
    let (client, _rx) = manager.add_client().await;
    manager.remove_client(&client.id).await;

    // Direct handle still works (queue alive), registry fan-out skips it.
    assert_eq!(manager.broadcast(&pong()).await, 0);
    manager.subscribe_to_agent(&client.id, "ag_1").await;
    assert_eq!(manager.broadcast_to_agent_subscribers("ag_1", &pong()).await, 0);
}
