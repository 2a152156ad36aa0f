// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end specs over a live server: real TCP, real WebSocket client,
//! real child processes behind the supervisor.

use std::time::Duration;

use herd::model::{AgentStatus, MessageRole};
use herd::service::CreateAgent;
use herd_specs::{connect_ws, recv_json, recv_type, send_json, start_server};

/// Register the repo as a workspace and create one agent; returns
/// (workspace_id, agent_id).
async fn seed_agent(server: &herd_specs::SpecServer) -> (String, String) {
    let services = &server.state.services;
    let workspace = services.workspaces.register(&server.repo_path()).await.unwrap();
    let worktrees = services.workspaces.worktrees(&workspace.id).unwrap();
    let agent = services
        .agents
        .create_agent(&worktrees[0].id, CreateAgent::default())
        .await
        .unwrap();
    (workspace.id, agent.id)
}

#[tokio::test]
async fn subscribe_start_and_observe_lifecycle() {
    let server = start_server("printf 'hi\\n'", None).await.unwrap();
    let (_ws_id, agent_id) = seed_agent(&server).await;

    let mut ws = connect_ws(&server.addr).await.unwrap();
    send_json(
        &mut ws,
        serde_json::json!({"type": "subscribe:agent", "payload": {"agentId": agent_id}}),
    )
    .await
    .unwrap();

    // Ack precedes any event published after it.
    let ack = recv_json(&mut ws).await.unwrap();
    assert_eq!(ack["type"], "subscribed");
    assert_eq!(ack["payload"]["id"], agent_id.as_str());

    server.state.services.agents.start_agent(&agent_id, None).await.unwrap();

    // Gather everything up to the terminal frame. The start transition is
    // published concurrently with the child's first output, so only the
    // output/flush/terminated order is fixed.
    let mut frames = Vec::new();
    loop {
        let frame = recv_json(&mut ws).await.unwrap();
        let done = frame["type"] == "agent:terminated";
        frames.push(frame);
        if done {
            break;
        }
    }

    let status = frames
        .iter()
        .find(|f| f["type"] == "agent:status")
        .expect("missing status frame");
    assert_eq!(status["payload"]["status"], "running");
    assert_eq!(status["payload"]["previous"], "waiting");

    let output_pos = frames
        .iter()
        .position(|f| {
            f["type"] == "agent:output" && f["payload"]["isStreaming"] == true
        })
        .expect("missing streamed output");
    assert_eq!(frames[output_pos]["payload"]["content"], "hi\n");

    let flush_pos = frames
        .iter()
        .position(|f| {
            f["type"] == "agent:output" && f["payload"]["isStreaming"] == false
        })
        .expect("missing end-of-stream flush");
    assert_eq!(frames[flush_pos]["payload"]["content"], "");
    assert!(output_pos < flush_pos);

    let terminated = frames.last().unwrap();
    assert_eq!(terminated["payload"]["exitCode"], 0);
    assert_eq!(terminated["payload"]["reason"], "completed");

    // Durable fallout: assistant message persisted, row settled.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let page = server.state.store.messages().list(&agent_id, 10, None).unwrap();
        if let Some(message) = page.messages.first() {
            assert_eq!(message.role, MessageRole::Assistant);
            assert_eq!(message.content, "hi\n");
            assert!(message.is_complete);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "assistant message never persisted");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let row = server.state.store.agents().find_by_id(&agent_id).unwrap();
    assert_eq!(row.status, AgentStatus::Finished);
    assert!(row.pid.is_none());
}

#[tokio::test]
async fn ping_pong_and_frame_validation() {
    let server = start_server("exec cat", None).await.unwrap();
    let mut ws = connect_ws(&server.addr).await.unwrap();

    send_json(&mut ws, serde_json::json!({"type": "ping"})).await.unwrap();
    let pong = recv_json(&mut ws).await.unwrap();
    assert_eq!(pong["type"], "pong");
    assert!(pong["payload"]["timestamp"].is_string());
    assert!(pong["timestamp"].is_string());

    // Not JSON at all.
    use futures_util::SinkExt;
    use tokio_tungstenite::tungstenite::Message;
    ws.send(Message::text("{nope")).await.unwrap();
    let err = recv_json(&mut ws).await.unwrap();
    assert_eq!(err["type"], "error");
    assert_eq!(err["payload"]["code"], "INVALID_JSON");

    // Unknown type.
    send_json(&mut ws, serde_json::json!({"type": "subscribe:everything"})).await.unwrap();
    let err = recv_json(&mut ws).await.unwrap();
    assert_eq!(err["payload"]["code"], "UNKNOWN_MESSAGE_TYPE");

    // Known type, malformed payload.
    send_json(&mut ws, serde_json::json!({"type": "subscribe:agent", "payload": {}}))
        .await
        .unwrap();
    let err = recv_json(&mut ws).await.unwrap();
    assert_eq!(err["payload"]["code"], "INVALID_MESSAGE");

    // Known type, malformed id.
    send_json(
        &mut ws,
        serde_json::json!({"type": "subscribe:agent", "payload": {"agentId": "bogus"}}),
    )
    .await
    .unwrap();
    let err = recv_json(&mut ws).await.unwrap();
    assert_eq!(err["payload"]["code"], "INVALID_MESSAGE");
}

#[tokio::test]
async fn events_are_not_delivered_to_unsubscribed_clients() {
    let server = start_server("printf 'hi\\n'", None).await.unwrap();
    let (_ws_id, agent_id) = seed_agent(&server).await;

    let mut subscriber = connect_ws(&server.addr).await.unwrap();
    let mut bystander = connect_ws(&server.addr).await.unwrap();

    send_json(
        &mut subscriber,
        serde_json::json!({"type": "subscribe:agent", "payload": {"agentId": agent_id}}),
    )
    .await
    .unwrap();
    recv_type(&mut subscriber, "subscribed").await.unwrap();

    server.state.services.agents.start_agent(&agent_id, None).await.unwrap();
    recv_type(&mut subscriber, "agent:terminated").await.unwrap();

    // The bystander sees no agent-scoped frames; a ping round-trip drains
    // its queue (global frames like usage:updated are fine).
    send_json(&mut bystander, serde_json::json!({"type": "ping"})).await.unwrap();
    loop {
        let frame = recv_json(&mut bystander).await.unwrap();
        let kind = frame["type"].as_str().unwrap_or("").to_owned();
        assert!(
            !kind.starts_with("agent:"),
            "bystander received an agent event: {frame}"
        );
        if kind == "pong" {
            break;
        }
    }
}

#[tokio::test]
async fn workspace_subscribers_see_mutations() {
    let server = start_server("exec cat", None).await.unwrap();
    let services = &server.state.services;
    let workspace = services.workspaces.register(&server.repo_path()).await.unwrap();
    let worktrees = services.workspaces.worktrees(&workspace.id).unwrap();

    let mut ws = connect_ws(&server.addr).await.unwrap();
    send_json(
        &mut ws,
        serde_json::json!({"type": "subscribe:workspace", "payload": {"workspaceId": workspace.id}}),
    )
    .await
    .unwrap();
    recv_type(&mut ws, "subscribed").await.unwrap();

    let agent = services
        .agents
        .create_agent(&worktrees[0].id, CreateAgent::default())
        .await
        .unwrap();

    let update = recv_type(&mut ws, "workspace:updated").await.unwrap();
    assert_eq!(update["payload"]["change"], "agent_added");
    assert_eq!(update["payload"]["data"]["id"], agent.id.as_str());

    services.agents.delete_agent(&agent.id, true).await.unwrap();
    let update = recv_type(&mut ws, "workspace:updated").await.unwrap();
    assert_eq!(update["payload"]["change"], "agent_removed");
}

#[tokio::test]
async fn stale_clients_are_disconnected_by_the_heartbeat() {
    let server = start_server("exec cat", Some((1, 1))).await.unwrap();
    let mut ws = connect_ws(&server.addr).await.unwrap();

    // Never ping; the sweep closes the transport within interval + stale.
    use futures_util::StreamExt;
    use tokio_tungstenite::tungstenite::Message;
    let deadline = Duration::from_secs(5);
    let closed = tokio::time::timeout(deadline, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return None,
            }
        }
    })
    .await
    .expect("client was not disconnected in time");

    if let Some(frame) = closed {
        assert_eq!(u16::from(frame.code), 1001, "expected going-away close");
    }

    // Removal races the close frame slightly; poll briefly.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while server.state.clients.client_count().await > 0 {
        assert!(tokio::time::Instant::now() < deadline, "client registry never drained");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn user_stop_terminates_with_user_stopped() {
    let server = start_server("exec sleep 60", None).await.unwrap();
    let (_ws_id, agent_id) = seed_agent(&server).await;

    let mut ws = connect_ws(&server.addr).await.unwrap();
    send_json(
        &mut ws,
        serde_json::json!({"type": "subscribe:agent", "payload": {"agentId": agent_id}}),
    )
    .await
    .unwrap();
    recv_type(&mut ws, "subscribed").await.unwrap();

    server.state.services.agents.start_agent(&agent_id, None).await.unwrap();
    recv_type(&mut ws, "agent:status").await.unwrap();

    server.state.services.agents.stop_agent(&agent_id, false).await.unwrap();

    let terminated = recv_type(&mut ws, "agent:terminated").await.unwrap();
    assert_eq!(terminated["payload"]["signal"], "SIGTERM");
    assert!(terminated["payload"]["exitCode"].is_null());
    assert_eq!(terminated["payload"]["reason"], "user_stopped");

    let row = server.state.store.agents().find_by_id(&agent_id).unwrap();
    assert!(row.pid.is_none());
}
