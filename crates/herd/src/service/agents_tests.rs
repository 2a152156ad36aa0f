// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use super::{AgentService, CreateAgent, UpdateAgent};
use crate::broadcaster::Broadcaster;
use crate::clients::ClientManager;
use crate::error::ErrorCode;
use crate::model::{AgentMode, AgentStatus, MessageRole, Permission};
use crate::store::{NewWorktree, Store};
use crate::supervisor::Supervisor;

struct Ctx {
    _dir: TempDir,
    store: Arc<Store>,
    service: AgentService,
    supervisor: Arc<Supervisor>,
    workspace_id: String,
    worktree_id: String,
}

/// Service wired to an in-memory store and a stub agent binary that reads
/// stdin forever.
fn ctx() -> Ctx {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("agent-stub");
    std::fs::write(&bin, "#!/bin/sh\nexec cat\n").unwrap();
    let mut perms = std::fs::metadata(&bin).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&bin, perms).unwrap();

    let store = Arc::new(Store::open_in_memory().unwrap());
    let ws = store
        .workspaces()
        .create("demo", &dir.path().to_string_lossy())
        .unwrap();
    let wt = store
        .worktrees()
        .create(NewWorktree {
            workspace_id: ws.id.clone(),
            name: "main".to_owned(),
            branch: "main".to_owned(),
            path: dir.path().to_string_lossy().into_owned(),
            is_main: true,
        })
        .unwrap();
    store.workspaces().recalculate_counts(&ws.id).unwrap();

    let clients = Arc::new(ClientManager::new());
    let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&store), clients));
    let supervisor =
        Arc::new(Supervisor::new(bin.to_string_lossy(), Duration::from_secs(5)));
    let service = AgentService::new(
        Arc::clone(&store),
        Arc::clone(&supervisor),
        broadcaster,
    );

    Ctx {
        _dir: dir,
        store,
        service,
        supervisor,
        workspace_id: ws.id,
        worktree_id: wt.id,
    }
}

#[tokio::test]
async fn create_agent_defaults_and_counts() {
    let c = ctx();
    let agent = c
        .service
        .create_agent(&c.worktree_id, CreateAgent::default())
        .await
        .unwrap();
    assert_eq!(agent.status, AgentStatus::Waiting);
    assert_eq!(agent.mode, AgentMode::Regular);
    assert_eq!(agent.name, "Agent 1");

    let ws = c.store.workspaces().find_by_id(&c.workspace_id).unwrap();
    assert_eq!(ws.agent_count, 1);
}

#[tokio::test]
async fn create_agent_in_unknown_worktree_is_not_found() {
    let c = ctx();
    let err = c.service.create_agent("wt_missing", CreateAgent::default()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn update_agent_changes_mode_and_permissions() {
    let c = ctx();
    let agent = c.service.create_agent(&c.worktree_id, CreateAgent::default()).await.unwrap();
    let updated = c
        .service
        .update_agent(
            &agent.id,
            UpdateAgent {
                mode: Some(AgentMode::Auto),
                permissions: Some(BTreeSet::from([Permission::Read, Permission::Execute])),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.mode, AgentMode::Auto);
    assert!(updated.permissions.contains(&Permission::Execute));
}

#[tokio::test]
async fn fork_copies_mode_permissions_and_records_parent() {
    let c = ctx();
    let source = c
        .service
        .create_agent(
            &c.worktree_id,
            CreateAgent {
                mode: Some(AgentMode::Plan),
                permissions: Some(BTreeSet::from([Permission::Read, Permission::Write])),
                name: Some("origin".to_owned()),
            },
        )
        .await
        .unwrap();

    let fork = c.service.fork_agent(&source.id, None).await.unwrap();
    assert_eq!(fork.mode, AgentMode::Plan);
    assert_eq!(fork.permissions, source.permissions);
    assert_eq!(fork.parent_agent_id.as_deref(), Some(source.id.as_str()));
    assert_eq!(fork.name, "origin (fork)");

    let ws = c.store.workspaces().find_by_id(&c.workspace_id).unwrap();
    assert_eq!(ws.agent_count, 2);
}

#[tokio::test]
async fn delete_and_restore_maintain_counts() {
    let c = ctx();
    let agent = c.service.create_agent(&c.worktree_id, CreateAgent::default()).await.unwrap();

    c.service.delete_agent(&agent.id, true).await.unwrap();
    let ws = c.store.workspaces().find_by_id(&c.workspace_id).unwrap();
    assert_eq!(ws.agent_count, 0);

    let restored = c.service.restore_agent(&agent.id).await.unwrap();
    assert_eq!(restored.status, AgentStatus::Waiting);
    let ws = c.store.workspaces().find_by_id(&c.workspace_id).unwrap();
    assert_eq!(ws.agent_count, 1);
}

#[tokio::test]
async fn restore_of_live_agent_is_a_conflict() {
    let c = ctx();
    let agent = c.service.create_agent(&c.worktree_id, CreateAgent::default()).await.unwrap();
    let err = c.service.restore_agent(&agent.id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Conflict);
}

#[tokio::test]
async fn double_delete_decrements_once() {
    let c = ctx();
    let agent = c.service.create_agent(&c.worktree_id, CreateAgent::default()).await.unwrap();
    c.service.delete_agent(&agent.id, true).await.unwrap();
    c.service.delete_agent(&agent.id, true).await.unwrap();
    let ws = c.store.workspaces().find_by_id(&c.workspace_id).unwrap();
    assert_eq!(ws.agent_count, 0);
}

#[tokio::test]
async fn reorder_round_trip_and_mismatch() {
    let c = ctx();
    let a = c.service.create_agent(&c.worktree_id, CreateAgent::default()).await.unwrap();
    let b = c.service.create_agent(&c.worktree_id, CreateAgent::default()).await.unwrap();
    let d = c.service.create_agent(&c.worktree_id, CreateAgent::default()).await.unwrap();

    c.service
        .reorder_agents(&c.worktree_id, &[d.id.clone(), a.id.clone(), b.id.clone()])
        .await
        .unwrap();
    let listed = c.store.agents().find_by_worktree(&c.worktree_id, false).unwrap();
    let ids: Vec<_> = listed.iter().map(|x| x.id.as_str()).collect();
    assert_eq!(ids, vec![d.id.as_str(), a.id.as_str(), b.id.as_str()]);
    let orders: Vec<_> = listed.iter().map(|x| x.display_order).collect();
    assert_eq!(orders, vec![0, 1, 2]);

    // Missing one id: conflict, order unchanged.
    let err = c
        .service
        .reorder_agents(&c.worktree_id, &[a.id.clone(), b.id.clone()])
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Conflict);
    let after = c.store.agents().find_by_worktree(&c.worktree_id, false).unwrap();
    let ids: Vec<_> = after.iter().map(|x| x.id.as_str()).collect();
    assert_eq!(ids, vec![d.id.as_str(), a.id.as_str(), b.id.as_str()]);
}

#[tokio::test]
async fn start_sets_pid_and_duplicate_start_conflicts() {
    let c = ctx();
    let agent = c.service.create_agent(&c.worktree_id, CreateAgent::default()).await.unwrap();

    let started = c.service.start_agent(&agent.id, Some("hello".to_owned())).await.unwrap();
    assert_eq!(started.status, AgentStatus::Running);
    assert!(started.pid.is_some());
    assert!(started.started_at.is_some());

    let err = c.service.start_agent(&agent.id, None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Conflict);
    assert!(err.message.contains("already running"), "message: {}", err.message);

    c.supervisor.cleanup().await;
}

#[tokio::test]
async fn stop_is_idempotent_and_settles_row() {
    let c = ctx();
    let agent = c.service.create_agent(&c.worktree_id, CreateAgent::default()).await.unwrap();
    c.service.start_agent(&agent.id, None).await.unwrap();

    let stopped = c.service.stop_agent(&agent.id, true).await.unwrap();
    assert_eq!(stopped.status, AgentStatus::Finished);
    assert!(stopped.pid.is_none());
    assert!(stopped.stopped_at.is_some());

    // Second stop: no supervisor entry, still settles normally.
    let again = c.service.stop_agent(&agent.id, false).await.unwrap();
    assert_eq!(again.status, AgentStatus::Finished);
}

#[tokio::test]
async fn start_of_deleted_agent_is_a_conflict() {
    let c = ctx();
    let agent = c.service.create_agent(&c.worktree_id, CreateAgent::default()).await.unwrap();
    c.service.delete_agent(&agent.id, true).await.unwrap();
    let err = c.service.start_agent(&agent.id, None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Conflict);
}

#[tokio::test]
async fn resume_requires_a_session_id() {
    let c = ctx();
    let agent = c.service.create_agent(&c.worktree_id, CreateAgent::default()).await.unwrap();
    let err = c.service.resume_agent(&agent.id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Conflict);
    assert!(err.message.contains("session"), "message: {}", err.message);
}

#[tokio::test]
async fn resume_spawns_with_stored_session() {
    let c = ctx();
    let agent = c.service.create_agent(&c.worktree_id, CreateAgent::default()).await.unwrap();
    c.store
        .agents()
        .update(
            &agent.id,
            crate::store::AgentPatch {
                session_id: Some(Some("sess-1".to_owned())),
                ..Default::default()
            },
        )
        .unwrap();

    let resumed = c.service.resume_agent(&agent.id).await.unwrap();
    assert_eq!(resumed.status, AgentStatus::Running);
    assert!(resumed.pid.is_some());

    c.supervisor.cleanup().await;
}

#[tokio::test]
async fn send_message_queues_when_not_running() {
    let c = ctx();
    let agent = c.service.create_agent(&c.worktree_id, CreateAgent::default()).await.unwrap();

    let outcome = c.service.send_message_to_agent(&agent.id, "hello").await.unwrap();
    assert_eq!(outcome.status, "queued");
    assert!(!outcome.running);

    let page = c.service.list_messages(&agent.id, 10, None).unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].role, MessageRole::User);
    assert_eq!(page.messages[0].content, "hello");
}

#[tokio::test]
async fn send_message_delivers_when_running() {
    let c = ctx();
    let agent = c.service.create_agent(&c.worktree_id, CreateAgent::default()).await.unwrap();
    c.service.start_agent(&agent.id, None).await.unwrap();

    let outcome = c.service.send_message_to_agent(&agent.id, "ping").await.unwrap();
    assert_eq!(outcome.status, "sent");
    assert!(outcome.running);

    c.supervisor.cleanup().await;
}

#[tokio::test]
async fn runtime_status_pairs_row_with_live_record() {
    let c = ctx();
    let agent = c.service.create_agent(&c.worktree_id, CreateAgent::default()).await.unwrap();

    let (row, record) = c.service.runtime_status(&agent.id).await.unwrap();
    assert_eq!(row.status, AgentStatus::Waiting);
    assert!(record.is_none());

    c.service.start_agent(&agent.id, None).await.unwrap();
    let (row, record) = c.service.runtime_status(&agent.id).await.unwrap();
    assert_eq!(row.status, AgentStatus::Running);
    assert_eq!(record.map(|r| r.pid as i64), row.pid);

    c.supervisor.cleanup().await;
}
