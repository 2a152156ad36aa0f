// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end specs.
//!
//! Wires the full application in-process (file-backed store, stub agent
//! binary, real TCP listener) and exercises it over HTTP routing internals
//! and a real WebSocket client.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use herd::config::Config;
use herd::heartbeat::Heartbeat;
use herd::run;
use herd::store::Store;
use herd::transport::{build_router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A fully wired server listening on a random local port.
pub struct SpecServer {
    pub state: Arc<AppState>,
    pub heartbeat: Heartbeat,
    pub addr: String,
    /// Git repository used as the workspace root; holds the stub binary.
    pub repo: TempDir,
    _data: TempDir,
}

impl SpecServer {
    pub fn repo_path(&self) -> String {
        self.repo.path().to_string_lossy().into_owned()
    }
}

impl Drop for SpecServer {
    fn drop(&mut self) {
        self.state.shutdown.cancel();
    }
}

/// Initialize a git repository with one commit.
pub fn init_repo(dir: &Path) -> anyhow::Result<()> {
    let run = |args: &[&str]| -> anyhow::Result<()> {
        let out = std::process::Command::new("git").arg("-C").arg(dir).args(args).output()?;
        anyhow::ensure!(
            out.status.success(),
            "git {args:?}: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        Ok(())
    };
    run(&["init", "-b", "main"])?;
    run(&["config", "user.email", "spec@example.com"])?;
    run(&["config", "user.name", "spec"])?;
    std::fs::write(dir.join("README.md"), "spec\n")?;
    run(&["add", "."])?;
    run(&["commit", "-m", "init"])?;
    Ok(())
}

/// Write an executable shell stub used in place of the agent binary.
pub fn write_stub(dir: &Path, body: &str) -> anyhow::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("agent-stub");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
    let mut perms = std::fs::metadata(&path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms)?;
    Ok(path)
}

/// Start a server with the given stub body and heartbeat settings.
pub async fn start_server(
    stub_body: &str,
    heartbeat_secs: Option<(u64, u64)>,
) -> anyhow::Result<SpecServer> {
    let repo = tempfile::tempdir()?;
    init_repo(repo.path())?;
    let stub = write_stub(repo.path(), stub_body)?;

    let data = tempfile::tempdir()?;
    let (interval, stale) = heartbeat_secs.unwrap_or((30, 90));
    let config = Config {
        host: "127.0.0.1".to_owned(),
        port: 0,
        data_dir: Some(data.path().to_path_buf()),
        agent_bin: stub.to_string_lossy().into_owned(),
        stop_grace: 5,
        heartbeat_interval: interval,
        stale_threshold: stale,
        log_format: "text".to_owned(),
        log_level: "warn".to_owned(),
    };

    let store = Store::open(&config.database_path())?;
    let app = run::prepare(&config, store);
    if heartbeat_secs.is_some() {
        app.heartbeat.start();
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    let router = build_router(Arc::clone(&app.state));
    let shutdown = app.shutdown.clone();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await;
    });

    Ok(SpecServer {
        state: app.state,
        heartbeat: app.heartbeat,
        addr,
        repo,
        _data: data,
    })
}

/// Open a WebSocket connection to the server.
pub async fn connect_ws(addr: &str) -> anyhow::Result<WsClient> {
    let (ws, _resp) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .context("ws connect")?;
    Ok(ws)
}

/// Send one JSON frame.
pub async fn send_json(ws: &mut WsClient, value: serde_json::Value) -> anyhow::Result<()> {
    ws.send(Message::text(value.to_string())).await.context("ws send")
}

/// Receive the next text frame as JSON, with a timeout.
pub async fn recv_json(ws: &mut WsClient) -> anyhow::Result<serde_json::Value> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .context("timed out waiting for frame")?
            .context("connection closed")??;
        match msg {
            Message::Text(text) => return Ok(serde_json::from_str(text.as_str())?),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => anyhow::bail!("unexpected frame: {other:?}"),
        }
    }
}

/// Skip frames until one of the given type arrives.
pub async fn recv_type(ws: &mut WsClient, kind: &str) -> anyhow::Result<serde_json::Value> {
    for _ in 0..50 {
        let frame = recv_json(ws).await?;
        if frame["type"] == kind {
            return Ok(frame);
        }
    }
    anyhow::bail!("never received a {kind} frame")
}
