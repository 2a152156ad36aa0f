// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level composition: store, supervisor, broadcaster, clients, and the
//! HTTP/WS server. Shared by `main` and the end-to-end specs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::broadcaster::Broadcaster;
use crate::clients::ClientManager;
use crate::config::Config;
use crate::heartbeat::Heartbeat;
use crate::store::Store;
use crate::supervisor::Supervisor;
use crate::transport::{build_router, AppState};

/// A fully wired application, ready to serve.
pub struct PreparedApp {
    pub state: Arc<AppState>,
    pub heartbeat: Heartbeat,
    pub shutdown: CancellationToken,
}

/// Wire every component together without binding a socket. The end-to-end
/// specs drive the returned state directly.
pub fn prepare(config: &Config, store: Store) -> PreparedApp {
    let shutdown = CancellationToken::new();
    let store = Arc::new(store);

    // Crash recovery: rows still claiming a pid belong to a previous
    // process incarnation.
    match store.agents().clear_pid_for_running_agents() {
        Ok(0) => {}
        Ok(recovered) => info!(recovered, "recovered agents from stale pids"),
        Err(e) => error!(error = %e, "pid recovery failed"),
    }

    let supervisor = Arc::new(Supervisor::new(
        config.agent_bin.clone(),
        Duration::from_secs(config.stop_grace),
    ));
    let clients = Arc::new(ClientManager::new());
    let broadcaster =
        Arc::new(Broadcaster::new(Arc::clone(&store), Arc::clone(&clients)));
    broadcaster.spawn_pump(supervisor.subscribe(), shutdown.clone());

    let heartbeat = Heartbeat::new(
        Arc::clone(&clients),
        Duration::from_secs(config.heartbeat_interval),
        Duration::from_secs(config.stale_threshold),
    );

    let state = Arc::new(AppState::new(
        store,
        supervisor,
        clients,
        broadcaster,
        shutdown.clone(),
    ));
    PreparedApp { state, heartbeat, shutdown }
}

/// Run the daemon to completion: serve until a shutdown signal, then tear
/// everything down.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);

    let db_path = config.database_path();
    let store = Store::open(&db_path)
        .with_context(|| format!("open database at {}", db_path.display()))?;
    info!(path = %db_path.display(), "database ready");

    let app = prepare(&config, store);
    app.heartbeat.start();

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("bind {addr}"))?;
    info!(addr = %addr, "listening");

    spawn_signal_handler(app.shutdown.clone());

    let router = build_router(Arc::clone(&app.state));
    axum::serve(listener, router)
        .with_graceful_shutdown(app.shutdown.clone().cancelled_owned())
        .await
        .context("server error")?;

    // Teardown: children first, then observers.
    info!("shutting down");
    app.heartbeat.stop();
    app.state.supervisor.stop_all(true).await;
    app.state.supervisor.cleanup().await;
    app.state.clients.cleanup().await;
    Ok(())
}

/// Cancel the shutdown token on SIGTERM or SIGINT.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "ctrl-c handler failed");
                }
                info!("received SIGINT");
            }
        }
        shutdown.cancel();
    });
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.log_format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    // A second init (tests) is fine; keep the first subscriber.
    let _ = result;
}
