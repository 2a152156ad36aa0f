// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Fleet manager for interactive CLI coding agents.
#[derive(Debug, Clone, Parser)]
#[command(name = "herd", version, about)]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, env = "HERD_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "HERD_PORT", default_value = "4810")]
    pub port: u16,

    /// Data directory for the embedded database (defaults to the user data
    /// dir).
    #[arg(long, env = "HERD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Agent executable to spawn.
    #[arg(long, env = "HERD_AGENT_BIN", default_value = "claude")]
    pub agent_bin: String,

    /// Grace window in seconds between SIGTERM and SIGKILL on stop.
    #[arg(long, env = "HERD_STOP_GRACE", default_value = "5")]
    pub stop_grace: u64,

    /// Heartbeat sweep interval in seconds.
    #[arg(long, env = "HERD_HEARTBEAT_INTERVAL", default_value = "30")]
    pub heartbeat_interval: u64,

    /// Client staleness threshold in seconds.
    #[arg(long, env = "HERD_STALE_THRESHOLD", default_value = "90")]
    pub stale_threshold: u64,

    /// Log format (json or text).
    #[arg(long, env = "HERD_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "HERD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.agent_bin.trim().is_empty() {
            anyhow::bail!("agent-bin must not be empty");
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("log-format must be json or text");
        }
        if self.heartbeat_interval == 0 {
            anyhow::bail!("heartbeat-interval must be positive");
        }
        if self.stale_threshold < self.heartbeat_interval {
            anyhow::bail!("stale-threshold must be at least the heartbeat interval");
        }
        Ok(())
    }

    /// Resolve the database file path.
    pub fn database_path(&self) -> PathBuf {
        let base = self
            .data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("herd")))
            .unwrap_or_else(|| PathBuf::from(".herd"));
        base.join("herd.db")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
