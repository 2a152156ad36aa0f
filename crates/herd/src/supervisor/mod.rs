// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child process supervisor.
//!
//! Owns the OS lifecycle of every agent child: spawn, stdin writes, signal
//! delivery, and reaping. Emits a typed [`SupervisorEvent`] stream consumed
//! by the broadcaster. Each tracked agent has exactly one entry; every path
//! that removes the entry also clears its output buffer and cancels pending
//! grace timers, and a successful spawn produces exactly one `Exit`.

mod command;
mod events;

pub use command::{build_args, child_env};
pub use events::SupervisorEvent;

use std::collections::{BTreeSet, HashMap};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, Result};
use crate::id;
use crate::model::{AgentMode, AgentStatus, Permission};
use crate::parser::{Parser, Recognition, StreamSide};

/// Everything needed to spawn one agent child.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub agent_id: String,
    pub working_dir: PathBuf,
    pub mode: AgentMode,
    pub permissions: BTreeSet<Permission>,
    pub initial_prompt: Option<String>,
    pub session_id: Option<String>,
}

/// Snapshot of a live supervisor entry.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub agent_id: String,
    pub pid: u32,
    pub started_at: String,
    pub status: AgentStatus,
}

/// In-memory record tying an agent id to its live child.
struct AgentEntry {
    agent_id: String,
    pid: u32,
    started_at: String,
    status: RwLock<AgentStatus>,
    stdin: Mutex<Option<ChildStdin>>,
    /// Accumulated stdout since spawn; decides whether the end-of-stream
    /// flush frame is emitted.
    buffer: Mutex<String>,
    /// Cancelled when the entry is removed; stops pending grace timers.
    cancel: CancellationToken,
}

type EntryMap = Arc<RwLock<HashMap<String, Arc<AgentEntry>>>>;

pub struct Supervisor {
    agent_bin: String,
    stop_grace: Duration,
    entries: EntryMap,
    event_tx: broadcast::Sender<SupervisorEvent>,
    parser: Arc<Parser>,
}

impl Supervisor {
    pub fn new(agent_bin: impl Into<String>, stop_grace: Duration) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            agent_bin: agent_bin.into(),
            stop_grace,
            entries: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            parser: Arc::new(Parser::new()),
        }
    }

    /// Subscribe to the supervisor's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.event_tx.subscribe()
    }

    /// Spawn a child for the agent and start tracking it.
    ///
    /// Fails with a conflict if the agent is already tracked and with a
    /// process error if the OS refuses the spawn or reports no pid.
    pub async fn spawn_agent(&self, request: SpawnRequest) -> Result<ProcessRecord> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&request.agent_id) {
            return Err(ApiError::conflict(format!(
                "agent {} is already running",
                request.agent_id
            )));
        }

        let args = command::build_args(
            request.mode,
            &request.permissions,
            request.session_id.as_deref(),
            request.initial_prompt.as_deref(),
        );

        let mut child = Command::new(&self.agent_bin)
            .args(&args)
            .current_dir(&request.working_dir)
            .envs(command::child_env())
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ApiError::process(format!(
                    "agent executable not found: {}",
                    self.agent_bin
                )),
                _ => ApiError::process(format!("spawn failed: {e}")),
            })?;

        let Some(pid) = child.id() else {
            return Err(ApiError::process("spawn reported no pid"));
        };

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let entry = Arc::new(AgentEntry {
            agent_id: request.agent_id.clone(),
            pid,
            started_at: id::now_iso(),
            status: RwLock::new(AgentStatus::Running),
            stdin: Mutex::new(stdin),
            buffer: Mutex::new(String::new()),
            cancel: CancellationToken::new(),
        });
        entries.insert(request.agent_id.clone(), Arc::clone(&entry));
        drop(entries);

        self.attach_listeners(entry.clone(), child, stdout, stderr);

        tracing::info!(agent_id = %request.agent_id, pid, "spawned agent child");
        Ok(ProcessRecord {
            agent_id: request.agent_id,
            pid,
            started_at: entry.started_at.clone(),
            status: AgentStatus::Running,
        })
    }

    /// Start the stdout/stderr readers and the reaper for a fresh entry.
    fn attach_listeners(
        &self,
        entry: Arc<AgentEntry>,
        mut child: Child,
        stdout: Option<tokio::process::ChildStdout>,
        stderr: Option<tokio::process::ChildStderr>,
    ) {
        let stdout_task = {
            let entry = Arc::clone(&entry);
            let tx = self.event_tx.clone();
            let parser = Arc::clone(&self.parser);
            tokio::spawn(async move {
                let Some(mut stdout) = stdout else { return };
                let mut buf = vec![0u8; 8192];
                loop {
                    match stdout.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => {
                            let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                            entry.buffer.lock().await.push_str(&text);
                            let _ = tx.send(SupervisorEvent::Output {
                                agent_id: entry.agent_id.clone(),
                                text: text.clone(),
                                streaming: true,
                            });
                            apply_recognitions(
                                &entry,
                                &tx,
                                parser.parse_chunk(StreamSide::Stdout, &text),
                            )
                            .await;
                        }
                        Err(e) => {
                            let _ = tx.send(SupervisorEvent::ProcessError {
                                agent_id: entry.agent_id.clone(),
                                message: format!("stdout read failed: {e}"),
                            });
                            set_status(&entry, &tx, AgentStatus::Error).await;
                            break;
                        }
                    }
                }
            })
        };

        let stderr_task = {
            let entry = Arc::clone(&entry);
            let tx = self.event_tx.clone();
            let parser = Arc::clone(&self.parser);
            tokio::spawn(async move {
                let Some(mut stderr) = stderr else { return };
                let mut buf = vec![0u8; 8192];
                loop {
                    match stderr.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => {
                            let text = String::from_utf8_lossy(&buf[..n]);
                            apply_recognitions(
                                &entry,
                                &tx,
                                parser.parse_chunk(StreamSide::Stderr, &text),
                            )
                            .await;
                        }
                        Err(e) => {
                            let _ = tx.send(SupervisorEvent::ProcessError {
                                agent_id: entry.agent_id.clone(),
                                message: format!("stderr read failed: {e}"),
                            });
                            set_status(&entry, &tx, AgentStatus::Error).await;
                            break;
                        }
                    }
                }
            })
        };

        // Reaper: wait for both streams to drain, reap the child, flush the
        // output stream, drop the entry, then emit the terminal Exit.
        let entries = Arc::clone(&self.entries);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let _ = stdout_task.await;
            let _ = stderr_task.await;

            let wait_result = child.wait().await;

            let buffered = {
                let mut buffer = entry.buffer.lock().await;
                std::mem::take(&mut *buffer)
            };
            if !buffered.is_empty() {
                let _ = tx.send(SupervisorEvent::Output {
                    agent_id: entry.agent_id.clone(),
                    text: String::new(),
                    streaming: false,
                });
            }

            entries.write().await.remove(&entry.agent_id);
            entry.cancel.cancel();
            entry.stdin.lock().await.take();

            let (code, signal) = match wait_result {
                Ok(status) => (status.code(), status.signal().map(signal_name)),
                Err(e) => {
                    let _ = tx.send(SupervisorEvent::ProcessError {
                        agent_id: entry.agent_id.clone(),
                        message: format!("wait failed: {e}"),
                    });
                    (None, None)
                }
            };
            tracing::info!(agent_id = %entry.agent_id, ?code, ?signal, "agent child exited");
            let _ = tx.send(SupervisorEvent::Exit {
                agent_id: entry.agent_id.clone(),
                code,
                signal,
            });
        });
    }

    /// Queue `content + "\n"` to the child's stdin and mark it running.
    pub async fn send_message(&self, agent_id: &str, content: &str) -> Result<()> {
        let entry = self
            .entry(agent_id)
            .await
            .ok_or_else(|| ApiError::not_found(format!("agent {agent_id} is not running")))?;

        let mut stdin = entry.stdin.lock().await;
        let Some(writer) = stdin.as_mut() else {
            return Err(ApiError::process(format!("agent {agent_id} stdin is closed")));
        };
        let write = async {
            writer.write_all(content.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        write.await.map_err(|e| ApiError::process(format!("stdin write failed: {e}")))?;
        drop(stdin);

        set_status(&entry, &self.event_tx, AgentStatus::Running).await;
        Ok(())
    }

    /// Stop a tracked agent. No-op when the agent is not tracked.
    ///
    /// Without `force`: close stdin, deliver SIGTERM, and escalate to
    /// SIGKILL after the grace window if the entry still exists.
    pub async fn stop_agent(&self, agent_id: &str, force: bool) -> Result<()> {
        let Some(entry) = self.entry(agent_id).await else {
            return Ok(());
        };

        if force {
            deliver_signal(entry.pid, Signal::SIGKILL);
            return Ok(());
        }

        entry.stdin.lock().await.take();
        deliver_signal(entry.pid, Signal::SIGTERM);

        let entries = Arc::clone(&self.entries);
        let agent_id = agent_id.to_owned();
        let pid = entry.pid;
        let cancel = entry.cancel.clone();
        let grace = self.stop_grace;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(grace) => {
                    if entries.read().await.contains_key(&agent_id) {
                        tracing::warn!(agent_id = %agent_id, "grace window elapsed, killing");
                        deliver_signal(pid, Signal::SIGKILL);
                    }
                }
            }
        });
        Ok(())
    }

    /// Stop every tracked agent concurrently.
    pub async fn stop_all(&self, force: bool) {
        let ids: Vec<String> = self.entries.read().await.keys().cloned().collect();
        let stops = ids.iter().map(|agent_id| self.stop_agent(agent_id, force));
        for result in futures_util::future::join_all(stops).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "stop_agent failed during stop_all");
            }
        }
    }

    pub async fn is_running(&self, agent_id: &str) -> bool {
        self.entries.read().await.contains_key(agent_id)
    }

    pub async fn get_status(&self, agent_id: &str) -> Option<AgentStatus> {
        let entry = self.entry(agent_id).await?;
        let status = *entry.status.read().await;
        Some(status)
    }

    pub async fn get_process(&self, agent_id: &str) -> Option<ProcessRecord> {
        let entry = self.entry(agent_id).await?;
        let status = *entry.status.read().await;
        Some(ProcessRecord {
            agent_id: entry.agent_id.clone(),
            pid: entry.pid,
            started_at: entry.started_at.clone(),
            status,
        })
    }

    pub async fn get_running_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Forced teardown: kill every child and drop all entries immediately.
    pub async fn cleanup(&self) {
        let mut entries = self.entries.write().await;
        for (agent_id, entry) in entries.drain() {
            tracing::debug!(agent_id = %agent_id, "cleanup: killing child");
            entry.cancel.cancel();
            entry.buffer.lock().await.clear();
            deliver_signal(entry.pid, Signal::SIGKILL);
        }
    }

    async fn entry(&self, agent_id: &str) -> Option<Arc<AgentEntry>> {
        self.entries.read().await.get(agent_id).cloned()
    }
}

/// Update the tracked status, emitting `Status` only on an actual change.
async fn set_status(
    entry: &Arc<AgentEntry>,
    tx: &broadcast::Sender<SupervisorEvent>,
    status: AgentStatus,
) {
    let mut tracked = entry.status.write().await;
    if *tracked == status {
        return;
    }
    *tracked = status;
    drop(tracked);
    let _ = tx.send(SupervisorEvent::Status { agent_id: entry.agent_id.clone(), status });
}

/// Apply parser recognitions in order.
async fn apply_recognitions(
    entry: &Arc<AgentEntry>,
    tx: &broadcast::Sender<SupervisorEvent>,
    recognitions: Vec<Recognition>,
) {
    for recognition in recognitions {
        match recognition {
            Recognition::Status(status) => set_status(entry, tx, status).await,
            Recognition::Context(level) => {
                let _ = tx.send(SupervisorEvent::Context {
                    agent_id: entry.agent_id.clone(),
                    level,
                });
            }
            Recognition::Waiting => {
                let _ = tx.send(SupervisorEvent::Waiting { agent_id: entry.agent_id.clone() });
            }
        }
    }
}

/// Best-effort signal delivery; the child may already be gone.
fn deliver_signal(pid: u32, sig: Signal) {
    if let Ok(raw) = i32::try_from(pid) {
        let _ = signal::kill(Pid::from_raw(raw), sig);
    }
}

/// Map a raw signal number to its name (e.g. 15 → "SIGTERM").
fn signal_name(raw: i32) -> String {
    match Signal::try_from(raw) {
        Ok(sig) => sig.as_str().to_owned(),
        Err(_) => format!("signal {raw}"),
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
