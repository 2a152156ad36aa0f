// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent command-line composition.
//!
//! Argument order is fixed: mode flag, session resumption, tool allow-lists,
//! initial prompt, `--verbose`. A session id suppresses the initial prompt —
//! resuming and `--print` are mutually exclusive.

use std::collections::BTreeSet;

use crate::model::{AgentMode, Permission};

/// Assemble argv (without the program itself) for an agent spawn.
pub fn build_args(
    mode: AgentMode,
    permissions: &BTreeSet<Permission>,
    session_id: Option<&str>,
    initial_prompt: Option<&str>,
) -> Vec<String> {
    let mut args = Vec::new();

    match mode {
        AgentMode::Auto => args.push("--dangerously-skip-permissions".to_owned()),
        AgentMode::Plan => args.push("--plan".to_owned()),
        AgentMode::Regular => {}
    }

    if let Some(session) = session_id {
        args.push("--resume".to_owned());
        args.push(session.to_owned());
    }

    // Auto mode already skips permission checks; allow-lists only matter
    // for the gated modes.
    if mode != AgentMode::Auto {
        if permissions.contains(&Permission::Write) {
            args.push("--allowedTools".to_owned());
            args.push("Write,Edit".to_owned());
        }
        if permissions.contains(&Permission::Execute) {
            args.push("--allowedTools".to_owned());
            args.push("Bash".to_owned());
        }
    }

    if session_id.is_none() {
        if let Some(prompt) = initial_prompt {
            args.push("--print".to_owned());
            args.push(prompt.to_owned());
        }
    }

    args.push("--verbose".to_owned());
    args
}

/// Environment overrides forcing colourless child output, keeping the
/// stream parser deterministic.
pub fn child_env() -> [(&'static str, &'static str); 2] {
    [("FORCE_COLOR", "0"), ("NO_COLOR", "1")]
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
