// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeSet;

use super::{build_args, child_env};
use crate::model::{AgentMode, Permission};

fn perms(list: &[Permission]) -> BTreeSet<Permission> {
    list.iter().copied().collect()
}

#[test]
fn regular_mode_has_no_mode_flag() {
    let args = build_args(AgentMode::Regular, &perms(&[Permission::Read]), None, None);
    assert_eq!(args, vec!["--verbose"]);
}

#[test]
fn auto_mode_skips_permissions() {
    let args = build_args(AgentMode::Auto, &perms(&[Permission::Read]), None, None);
    assert_eq!(args, vec!["--dangerously-skip-permissions", "--verbose"]);
}

#[test]
fn plan_mode_flag() {
    let args = build_args(AgentMode::Plan, &perms(&[Permission::Read]), None, None);
    assert_eq!(args, vec!["--plan", "--verbose"]);
}

#[test]
fn write_and_execute_permissions_append_allow_lists() {
    let args = build_args(
        AgentMode::Regular,
        &perms(&[Permission::Read, Permission::Write, Permission::Execute]),
        None,
        None,
    );
    assert_eq!(
        args,
        vec!["--allowedTools", "Write,Edit", "--allowedTools", "Bash", "--verbose"]
    );
}

#[test]
fn auto_mode_suppresses_allow_lists() {
    let args = build_args(
        AgentMode::Auto,
        &perms(&[Permission::Write, Permission::Execute]),
        None,
        None,
    );
    assert_eq!(args, vec!["--dangerously-skip-permissions", "--verbose"]);
}

#[test]
fn initial_prompt_becomes_print() {
    let args = build_args(AgentMode::Regular, &perms(&[]), None, Some("hello"));
    assert_eq!(args, vec!["--print", "hello", "--verbose"]);
}

#[test]
fn session_id_becomes_resume() {
    let args = build_args(AgentMode::Regular, &perms(&[]), Some("sess-1"), None);
    assert_eq!(args, vec!["--resume", "sess-1", "--verbose"]);
}

#[test]
fn session_id_wins_over_initial_prompt() {
    let args = build_args(AgentMode::Regular, &perms(&[]), Some("sess-1"), Some("hello"));
    assert_eq!(args, vec!["--resume", "sess-1", "--verbose"]);
    assert!(!args.contains(&"--print".to_owned()));
}

#[test]
fn full_composition_order() {
    let args = build_args(
        AgentMode::Plan,
        &perms(&[Permission::Write]),
        Some("sess-2"),
        Some("ignored"),
    );
    assert_eq!(
        args,
        vec!["--plan", "--resume", "sess-2", "--allowedTools", "Write,Edit", "--verbose"]
    );
}

#[test]
fn child_env_forces_colourless_output() {
    let env = child_env();
    assert!(env.contains(&("FORCE_COLOR", "0")));
    assert!(env.contains(&("NO_COLOR", "1")));
}
