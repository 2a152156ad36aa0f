// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin shell-out wrapper around `git` for worktree discovery and
//! management. Only the porcelain surfaces this service needs; no libgit.

use std::path::Path;

use tokio::process::Command;

use crate::error::{ApiError, Result};

/// One entry from `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitWorktree {
    pub path: String,
    pub branch: String,
    pub is_main: bool,
}

/// Summary of `git status --porcelain` for a worktree.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitStatus {
    pub branch: String,
    pub staged: usize,
    pub modified: usize,
    pub untracked: usize,
    pub clean: bool,
}

/// Run a git subcommand in `dir`, returning stdout on success.
async fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .await
        .map_err(|e| ApiError::process(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ApiError::process(format!(
            "git {} failed: {}",
            args.first().copied().unwrap_or(""),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Whether `path` is inside a git work tree.
pub async fn is_git_repo(path: &Path) -> bool {
    git(path, &["rev-parse", "--is-inside-work-tree"])
        .await
        .map(|out| out.trim() == "true")
        .unwrap_or(false)
}

/// List all worktrees registered for the repository containing `repo`.
pub async fn list_worktrees(repo: &Path) -> Result<Vec<GitWorktree>> {
    let output = git(repo, &["worktree", "list", "--porcelain"]).await?;
    Ok(parse_worktree_list(&output))
}

/// Add a worktree at `path` for `branch`, optionally creating the branch.
pub async fn add_worktree(
    repo: &Path,
    path: &str,
    branch: &str,
    create_branch: bool,
) -> Result<()> {
    let mut args = vec!["worktree", "add"];
    if create_branch {
        args.extend(["-b", branch, path]);
    } else {
        args.extend([path, branch]);
    }
    git(repo, &args).await?;
    Ok(())
}

/// Remove the worktree at `path`.
pub async fn remove_worktree(repo: &Path, path: &str, force: bool) -> Result<()> {
    let mut args = vec!["worktree", "remove"];
    if force {
        args.push("--force");
    }
    args.push(path);
    git(repo, &args).await?;
    Ok(())
}

/// Local branch names.
pub async fn list_branches(repo: &Path) -> Result<Vec<String>> {
    let output = git(repo, &["branch", "--format", "%(refname:short)"]).await?;
    Ok(output.lines().map(|l| l.trim().to_owned()).filter(|l| !l.is_empty()).collect())
}

/// Check out `branch` in the worktree at `dir`, optionally creating it.
pub async fn checkout(dir: &Path, branch: &str, create_branch: bool) -> Result<()> {
    if create_branch {
        git(dir, &["checkout", "-b", branch]).await?;
    } else {
        git(dir, &["checkout", branch]).await?;
    }
    Ok(())
}

/// Current branch plus a porcelain change summary for the worktree at `dir`.
pub async fn status(dir: &Path) -> Result<GitStatus> {
    let branch = git(dir, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
    let porcelain = git(dir, &["status", "--porcelain"]).await?;
    Ok(parse_status(branch.trim(), &porcelain))
}

/// Parse `git worktree list --porcelain` output. The first entry is the
/// main worktree.
fn parse_worktree_list(output: &str) -> Vec<GitWorktree> {
    let mut worktrees = Vec::new();
    let mut path: Option<String> = None;
    let mut branch = String::new();

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("worktree ") {
            if let Some(previous) = path.take() {
                worktrees.push(GitWorktree {
                    path: previous,
                    branch: std::mem::take(&mut branch),
                    is_main: false,
                });
            }
            path = Some(rest.to_owned());
        } else if let Some(rest) = line.strip_prefix("branch ") {
            branch = rest.strip_prefix("refs/heads/").unwrap_or(rest).to_owned();
        } else if line == "detached" {
            branch = "HEAD".to_owned();
        }
    }
    if let Some(previous) = path.take() {
        worktrees.push(GitWorktree { path: previous, branch, is_main: false });
    }

    if let Some(first) = worktrees.first_mut() {
        first.is_main = true;
    }
    worktrees
}

fn parse_status(branch: &str, porcelain: &str) -> GitStatus {
    let mut staged = 0;
    let mut modified = 0;
    let mut untracked = 0;
    for line in porcelain.lines() {
        let mut chars = line.chars();
        let index = chars.next().unwrap_or(' ');
        let tree = chars.next().unwrap_or(' ');
        if index == '?' {
            untracked += 1;
            continue;
        }
        if index != ' ' {
            staged += 1;
        }
        if tree != ' ' {
            modified += 1;
        }
    }
    GitStatus {
        branch: branch.to_owned(),
        staged,
        modified,
        untracked,
        clean: staged == 0 && modified == 0 && untracked == 0,
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
