// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque prefixed identifiers and UTC timestamps.
//!
//! Ids take the form `<prefix>_<base36 millis><base36 random>` so they sort
//! roughly by creation time while staying opaque to clients.

use std::fmt;

use rand::Rng;

/// Entity prefixes for minted identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    Workspace,
    Worktree,
    Agent,
    Message,
    Client,
}

impl IdPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workspace => "ws",
            Self::Worktree => "wt",
            Self::Agent => "ag",
            Self::Message => "msg",
            Self::Client => "cl",
        }
    }
}

impl fmt::Display for IdPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mint a fresh identifier with the given prefix.
pub fn generate(prefix: IdPrefix) -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let random: u64 = rand::rng().random();
    format!("{}_{}{}", prefix.as_str(), to_base36(millis), to_base36(random))
}

/// Check that `id` carries the expected prefix and a non-empty base36 body.
pub fn is_valid(id: &str, prefix: IdPrefix) -> bool {
    let Some(body) = id.strip_prefix(prefix.as_str()).and_then(|r| r.strip_prefix('_')) else {
        return false;
    };
    !body.is_empty() && body.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

/// Current UTC time as an RFC-3339 string with millisecond precision.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_owned();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
