// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure stream-to-recognition transducer for agent output.
//!
//! Given a chunk of text and the side it arrived on (stdout or stderr), the
//! parser produces an ordered list of recognitions: status hints, context
//! percentages, and waiting indicators. Parsing the same chunk twice yields
//! the same sequence; the parser holds no state between chunks.

use regex::Regex;

use crate::model::AgentStatus;

/// Which stream a chunk arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSide {
    Stdout,
    Stderr,
}

/// A single recognition produced from a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    /// A status cue: thinking → running, waiting cue → waiting, error cue → error.
    Status(AgentStatus),
    /// A context-level percentage, clamped to 0..=100.
    Context(u8),
    /// A waiting indicator, complementary to `Status(Waiting)`.
    Waiting,
}

/// Compiled cue patterns.
pub struct Parser {
    context: Regex,
    waiting_phrase: Regex,
    error_cue: Regex,
    thinking_verb: Regex,
}

impl Parser {
    // The patterns are fixed; compilation cannot fail.
    #[allow(clippy::unwrap_used)]
    pub fn new() -> Self {
        Self {
            context: Regex::new(r"(?i)context\s*[:=]?\s*(\d+)\s*%").unwrap(),
            waiting_phrase: Regex::new(r"(?i)waiting for input|please\s+(provide|enter|confirm)|human turn").unwrap(),
            error_cue: Regex::new(r"(?i)error:|failed:|exception:|fatal:|permission denied|rate limit").unwrap(),
            thinking_verb: Regex::new(r"(?i)\b(thinking|processing|analyzing|reading|writing|executing)\b").unwrap(),
        }
    }

    /// Parse one chunk into an ordered list of recognitions.
    ///
    /// Cues are applied line by line, in the order they appear; within a line
    /// context recognitions come first, then status cues. When a chunk
    /// carries several status cues the caller treats the last one as the
    /// final status.
    pub fn parse_chunk(&self, side: StreamSide, text: &str) -> Vec<Recognition> {
        let mut out = Vec::new();
        for line in text.lines() {
            match side {
                StreamSide::Stdout => self.parse_stdout_line(line, &mut out),
                StreamSide::Stderr => self.parse_stderr_line(line, &mut out),
            }
        }
        out
    }

    fn parse_stdout_line(&self, line: &str, out: &mut Vec<Recognition>) {
        if line.contains('\u{276F}') || self.thinking_verb.is_match(line) {
            out.push(Recognition::Status(AgentStatus::Running));
        }
    }

    fn parse_stderr_line(&self, line: &str, out: &mut Vec<Recognition>) {
        for caps in self.context.captures_iter(line) {
            if let Some(level) = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok()) {
                out.push(Recognition::Context(level.min(100) as u8));
            }
        }

        if self.error_cue.is_match(line) {
            out.push(Recognition::Status(AgentStatus::Error));
        }

        if self.is_waiting_cue(line) {
            out.push(Recognition::Status(AgentStatus::Waiting));
            out.push(Recognition::Waiting);
        }
    }

    fn is_waiting_cue(&self, line: &str) -> bool {
        let trimmed = line.trim();
        trimmed == ">" || trimmed.ends_with('?') || self.waiting_phrase.is_match(line)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
