//! Line splitting: free-text prefix + trailing brace-delimited JSON candidate.
//!
//! Stage one of the two-stage parse. This only locates the candidate; it never
//! decodes JSON, so a "no match" here and a decode failure later are reported
//! as different diagnostics.

#![allow(missing_docs)]

use regex::Regex;

use crate::core::errors::{Result, ThError};

/// Non-greedy prefix, then a greedy `{...}` block that reaches end-of-line
/// with only whitespace after the closing brace.
pub const LINE_PATTERN: &str = r"^(.*?)(\{.*\})\s*$";

/// A successful split of one log line. Both parts are whitespace-trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSplit<'a> {
    pub prefix: &'a str,
    pub candidate: &'a str,
}

/// Splits a trimmed log line into `(prefix, json_candidate)`.
#[derive(Debug, Clone)]
pub struct LineRecordExtractor {
    pattern: Regex,
}

impl LineRecordExtractor {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(LINE_PATTERN).map_err(|err| ThError::Runtime {
            details: format!("line pattern failed to compile: {err}"),
        })?;
        Ok(Self { pattern })
    }

    /// Split `line`, or `None` when it has no trailing `{...}` block.
    ///
    /// Empty lines are the caller's concern; they simply never match.
    pub fn split<'a>(&self, line: &'a str) -> Option<LineSplit<'a>> {
        let caps = self.pattern.captures(line)?;
        let prefix = caps.get(1)?.as_str().trim();
        let candidate = caps.get(2)?.as_str().trim();
        Some(LineSplit { prefix, candidate })
    }
}
