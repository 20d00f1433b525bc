//! Tolerant sensor log parser.
//!
//! Reads a newline-delimited log where each useful line is
//! `<free-text prefix>{<JSON object>}`, and turns it into an ordered list of
//! [`SensorRecord`]s. Nothing short of an I/O fault on an opened file aborts a
//! parse: unmatched lines, undecodable JSON and non-UTF-8 bytes are skipped,
//! logged at warning level and returned as [`LineDiagnostic`]s.

#![allow(missing_docs)]

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::core::errors::{Result, ThError};
use crate::parser::extractor::LineRecordExtractor;

/// Reserved key under which the line prefix appears in a merged record.
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Longest line excerpt kept in a diagnostic.
const EXCERPT_MAX_CHARS: usize = 120;

/// Precedence when a decoded payload has its own `timestamp` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampMerge {
    /// The payload's own `timestamp` replaces the prefix.
    #[default]
    PayloadWins,
    /// The prefix replaces the payload's `timestamp`.
    PrefixWins,
}

impl FromStr for TimestampMerge {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "payload_wins" => Ok(Self::PayloadWins),
            "prefix_wins" => Ok(Self::PrefixWins),
            other => Err(format!("expected payload_wins|prefix_wins, got {other:?}")),
        }
    }
}

/// One successfully parsed log line.
///
/// Keeps the prefix and the decoded object apart; the merged view is
/// produced by [`SensorRecord::merged`] and by `Serialize`.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    timestamp_prefix: String,
    fields: Map<String, Value>,
    merge: TimestampMerge,
}

impl SensorRecord {
    pub fn new(
        timestamp_prefix: impl Into<String>,
        fields: Map<String, Value>,
        merge: TimestampMerge,
    ) -> Self {
        Self {
            timestamp_prefix: timestamp_prefix.into(),
            fields,
            merge,
        }
    }

    /// Text captured before the JSON object. Opaque label, not a parsed date.
    pub fn timestamp_prefix(&self) -> &str {
        &self.timestamp_prefix
    }

    /// The decoded object exactly as it appeared in the line.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn merge_policy(&self) -> TimestampMerge {
        self.merge
    }

    /// True when the payload itself carries a `timestamp` field.
    pub fn has_timestamp_collision(&self) -> bool {
        self.fields.contains_key(TIMESTAMP_KEY)
    }

    /// The value shown under `timestamp` after the merge policy is applied.
    pub fn timestamp(&self) -> Value {
        match (self.merge, self.fields.get(TIMESTAMP_KEY)) {
            (TimestampMerge::PayloadWins, Some(own)) => own.clone(),
            _ => Value::String(self.timestamp_prefix.clone()),
        }
    }

    /// Prefix and fields flattened into one object.
    pub fn merged(&self) -> Map<String, Value> {
        let mut out = Map::with_capacity(self.fields.len() + 1);
        out.insert(TIMESTAMP_KEY.to_string(), self.timestamp());
        for (key, value) in &self.fields {
            if key != TIMESTAMP_KEY {
                out.insert(key.clone(), value.clone());
            }
        }
        out
    }
}

impl Serialize for SensorRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = self.fields.len() + usize::from(!self.has_timestamp_collision());
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(TIMESTAMP_KEY, &self.timestamp())?;
        for (key, value) in &self.fields {
            if key != TIMESTAMP_KEY {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

/// Why a line produced a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// No trailing brace-delimited block; line skipped.
    MalformedLine,
    /// Line bytes were not UTF-8; line skipped.
    InvalidUtf8,
    /// The candidate was not one strict JSON object; line skipped.
    PayloadDecode { details: String },
    /// Record kept, but its payload has a `timestamp` field of its own.
    TimestampCollision { winner: TimestampMerge },
}

impl DiagnosticKind {
    /// Whether the line was dropped.
    pub fn is_skip(&self) -> bool {
        !matches!(self, Self::TimestampCollision { .. })
    }
}

/// A non-fatal notice about one input line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineDiagnostic {
    /// 1-based physical line number.
    pub line_number: usize,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
    pub excerpt: String,
}

/// Ordered records for one sensor, plus what was skipped along the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorLogResult {
    pub sensor: String,
    pub source: PathBuf,
    pub records: Vec<SensorRecord>,
    pub diagnostics: Vec<LineDiagnostic>,
    /// Set when the source could not be opened; `records` is then empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_unavailable: Option<String>,
}

impl SensorLogResult {
    fn empty(sensor: &str, source: &Path) -> Self {
        Self {
            sensor: sensor.to_string(),
            source: source.to_path_buf(),
            ..Self::default()
        }
    }

    /// Number of lines dropped.
    pub fn skipped_lines(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.kind.is_skip()).count()
    }
}

/// Result of interpreting a single line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Blank,
    Record(SensorRecord),
    Skipped(DiagnosticKind),
}

/// Stateless driver over [`LineRecordExtractor`]; safe to call repeatedly.
#[derive(Debug, Clone)]
pub struct LogParser {
    extractor: LineRecordExtractor,
    merge: TimestampMerge,
}

impl LogParser {
    pub fn new(merge: TimestampMerge) -> Result<Self> {
        Ok(Self {
            extractor: LineRecordExtractor::new()?,
            merge,
        })
    }

    pub fn merge_policy(&self) -> TimestampMerge {
        self.merge
    }

    /// Parse the log at `path`.
    ///
    /// A source that is absent or cannot be opened yields an empty result
    /// with `source_unavailable` set. Only a read fault after the file was
    /// opened is returned as an error.
    pub fn parse_file(&self, path: &Path, sensor: Option<&str>) -> Result<SensorLogResult> {
        let label = sensor.map_or_else(|| path.display().to_string(), str::to_string);

        let file = match open_regular_file(path) {
            Ok(file) => file,
            Err(reason) => {
                let unavailable = ThError::SourceUnavailable {
                    path: path.to_path_buf(),
                    details: reason.clone(),
                };
                warn!(sensor = %label, path = %path.display(), "{unavailable}");
                let mut result = SensorLogResult::empty(&label, path);
                result.source_unavailable = Some(reason);
                return Ok(result);
            }
        };

        let mut result = self
            .parse_reader(BufReader::new(file), &label)
            .map_err(|source| ThError::SourceRead {
                path: path.to_path_buf(),
                source,
            })?;
        result.source = path.to_path_buf();
        info!(
            sensor = %label,
            skipped = result.skipped_lines(),
            "loaded {} entries from {} log",
            result.records.len(),
            label
        );
        Ok(result)
    }

    /// Parse any buffered source. Errors are raw I/O faults from `reader`.
    pub fn parse_reader<R: BufRead>(
        &self,
        mut reader: R,
        sensor: &str,
    ) -> std::io::Result<SensorLogResult> {
        let mut result = SensorLogResult {
            sensor: sensor.to_string(),
            ..SensorLogResult::default()
        };
        let mut buf = Vec::new();
        let mut line_number = 0_usize;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_number += 1;

            let (outcome, excerpt) = match std::str::from_utf8(&buf) {
                Ok(text) => (self.parse_line(text), excerpt(text)),
                Err(_) => (
                    LineOutcome::Skipped(DiagnosticKind::InvalidUtf8),
                    excerpt(&String::from_utf8_lossy(&buf)),
                ),
            };

            match outcome {
                LineOutcome::Blank => {}
                LineOutcome::Record(record) => {
                    if record.has_timestamp_collision() {
                        let kind = DiagnosticKind::TimestampCollision {
                            winner: record.merge_policy(),
                        };
                        self.note(&mut result, sensor, line_number, kind, excerpt);
                    }
                    result.records.push(record);
                }
                LineOutcome::Skipped(kind) => {
                    self.note(&mut result, sensor, line_number, kind, excerpt);
                }
            }
        }

        Ok(result)
    }

    /// Interpret one raw line (trailing newline allowed).
    pub fn parse_line(&self, raw: &str) -> LineOutcome {
        let line = raw.trim();
        if line.is_empty() {
            return LineOutcome::Blank;
        }

        let Some(split) = self.extractor.split(line) else {
            return LineOutcome::Skipped(DiagnosticKind::MalformedLine);
        };

        match serde_json::from_str::<Map<String, Value>>(split.candidate) {
            Ok(fields) => LineOutcome::Record(SensorRecord::new(split.prefix, fields, self.merge)),
            Err(err) => LineOutcome::Skipped(DiagnosticKind::PayloadDecode {
                details: err.to_string(),
            }),
        }
    }

    #[allow(clippy::unused_self)]
    fn note(
        &self,
        result: &mut SensorLogResult,
        sensor: &str,
        line_number: usize,
        kind: DiagnosticKind,
        excerpt: String,
    ) {
        match &kind {
            DiagnosticKind::MalformedLine => {
                warn!(sensor, line = line_number, "malformed or no-JSON line: {excerpt}");
            }
            DiagnosticKind::InvalidUtf8 => {
                warn!(sensor, line = line_number, "non-UTF-8 line: {excerpt}");
            }
            DiagnosticKind::PayloadDecode { details } => {
                warn!(sensor, line = line_number, "JSON parse error ({details}): {excerpt}");
            }
            DiagnosticKind::TimestampCollision { winner } => {
                warn!(
                    sensor,
                    line = line_number,
                    ?winner,
                    "payload has its own {TIMESTAMP_KEY:?} field"
                );
            }
        }
        result.diagnostics.push(LineDiagnostic {
            line_number,
            kind,
            excerpt,
        });
    }
}

fn open_regular_file(path: &Path) -> std::result::Result<File, String> {
    match std::fs::metadata(path) {
        Ok(meta) if !meta.is_file() => return Err("not a regular file".to_string()),
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err("log file not found".to_string());
        }
        Err(err) => return Err(err.to_string()),
    }
    File::open(path).map_err(|err| err.to_string())
}

fn excerpt(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() <= EXCERPT_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(EXCERPT_MAX_CHARS).collect();
    out.push('…');
    out
}
