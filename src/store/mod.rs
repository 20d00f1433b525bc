//! Append-only telemetry persistence.
//!
//! Every accepted payload becomes an immutable [`TelemetryEntry`] with a
//! server-assigned `id` and `received_at`. There is no update or delete.
//! Backends serialize appends internally, so `id` order is arrival order and,
//! because `received_at` never goes backwards, also temporal order.

#![allow(missing_docs)]

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::core::config::{StorageBackend, StorageConfig};
use crate::core::errors::{Result, ThError};

pub use memory::InMemoryTelemetryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTelemetryStore;

/// One stored ingestion record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEntry {
    pub id: i64,
    pub received_at: DateTime<Utc>,
    pub payload: Value,
}

/// Persistence contract shared by all backends.
pub trait TelemetryStore: Send + Sync {
    /// Store `payload` verbatim; rejects absent/empty payloads.
    fn append(&self, payload: Value) -> Result<TelemetryEntry>;

    /// Every entry, ascending by `id`.
    fn list_all(&self) -> Result<Vec<TelemetryEntry>>;

    /// Entry with the greatest `received_at`, ties broken by greatest `id`.
    fn most_recent(&self) -> Result<TelemetryEntry>;

    /// Number of stored entries.
    fn len(&self) -> Result<usize>;

    /// Short backend label for logs.
    fn backend_name(&self) -> &'static str;
}

/// Open the backend selected by `config`.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn TelemetryStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryTelemetryStore::new())),
        #[cfg(feature = "sqlite")]
        StorageBackend::Sqlite => Ok(Arc::new(SqliteTelemetryStore::open(&config.sqlite_db)?)),
        #[cfg(not(feature = "sqlite"))]
        StorageBackend::Sqlite => Err(ThError::InvalidConfig {
            details: "storage.backend = \"sqlite\" needs the `sqlite` feature".to_string(),
        }),
    }
}

/// Whether a JSON value counts as "no data": `null`, `false`, `0`, `""`, `[]`, `{}`.
pub fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Bool(flag) => !*flag,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Reject payloads that carry no data.
pub fn validate_payload(payload: &Value) -> Result<()> {
    if is_empty_payload(payload) {
        return Err(ThError::InvalidPayload {
            details: "No data provided".to_string(),
        });
    }
    Ok(())
}

/// Receive time for the next entry: now, but never earlier than `last`.
///
/// Truncated to microseconds, the precision backends persist.
pub(crate) fn next_received_at(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(6);
    match last {
        Some(prev) if prev > now => prev,
        _ => now,
    }
}

/// Fixed-width RFC 3339 (UTC, microseconds): lexical order equals time order.
pub(crate) fn format_received_at(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_received_at(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| ThError::Storage {
            context: "received_at",
            details: format!("{raw:?}: {err}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn falsy_payloads_are_empty() {
        for value in [
            json!(null),
            json!(false),
            json!(0),
            json!(0.0),
            json!(""),
            json!([]),
            json!({}),
        ] {
            assert!(is_empty_payload(&value), "{value} should be empty");
            assert_eq!(validate_payload(&value).unwrap_err().code(), "TH-3001");
        }
    }

    #[test]
    fn truthy_payloads_are_accepted() {
        for value in [
            json!(true),
            json!(1),
            json!(-0.5),
            json!("x"),
            json!([0]),
            json!({"lux": 0}),
        ] {
            assert!(validate_payload(&value).is_ok(), "{value} should be accepted");
        }
    }

    #[test]
    fn received_at_never_goes_backwards() {
        let future = Utc.with_ymd_and_hms(2999, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(next_received_at(Some(future)), future);
        let past = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        assert!(next_received_at(Some(past)) > past);
    }

    #[test]
    fn received_at_text_round_trips_and_sorts() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let (ta, tb) = (format_received_at(a), format_received_at(b));
        assert!(ta < tb);
        assert_eq!(ta, "2026-01-01T09:00:00.000000Z");
        assert_eq!(parse_received_at(&tb).unwrap(), b);
    }

    #[test]
    fn garbage_received_at_is_storage_error() {
        assert_eq!(parse_received_at("yesterday").unwrap_err().code(), "TH-3003");
    }

    #[test]
    fn open_store_memory_backend() {
        let store = open_store(&StorageConfig {
            backend: StorageBackend::Memory,
            ..StorageConfig::default()
        })
        .unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert_eq!(store.len().unwrap(), 0);
    }
}
