//! In-process telemetry store, used for tests and `--memory` runs.

use parking_lot::Mutex;
use serde_json::Value;

use crate::core::errors::{Result, ThError};
use crate::store::{TelemetryEntry, TelemetryStore, next_received_at, validate_payload};

/// Vector-backed store; the mutex is held across id and time assignment.
#[derive(Debug, Default)]
pub struct InMemoryTelemetryStore {
    entries: Mutex<Vec<TelemetryEntry>>,
}

impl InMemoryTelemetryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TelemetryStore for InMemoryTelemetryStore {
    fn append(&self, payload: Value) -> Result<TelemetryEntry> {
        validate_payload(&payload)?;
        let mut entries = self.entries.lock();
        let last = entries.last();
        let id = last.map_or(1, |e| e.id + 1);
        let received_at = next_received_at(last.map(|e| e.received_at));
        let entry = TelemetryEntry {
            id,
            received_at,
            payload,
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    fn list_all(&self) -> Result<Vec<TelemetryEntry>> {
        Ok(self.entries.lock().clone())
    }

    fn most_recent(&self) -> Result<TelemetryEntry> {
        self.entries
            .lock()
            .iter()
            .max_by(|a, b| a.received_at.cmp(&b.received_at).then(a.id.cmp(&b.id)))
            .cloned()
            .ok_or(ThError::NotFound {
                what: "telemetry entry",
            })
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries.lock().len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn most_recent_on_empty_store_is_not_found() {
        let store = InMemoryTelemetryStore::new();
        let err = store.most_recent().expect_err("empty store");
        assert!(matches!(err, ThError::NotFound { .. }));
    }

    #[test]
    fn most_recent_after_one_append_is_that_entry() {
        let store = InMemoryTelemetryStore::new();
        let entry = store.append(json!({"lux": 12})).unwrap();
        assert_eq!(store.most_recent().unwrap(), entry);
        assert_eq!(entry.id, 1);
    }

    #[test]
    fn list_all_is_ordered_and_stable() {
        let store = InMemoryTelemetryStore::new();
        for n in 1..=3 {
            store.append(json!({ "n": n })).unwrap();
        }
        let first = store.list_all().unwrap();
        let second = store.list_all().unwrap();
        assert_eq!(first, second);
        let ns: Vec<Value> = first.iter().map(|e| e.payload["n"].clone()).collect();
        assert_eq!(ns, [json!(1), json!(2), json!(3)]);
        assert!(first.windows(2).all(|w| w[0].received_at <= w[1].received_at));
    }

    #[test]
    fn empty_payload_is_rejected_and_not_stored() {
        let store = InMemoryTelemetryStore::new();
        let err = store.append(json!({})).expect_err("empty object");
        assert!(matches!(err, ThError::InvalidPayload { .. }));
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn payload_shape_is_not_enforced() {
        let store = InMemoryTelemetryStore::new();
        let odd = json!([1, "two", {"three": [3]}]);
        let entry = store.append(odd.clone()).unwrap();
        assert_eq!(entry.payload, odd);
    }

    #[test]
    fn concurrent_appends_get_distinct_ids() {
        let store = Arc::new(InMemoryTelemetryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..50)
                        .map(|i| store.append(json!({ "t": t, "i": i })).unwrap().id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let ids: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let unique: HashSet<i64> = ids.iter().copied().collect();
        assert_eq!(ids.len(), 400);
        assert_eq!(unique.len(), 400);
        assert_eq!(store.len().unwrap(), 400);
        let all = store.list_all().unwrap();
        assert!(all.windows(2).all(|w| w[0].id < w[1].id && w[0].received_at <= w[1].received_at));
    }
}
