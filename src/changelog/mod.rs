//! Per-item change history with latest-wins merge
//!
//! Each report keeps an append-only-in-spirit log of item-level changes, one
//! retained entry per item fingerprint: the entry with the greatest resolved
//! instant. The store has no append primitive, so persisting a merge means
//! round-tripping the whole entries list (fetch, merge, upsert back); the
//! coordinator owns that round trip.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

use crate::record::timestamp::resolve_value;
use crate::record::{LogicalKey, RawRecord};

/// A normalized composite of stable item attributes, used to correlate an
/// item across independent edits. It must survive mutation of the tracked
/// field itself, so build it from attributes that don't change.
pub fn item_fingerprint(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join("|")
}

/// One item-level change: the tracked field went `from` → `to` at
/// `occurred_at` (raw and heterogeneous; resolved at merge time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub fingerprint: String,
    #[serde(default)]
    pub from: JsonValue,
    pub to: JsonValue,
    #[serde(rename = "occurredAt")]
    pub occurred_at: JsonValue,
}

impl ChangeEntry {
    /// Resolved instant of this change, epoch milliseconds (zero when the
    /// raw value is unusable).
    pub fn resolved_at(&self) -> i64 {
        resolve_value(&self.occurred_at).unwrap_or(0)
    }

    /// Whether this entry should annotate a displayed item whose current
    /// tracked value is `current`. A stale annotation (the value moved on
    /// since) is suppressed, never shown incorrectly.
    pub fn annotates(&self, current: &JsonValue) -> bool {
        &self.to == current
    }
}

/// Merge incoming changes into an existing entry map, latest-wins per
/// fingerprint: an incoming entry replaces only when nothing is there yet or
/// its resolved instant is strictly greater.
pub fn merge_entries(
    existing: &HashMap<String, ChangeEntry>,
    incoming: impl IntoIterator<Item = ChangeEntry>,
) -> HashMap<String, ChangeEntry> {
    let mut merged = existing.clone();
    for entry in incoming {
        let replace = match merged.get(&entry.fingerprint) {
            None => true,
            Some(current) => entry.resolved_at() > current.resolved_at(),
        };
        if replace {
            merged.insert(entry.fingerprint.clone(), entry);
        }
    }
    merged
}

/// The change history of one logical report.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeLog {
    pub key: LogicalKey,
    /// Exactly one retained entry per fingerprint: the greatest resolved
    /// instant seen.
    pub entries: HashMap<String, ChangeEntry>,
}

impl ChangeLog {
    pub fn new(key: LogicalKey) -> Self {
        Self {
            key,
            entries: HashMap::new(),
        }
    }

    /// Rebuild a changelog from a stored record's `entries` array. A stored
    /// list with duplicate fingerprints (a torn earlier write) is folded back
    /// through the merge rule, restoring the one-entry-per-fingerprint
    /// invariant.
    pub fn from_record(key: LogicalKey, record: &RawRecord) -> Self {
        let incoming = record
            .payload
            .get("entries")
            .and_then(JsonValue::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect::<Vec<ChangeEntry>>()
            })
            .unwrap_or_default();

        Self {
            key,
            entries: merge_entries(&HashMap::new(), incoming),
        }
    }

    /// Merge incoming changes in place. Returns how many entries were
    /// inserted or replaced.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = ChangeEntry>) -> usize {
        let before = self.entries.clone();
        self.entries = merge_entries(&before, incoming);
        self.entries
            .iter()
            .filter(|(fingerprint, entry)| before.get(*fingerprint) != Some(*entry))
            .count()
    }

    /// The payload this changelog persists as. Entries are emitted in
    /// fingerprint order so the stored document is stable across saves.
    pub fn to_payload(&self) -> Map<String, JsonValue> {
        let mut entries: Vec<&ChangeEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));

        let mut payload = Map::new();
        payload.insert("entries".into(), json!(entries));
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn make_entry(fingerprint: &str, to: JsonValue, occurred_at: i64) -> ChangeEntry {
        ChangeEntry {
            fingerprint: fingerprint.into(),
            from: JsonValue::Null,
            to,
            occurred_at: json!(occurred_at),
        }
    }

    fn make_key() -> LogicalKey {
        LogicalKey::new("returns", "store-7", NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
    }

    #[test]
    fn test_fingerprint_normalization() {
        assert_eq!(item_fingerprint(&[" SKU-1 ", "Crate A"]), "sku-1|crate a");
        assert_eq!(
            item_fingerprint(&["sku-1", "crate a"]),
            item_fingerprint(&["SKU-1", "CRATE A"])
        );
    }

    #[test]
    fn test_older_incoming_leaves_existing_unchanged() {
        let existing: HashMap<String, ChangeEntry> = [(
            "k1".to_string(),
            make_entry("k1", json!("A"), 10),
        )]
        .into();

        let merged = merge_entries(&existing, vec![make_entry("k1", json!("B"), 5)]);
        assert_eq!(merged["k1"].to, json!("A"));
        assert_eq!(merged["k1"].resolved_at(), 10_000);
    }

    #[test]
    fn test_incoming_into_empty_is_kept() {
        let merged = merge_entries(&HashMap::new(), vec![make_entry("k1", json!("B"), 5)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged["k1"].to, json!("B"));
    }

    #[test]
    fn test_equal_instant_does_not_replace() {
        let existing: HashMap<String, ChangeEntry> = [(
            "k1".to_string(),
            make_entry("k1", json!("A"), 10),
        )]
        .into();

        let merged = merge_entries(&existing, vec![make_entry("k1", json!("B"), 10)]);
        assert_eq!(merged["k1"].to, json!("A"));
    }

    #[test]
    fn test_newer_incoming_replaces() {
        let mut changelog = ChangeLog::new(make_key());
        changelog.merge(vec![make_entry("k1", json!("A"), 10)]);
        let changed = changelog.merge(vec![
            make_entry("k1", json!("B"), 20),
            make_entry("k2", json!("X"), 5),
        ]);

        assert_eq!(changed, 2);
        assert_eq!(changelog.entries["k1"].to, json!("B"));
        assert_eq!(changelog.entries["k2"].to, json!("X"));
    }

    #[test]
    fn test_annotation_suppressed_when_value_moved_on() {
        let entry = make_entry("k1", json!(7), 10);
        assert!(entry.annotates(&json!(7)));
        assert!(!entry.annotates(&json!(9)));
        assert!(!entry.annotates(&JsonValue::Null));
    }

    #[test]
    fn test_payload_round_trip() {
        let mut changelog = ChangeLog::new(make_key());
        changelog.merge(vec![
            make_entry("k2", json!("X"), 5),
            make_entry("k1", json!("B"), 20),
        ]);

        let record = RawRecord::new(changelog.to_payload());
        let restored = ChangeLog::from_record(make_key(), &record);
        assert_eq!(restored.entries, changelog.entries);
    }

    #[test]
    fn test_from_record_folds_duplicate_fingerprints() {
        let mut payload = Map::new();
        payload.insert(
            "entries".into(),
            json!([
                {"fingerprint": "k1", "to": "old", "occurredAt": 10},
                {"fingerprint": "k1", "to": "new", "occurredAt": 20},
            ]),
        );
        let restored = ChangeLog::from_record(make_key(), &RawRecord::new(payload));

        assert_eq!(restored.entries.len(), 1);
        assert_eq!(restored.entries["k1"].to, json!("new"));
    }

    #[test]
    fn test_from_record_without_entries_field() {
        let restored = ChangeLog::from_record(make_key(), &RawRecord::new(Map::new()));
        assert!(restored.entries.is_empty());
    }
}
