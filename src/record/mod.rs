//! Record data model: raw store documents, logical identity, canonical records
//!
//! A `RawRecord` is one physical document as the remote store returns it; the
//! store may hold many of them for the same report. A `LogicalKey` is the
//! business identity of a report (type + scope + date), and a
//! `CanonicalRecord` is the single record chosen to represent that key after
//! reconciliation. Raw records are never edited in place; a save always
//! produces a new one through the upsert coordinator.

pub mod reconcile;
pub mod timestamp;

pub use reconcile::{Reconciler, SortDirection};

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// One physical document as stored remotely.
///
/// Everything except the store-assigned id and the record-level timestamp
/// metadata is kept in the opaque `payload` map. The timestamp fields are
/// arbitrary JSON values: different store generations wrote epoch numbers,
/// date strings, or nothing at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Store-assigned opaque identifier; absent before first persist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(
        default,
        rename = "createdAt",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<JsonValue>,

    #[serde(
        default,
        rename = "updatedAt",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<JsonValue>,

    /// All remaining document fields, untouched.
    #[serde(flatten)]
    pub payload: Map<String, JsonValue>,
}

impl RawRecord {
    /// Create an unpersisted record from a payload map.
    pub fn new(payload: Map<String, JsonValue>) -> Self {
        Self {
            id: None,
            created_at: None,
            updated_at: None,
            timestamp: None,
            payload,
        }
    }

    /// Deserialize a record from a store response, accepting the `_id`
    /// spelling some stores use for the identifier. (An `alias` attribute
    /// can't do this: serde ignores aliases next to a flattened map.)
    pub fn from_value(value: JsonValue) -> Result<Self, serde_json::Error> {
        let mut record: RawRecord = serde_json::from_value(value)?;
        if record.id.is_none() {
            if let Some(JsonValue::String(id)) = record.payload.remove("_id") {
                record.id = Some(id);
            }
        }
        Ok(record)
    }

    /// The nested client-side save instant (`client_meta.saved_at`), if the
    /// record was ever written by this client.
    pub fn client_saved_at(&self) -> Option<&JsonValue> {
        self.payload.get("client_meta")?.get("saved_at")
    }
}

/// Business identity of a report: one logical key should map to one stored
/// record, even when the store holds several.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalKey {
    pub document_type: String,
    /// Scope identifier (site, store, ...). Empty when the document type has
    /// no scoping dimension.
    pub scope: String,
    pub date: NaiveDate,
}

impl LogicalKey {
    pub fn new(document_type: impl Into<String>, scope: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            document_type: document_type.into(),
            scope: scope.into(),
            date,
        }
    }

    /// Derive the logical key from a record's payload.
    ///
    /// Returns `None` when the document type is missing or the date is
    /// empty/unparseable; such records cannot participate in reconciliation
    /// and are dropped by the caller.
    pub fn derive(record: &RawRecord) -> Option<Self> {
        let payload = &record.payload;
        let document_type = string_field(payload, &["documentType", "type"])?;
        let scope = string_field(payload, &["scope", "site", "store"]).unwrap_or_default();
        let date = payload
            .get("date")
            .or_else(|| payload.get("reportDate"))
            .and_then(parse_key_date)?;
        Some(Self {
            document_type,
            scope,
            date,
        })
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.document_type, self.scope, self.date)
    }
}

/// The single record chosen to represent a logical key after reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub key: LogicalKey,
    /// External id of the winning record.
    pub id: Option<String>,
    pub record: RawRecord,
    /// Greatest resolved instant across the group, epoch milliseconds.
    /// Zero means no usable timestamp metadata anywhere in the group.
    pub resolved_at: i64,
}

fn string_field(payload: &Map<String, JsonValue>, names: &[&str]) -> Option<String> {
    for name in names {
        if let Some(s) = payload.get(*name).and_then(JsonValue::as_str) {
            let s = s.trim();
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

fn parse_key_date(value: &JsonValue) -> Option<NaiveDate> {
    let s = value.as_str()?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_payload(entries: &[(&str, JsonValue)]) -> Map<String, JsonValue> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_derive_key_from_payload() {
        let record = RawRecord::new(make_payload(&[
            ("documentType", json!("returns")),
            ("scope", json!("store-7")),
            ("date", json!("2024-05-01")),
        ]));

        let key = LogicalKey::derive(&record).unwrap();
        assert_eq!(key.document_type, "returns");
        assert_eq!(key.scope, "store-7");
        assert_eq!(key.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[test]
    fn test_derive_key_fallback_names() {
        let record = RawRecord::new(make_payload(&[
            ("type", json!("inventory")),
            ("site", json!("warehouse-2")),
            ("reportDate", json!("2024-05-01T08:30:00Z")),
        ]));

        let key = LogicalKey::derive(&record).unwrap();
        assert_eq!(key.document_type, "inventory");
        assert_eq!(key.scope, "warehouse-2");
        assert_eq!(key.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[test]
    fn test_derive_key_without_scope() {
        let record = RawRecord::new(make_payload(&[
            ("documentType", json!("returns")),
            ("date", json!("2024-05-01")),
        ]));

        let key = LogicalKey::derive(&record).unwrap();
        assert_eq!(key.scope, "");
    }

    #[test]
    fn test_derive_key_rejects_bad_dates() {
        for date in [json!(""), json!("  "), json!("05/01/2024"), json!(12345), JsonValue::Null] {
            let record = RawRecord::new(make_payload(&[
                ("documentType", json!("returns")),
                ("date", date),
            ]));
            assert!(LogicalKey::derive(&record).is_none());
        }
    }

    #[test]
    fn test_derive_key_requires_document_type() {
        let record = RawRecord::new(make_payload(&[("date", json!("2024-05-01"))]));
        assert!(LogicalKey::derive(&record).is_none());
    }

    #[test]
    fn test_raw_record_round_trip_preserves_payload() {
        let json = json!({
            "_id": "665201f0aabbccddeeff0011",
            "createdAt": 1714521600000i64,
            "documentType": "returns",
            "date": "2024-05-01",
            "lines": [{"sku": "A-1", "qty": 3}],
        });

        let record = RawRecord::from_value(json).unwrap();
        assert_eq!(record.id.as_deref(), Some("665201f0aabbccddeeff0011"));
        assert!(record.payload.get("_id").is_none());
        assert_eq!(record.created_at, Some(json!(1714521600000i64)));
        assert_eq!(record.payload["lines"][0]["sku"], json!("A-1"));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["lines"][0]["qty"], json!(3));
        assert_eq!(back["createdAt"], json!(1714521600000i64));
    }

    #[test]
    fn test_from_value_prefers_plain_id() {
        let record = RawRecord::from_value(json!({"id": "plain", "_id": "legacy"})).unwrap();
        assert_eq!(record.id.as_deref(), Some("plain"));
        // The unused spelling stays in the payload untouched.
        assert_eq!(record.payload["_id"], json!("legacy"));
    }

    #[test]
    fn test_client_saved_at() {
        let record = RawRecord::new(make_payload(&[(
            "client_meta",
            json!({"saved_at": 1714521600000i64}),
        )]));
        assert_eq!(record.client_saved_at(), Some(&json!(1714521600000i64)));

        let bare = RawRecord::new(Map::new());
        assert!(bare.client_saved_at().is_none());
    }
}
