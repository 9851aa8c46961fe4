//! Best-effort canonical instant extraction
//!
//! The store's timestamp metadata is heterogeneous: depending on which
//! generation of writer produced a record, the same field may hold an epoch
//! number, a date string, or nothing, and some records only carry a creation
//! instant inside their 24-hex identifier. Resolution tries each candidate in
//! a fixed order and never fails: a malformed candidate just means the next
//! one is tried, and a record with no usable metadata resolves to zero, which
//! sorts before everything else.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;

use super::RawRecord;

/// Numeric candidates below this are epoch seconds and get promoted to
/// milliseconds. 10^12 ms is 2001-09-09; no report predates that.
const EPOCH_MILLIS_CUTOFF: i64 = 1_000_000_000_000;

/// Resolution options.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Decode 24-hex identifiers as a creation instant (first eight hex
    /// characters, epoch seconds). A legacy of one store-identifier format;
    /// disable when the store carries honest timestamp metadata.
    pub decode_id_instants: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            decode_id_instants: true,
        }
    }
}

/// Resolve a single candidate value to epoch milliseconds.
///
/// Accepts positive epoch numbers (seconds or milliseconds), numeric strings,
/// and calendar-parseable date strings. Anything else is `None`.
pub fn resolve_value(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => {
            let raw = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            promote_epoch(raw)
        }
        JsonValue::String(s) => resolve_string(s),
        _ => None,
    }
}

/// Decode a 24-hex-character identifier as a creation instant: the first
/// eight hex characters are epoch seconds.
pub fn decode_id_instant(id: &str) -> Option<i64> {
    if id.len() != 24 {
        return None;
    }
    let bytes = hex::decode(id).ok()?;
    let prefix: [u8; 4] = bytes[..4].try_into().ok()?;
    Some(i64::from(u32::from_be_bytes(prefix)) * 1000)
}

/// Resolve a record's canonical instant, epoch milliseconds.
///
/// Field precedence: `createdAt`, `updatedAt`, `timestamp`, the external id
/// (when id decoding is enabled), the nested client save instant, then zero.
pub fn resolve_record(record: &RawRecord, options: &ResolverOptions) -> i64 {
    let fields = [
        record.created_at.as_ref(),
        record.updated_at.as_ref(),
        record.timestamp.as_ref(),
    ];
    for candidate in fields.into_iter().flatten() {
        if let Some(instant) = resolve_value(candidate) {
            return instant;
        }
    }

    if options.decode_id_instants {
        if let Some(instant) = record.id.as_deref().and_then(decode_id_instant) {
            return instant;
        }
    }

    if let Some(instant) = record.client_saved_at().and_then(resolve_value) {
        return instant;
    }

    0
}

fn resolve_string(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    // Some writers stringify their epochs.
    if s.chars().all(|c| c.is_ascii_digit()) {
        return promote_epoch(s.parse().ok()?);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
    }

    None
}

fn promote_epoch(raw: i64) -> Option<i64> {
    if raw <= 0 {
        return None;
    }
    if raw < EPOCH_MILLIS_CUTOFF {
        Some(raw * 1000)
    } else {
        Some(raw)
    }
}
