//! Reconciliation: many physical records, one canonical record per key
//!
//! The store holds an unknown number of physical records per logical report.
//! Reconciliation folds them down to one winner per key by resolved instant,
//! latest-wins. Records whose logical key cannot be derived are dropped
//! silently, degrading to a smaller-but-valid result instead of failing.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use super::timestamp::{resolve_record, ResolverOptions};
use super::{CanonicalRecord, LogicalKey, RawRecord};

/// Ordering of [`Reconciler::ordered_view`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Oldest report date first (browsing).
    Ascending,
    /// Most recent report date first.
    Descending,
}

/// Groups raw records by logical identity and selects the canonical one.
#[derive(Debug, Default, Clone)]
pub struct Reconciler {
    options: ResolverOptions,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ResolverOptions) -> Self {
        Self { options }
    }

    /// Collapse raw records into one canonical record per logical key.
    ///
    /// Latest resolved instant wins; on equal instants the later-encountered
    /// record wins, which is deterministic for a fixed input order. Records
    /// without a derivable key are dropped. Never fails.
    pub fn reconcile(
        &self,
        records: impl IntoIterator<Item = RawRecord>,
    ) -> HashMap<LogicalKey, CanonicalRecord> {
        let mut canonical: HashMap<LogicalKey, CanonicalRecord> = HashMap::new();

        for record in records {
            let Some(key) = LogicalKey::derive(&record) else {
                log::debug!(
                    "dropping record {} from reconciliation: no logical key",
                    record.id.as_deref().unwrap_or("<unpersisted>")
                );
                continue;
            };

            let candidate = CanonicalRecord {
                key: key.clone(),
                id: record.id.clone(),
                resolved_at: resolve_record(&record, &self.options),
                record,
            };

            match canonical.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
                Entry::Occupied(mut slot) => {
                    if candidate.resolved_at >= slot.get().resolved_at {
                        slot.insert(candidate);
                    }
                }
            }
        }

        canonical
    }

    /// Canonical records ordered by report date, with a stable secondary
    /// order on (document type, scope) so equal dates don't shuffle.
    pub fn ordered_view<'a>(
        map: &'a HashMap<LogicalKey, CanonicalRecord>,
        direction: SortDirection,
    ) -> Vec<&'a CanonicalRecord> {
        let mut view: Vec<&CanonicalRecord> = map.values().collect();
        view.sort_by(|a, b| {
            let ord = a
                .key
                .date
                .cmp(&b.key.date)
                .then_with(|| a.key.document_type.cmp(&b.key.document_type))
                .then_with(|| a.key.scope.cmp(&b.key.scope));
            match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        });
        view
    }
}
