//! The upsert strategy cascade
//!
//! Strategies run strictly in order, each as an independently testable
//! attempt with an explicit tagged outcome:
//!
//! - full replace by id (when an id is known)
//! - partial update by id, when full replace is a capability miss
//! - delete-then-recreate, when the domain refuses update forms outright
//! - blind create (when no id is known), recovering from a uniqueness
//!   conflict by re-fetching the key and retrying against the existing id
//!
//! A later strategy never starts before the previous outcome is known, and
//! there is no cancellation once a save begins: abandoning the store midway
//! through the delete/recreate gap would be worse than finishing. Every
//! successful path ends with a re-fetch-and-reconcile of the logical key, so
//! the caller's view is the store's true state rather than an optimistic
//! local write.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value as JsonValue};

use super::{surface, SaveError};
use crate::changelog::{ChangeEntry, ChangeLog};
use crate::record::{CanonicalRecord, LogicalKey, RawRecord, Reconciler};
use crate::remote::{DocumentStore, StoreError};

/// Outcome of a single strategy attempt.
#[derive(Debug)]
enum AttemptOutcome {
    Done(RawRecord),
    /// Capability miss; the next strategy gets its turn.
    TryNext(StoreError),
    /// The domain refuses update forms outright; fall through to
    /// delete-then-recreate.
    Recreate(StoreError),
    /// Uniqueness conflict on create; re-fetch the key and retry by id.
    ConflictRetry(StoreError),
    /// Business or transient failure; the cascade stops here.
    Abort(StoreError),
}

/// Persists edits through the strategy cascade, converging to one stored
/// record per logical key. Stateless between calls except for the store
/// handle itself.
pub struct UpsertCoordinator {
    store: Arc<dyn DocumentStore>,
    reconciler: Reconciler,
}

impl UpsertCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            reconciler: Reconciler::new(),
        }
    }

    pub fn with_reconciler(store: Arc<dyn DocumentStore>, reconciler: Reconciler) -> Self {
        Self { store, reconciler }
    }

    /// List a document type and reconcile it to one canonical record per
    /// logical key.
    pub async fn fetch_reconciled(
        &self,
        document_type: &str,
    ) -> Result<HashMap<LogicalKey, CanonicalRecord>, StoreError> {
        let mut records = self.store.list(document_type).await?;
        // A record listed under a type is of that type even when its payload
        // forgot to say so.
        for record in &mut records {
            if !record.payload.contains_key("documentType") && !record.payload.contains_key("type")
            {
                record
                    .payload
                    .insert("documentType".into(), json!(document_type));
            }
        }
        Ok(self.reconciler.reconcile(records))
    }

    /// Persist `payload` as the one record for `key`.
    ///
    /// On success exactly one record for the key holds the new payload (plus
    /// bookkeeping fields), and the returned id reflects a mandatory
    /// re-fetch of the store, never a synthesized local state. On terminal
    /// failure the last underlying error propagates verbatim and no rollback
    /// is attempted.
    pub async fn save(
        &self,
        key: &LogicalKey,
        current: Option<&CanonicalRecord>,
        payload: Map<String, JsonValue>,
    ) -> Result<String, SaveError> {
        let record = stamp(key, payload);

        match current.and_then(|c| c.id.as_deref()) {
            Some(id) => self.save_by_id(&key.document_type, id, &record).await?,
            None => self.blind_create(key, &record).await?,
        };

        self.refetch_winner(key).await
    }

    /// Merge item changes into the stored changelog for `key` and persist
    /// the result. The store has no append primitive, so the whole entries
    /// list rides along: fetch, merge, upsert back.
    pub async fn sync_changelog(
        &self,
        key: &LogicalKey,
        incoming: Vec<ChangeEntry>,
    ) -> Result<ChangeLog, SaveError> {
        let log_key = LogicalKey::new(
            format!("{}_changes", key.document_type),
            key.scope.clone(),
            key.date,
        );

        let canonical = self.fetch_reconciled(&log_key.document_type).await?;
        let current = canonical.get(&log_key);

        let mut changelog = match current {
            Some(c) => ChangeLog::from_record(log_key.clone(), &c.record),
            None => ChangeLog::new(log_key.clone()),
        };
        changelog.merge(incoming);

        self.save(&log_key, current, changelog.to_payload()).await?;
        Ok(changelog)
    }

    /// The identity cascade: full replace, then partial update, then
    /// delete-then-recreate.
    async fn save_by_id(
        &self,
        document_type: &str,
        id: &str,
        record: &RawRecord,
    ) -> Result<RawRecord, SaveError> {
        let outcome = match self.attempt_replace(document_type, id, record).await {
            AttemptOutcome::Done(stored) => return Ok(stored),
            AttemptOutcome::TryNext(e) => {
                log::warn!(
                    "Full update of {}/{} unavailable ({}); trying partial update",
                    document_type,
                    id,
                    e
                );
                self.attempt_patch(document_type, id, record).await
            }
            other => other,
        };

        match outcome {
            AttemptOutcome::Done(stored) => Ok(stored),
            AttemptOutcome::TryNext(e) | AttemptOutcome::Recreate(e) => {
                log::warn!(
                    "Updates of {}/{} not accepted ({}); recreating",
                    document_type,
                    id,
                    e
                );
                self.recreate(document_type, id, record).await
            }
            AttemptOutcome::ConflictRetry(e) | AttemptOutcome::Abort(e) => Err(surface(e)),
        }
    }

    /// No id known: create, and on a uniqueness conflict discover the
    /// existing record and write against it instead. This is the one
    /// automatic retry in the whole protocol.
    async fn blind_create(
        &self,
        key: &LogicalKey,
        record: &RawRecord,
    ) -> Result<RawRecord, SaveError> {
        match self.attempt_create(&key.document_type, record).await {
            AttemptOutcome::Done(stored) => Ok(stored),
            AttemptOutcome::ConflictRetry(conflict) => {
                let canonical = self.fetch_reconciled(&key.document_type).await?;
                match canonical.get(key).and_then(|c| c.id.clone()) {
                    Some(id) => {
                        log::warn!(
                            "Create of {} conflicted; retrying against existing record {}",
                            key,
                            id
                        );
                        self.save_by_id(&key.document_type, &id, record).await
                    }
                    // Conflicted but nothing listed under the key: surface
                    // the conflict rather than looping.
                    None => Err(surface(conflict)),
                }
            }
            AttemptOutcome::TryNext(e) | AttemptOutcome::Recreate(e) | AttemptOutcome::Abort(e) => {
                Err(surface(e))
            }
        }
    }

    /// Delete by id (outcome ignored), then create fresh.
    async fn recreate(
        &self,
        document_type: &str,
        id: &str,
        record: &RawRecord,
    ) -> Result<RawRecord, SaveError> {
        if let Err(e) = self.store.delete(document_type, id).await {
            log::warn!("Ignoring delete failure for {}/{}: {}", document_type, id, e);
        }
        match self.attempt_create(document_type, record).await {
            AttemptOutcome::Done(stored) => Ok(stored),
            AttemptOutcome::TryNext(e)
            | AttemptOutcome::Recreate(e)
            | AttemptOutcome::ConflictRetry(e)
            | AttemptOutcome::Abort(e) => Err(surface(e)),
        }
    }

    async fn attempt_replace(
        &self,
        document_type: &str,
        id: &str,
        record: &RawRecord,
    ) -> AttemptOutcome {
        classify_update(self.store.replace(document_type, id, record).await)
    }

    async fn attempt_patch(
        &self,
        document_type: &str,
        id: &str,
        record: &RawRecord,
    ) -> AttemptOutcome {
        classify_update(self.store.patch(document_type, id, &record.payload).await)
    }

    async fn attempt_create(&self, document_type: &str, record: &RawRecord) -> AttemptOutcome {
        match self.store.create(document_type, record).await {
            Ok(stored) => AttemptOutcome::Done(stored),
            Err(e @ StoreError::Conflict(_)) => AttemptOutcome::ConflictRetry(e),
            Err(e) => AttemptOutcome::Abort(e),
        }
    }

    /// The mandatory post-save re-fetch: the caller gets the store's actual
    /// winner for the key.
    async fn refetch_winner(&self, key: &LogicalKey) -> Result<String, SaveError> {
        let canonical = self.fetch_reconciled(&key.document_type).await?;
        let winner = canonical.get(key).ok_or_else(|| {
            StoreError::Payload(format!("no record for {key} after a successful save"))
        })?;
        winner
            .id
            .clone()
            .ok_or_else(|| SaveError::from(StoreError::Payload(format!("record for {key} has no id"))))
    }
}

fn classify_update(result: Result<RawRecord, StoreError>) -> AttemptOutcome {
    match result {
        Ok(stored) => AttemptOutcome::Done(stored),
        Err(e) if e.is_capability_miss() => AttemptOutcome::TryNext(e),
        Err(e @ StoreError::Rejected(_)) => AttemptOutcome::Recreate(e),
        Err(e) => AttemptOutcome::Abort(e),
    }
}

/// Ensure the payload carries its logical-key fields and a client save
/// instant, and wrap it as an unpersisted record.
fn stamp(key: &LogicalKey, mut payload: Map<String, JsonValue>) -> RawRecord {
    payload.insert("documentType".into(), json!(key.document_type));
    payload.insert("scope".into(), json!(key.scope));
    payload.insert("date".into(), json!(key.date.to_string()));
    payload.insert(
        "client_meta".into(),
        json!({"saved_at": Utc::now().timestamp_millis()}),
    );
    RawRecord::new(payload)
}
