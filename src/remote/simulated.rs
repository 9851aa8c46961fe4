//! In-process document store simulator
//!
//! Stands in for the remote store in tests, the weaknesses included: update
//! verbs can be individually unsupported, uniqueness can be enforced only on
//! create, update forms can be rejected outright, and a one-shot network
//! fault can be injected. Ids follow the legacy 24-hex format whose first
//! eight characters encode the creation instant in epoch seconds.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{DocumentStore, StoreError};
use crate::record::{LogicalKey, RawRecord};

/// How the simulated backend answers a particular update verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbSupport {
    Supported,
    /// The route 404s.
    NotFound,
    /// The route answers 405/501.
    MethodNotAllowed,
}

impl VerbSupport {
    fn gate(self) -> Result<(), StoreError> {
        match self {
            VerbSupport::Supported => Ok(()),
            VerbSupport::NotFound => Err(StoreError::NotFound),
            VerbSupport::MethodNotAllowed => Err(StoreError::MethodNotAllowed),
        }
    }
}

/// Weak-backend behavior knobs.
#[derive(Debug, Clone)]
pub struct SimBehavior {
    pub replace: VerbSupport,
    pub patch: VerbSupport,
    pub delete: VerbSupport,
    /// Enforce one record per logical key on create (409 otherwise).
    pub unique_keys: bool,
    /// Reject replace/patch outright as a domain refusal (not a missing
    /// capability).
    pub reject_updates: bool,
    /// Reject create as a validation failure.
    pub reject_creates: bool,
}

impl Default for SimBehavior {
    fn default() -> Self {
        Self {
            replace: VerbSupport::Supported,
            patch: VerbSupport::Supported,
            delete: VerbSupport::Supported,
            unique_keys: false,
            reject_updates: false,
            reject_creates: false,
        }
    }
}

struct SimState {
    /// document type -> id -> record. BTreeMap keeps listing order stable.
    documents: HashMap<String, BTreeMap<String, RawRecord>>,
    behavior: SimBehavior,
    fail_next: Option<String>,
    /// Epoch seconds used for id prefixes; bumped per create so ids encode
    /// strictly increasing instants.
    clock: u32,
}

/// In-process [`DocumentStore`] with configurable weaknesses.
pub struct SimDocumentStore {
    state: Mutex<SimState>,
}

impl SimDocumentStore {
    pub fn new() -> Self {
        Self::with_behavior(SimBehavior::default())
    }

    pub fn with_behavior(behavior: SimBehavior) -> Self {
        Self {
            state: Mutex::new(SimState {
                documents: HashMap::new(),
                behavior,
                fail_next: None,
                clock: Utc::now().timestamp() as u32,
            }),
        }
    }

    pub async fn set_behavior(&self, behavior: SimBehavior) {
        self.state.lock().await.behavior = behavior;
    }

    /// Make the next store call fail with a network error.
    pub async fn fail_next(&self, message: impl Into<String>) {
        self.state.lock().await.fail_next = Some(message.into());
    }

    /// Insert a record as-is, id included. Test seeding only; bypasses every
    /// behavior knob.
    pub async fn seed(&self, document_type: &str, record: RawRecord) {
        let id = record.id.clone().expect("seeded records need an id");
        self.state
            .lock()
            .await
            .documents
            .entry(document_type.to_string())
            .or_default()
            .insert(id, record);
    }

    pub async fn records(&self, document_type: &str) -> Vec<RawRecord> {
        self.state
            .lock()
            .await
            .documents
            .get(document_type)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn count(&self, document_type: &str) -> usize {
        self.records(document_type).await.len()
    }

    fn generate_id(clock: u32) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{:08x}{}", clock, &suffix[..16])
    }
}

impl Default for SimDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn take_fault(state: &mut SimState) -> Result<(), StoreError> {
    match state.fail_next.take() {
        Some(message) => Err(StoreError::Network(message)),
        None => Ok(()),
    }
}

#[async_trait]
impl DocumentStore for SimDocumentStore {
    async fn list(&self, document_type: &str) -> Result<Vec<RawRecord>, StoreError> {
        let mut state = self.state.lock().await;
        take_fault(&mut state)?;
        Ok(state
            .documents
            .get(document_type)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn create(
        &self,
        document_type: &str,
        record: &RawRecord,
    ) -> Result<RawRecord, StoreError> {
        let mut state = self.state.lock().await;
        take_fault(&mut state)?;

        if state.behavior.reject_creates {
            return Err(StoreError::Rejected("validation failed".into()));
        }

        if state.behavior.unique_keys {
            if let Some(key) = LogicalKey::derive(record) {
                let duplicate = state
                    .documents
                    .get(document_type)
                    .map(|docs| {
                        docs.values()
                            .any(|existing| LogicalKey::derive(existing).as_ref() == Some(&key))
                    })
                    .unwrap_or(false);
                if duplicate {
                    return Err(StoreError::Conflict(format!(
                        "duplicate record for {key}"
                    )));
                }
            }
        }

        state.clock += 1;
        let id = Self::generate_id(state.clock);
        let mut stored = record.clone();
        stored.id = Some(id.clone());
        state
            .documents
            .entry(document_type.to_string())
            .or_default()
            .insert(id, stored.clone());
        Ok(stored)
    }

    async fn replace(
        &self,
        document_type: &str,
        id: &str,
        record: &RawRecord,
    ) -> Result<RawRecord, StoreError> {
        let mut state = self.state.lock().await;
        take_fault(&mut state)?;
        state.behavior.replace.gate()?;
        if state.behavior.reject_updates {
            return Err(StoreError::Rejected("updates are not accepted".into()));
        }

        let docs = state
            .documents
            .get_mut(document_type)
            .ok_or(StoreError::NotFound)?;
        if !docs.contains_key(id) {
            return Err(StoreError::NotFound);
        }

        let mut stored = record.clone();
        stored.id = Some(id.to_string());
        docs.insert(id.to_string(), stored.clone());
        Ok(stored)
    }

    async fn patch(
        &self,
        document_type: &str,
        id: &str,
        fields: &Map<String, JsonValue>,
    ) -> Result<RawRecord, StoreError> {
        let mut state = self.state.lock().await;
        take_fault(&mut state)?;
        state.behavior.patch.gate()?;
        if state.behavior.reject_updates {
            return Err(StoreError::Rejected("updates are not accepted".into()));
        }

        let stored = state
            .documents
            .get_mut(document_type)
            .and_then(|docs| docs.get_mut(id))
            .ok_or(StoreError::NotFound)?;
        for (name, value) in fields {
            stored.payload.insert(name.clone(), value.clone());
        }
        Ok(stored.clone())
    }

    async fn delete(&self, document_type: &str, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        take_fault(&mut state)?;
        state.behavior.delete.gate()?;

        state
            .documents
            .get_mut(document_type)
            .and_then(|docs| docs.remove(id))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}
