//! The abstract document store interface
//!
//! Every remote capability the crate relies on, and nothing more. All verbs
//! beyond `list` and `create` are best-effort: a backend is free to answer
//! with a capability miss and the upsert cascade will route around it.

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use super::StoreError;
use crate::record::RawRecord;

/// A remote document store keyed by opaque identifiers and a type tag.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List every record of a document type.
    async fn list(&self, document_type: &str) -> Result<Vec<RawRecord>, StoreError>;

    /// Create a new record. The store assigns the id; any id on the input is
    /// ignored. Returns the stored record.
    async fn create(
        &self,
        document_type: &str,
        record: &RawRecord,
    ) -> Result<RawRecord, StoreError>;

    /// Fully replace the record with the given id.
    async fn replace(
        &self,
        document_type: &str,
        id: &str,
        record: &RawRecord,
    ) -> Result<RawRecord, StoreError>;

    /// Partially update the record with the given id: the fields are merged
    /// into the stored payload.
    async fn patch(
        &self,
        document_type: &str,
        id: &str,
        fields: &Map<String, JsonValue>,
    ) -> Result<RawRecord, StoreError>;

    /// Delete the record with the given id.
    async fn delete(&self, document_type: &str, id: &str) -> Result<(), StoreError>;
}
