//! Remote document store seam
//!
//! The store is an external collaborator reached over HTTP, keyed by opaque
//! identifiers and a type tag, with at least list-by-type, create, and
//! best-effort update/delete. [`DocumentStore`] is the trait the rest of the
//! crate programs against; [`http::HttpDocumentStore`] talks to the real
//! thing and [`simulated::SimDocumentStore`] is the in-process stand-in with
//! configurable capability gaps, used for integration testing.

pub mod api;
pub mod http;
pub mod simulated;

pub use api::DocumentStore;
pub use http::{HttpDocumentStore, HttpStoreConfig};
pub use simulated::{SimBehavior, SimDocumentStore, VerbSupport};

use thiserror::Error;

/// Failures at the store seam.
///
/// `NotFound` and `MethodNotAllowed` are capability signals (the backend
/// can't do that particular write) and advance the upsert cascade rather
/// than surfacing. `Conflict` is recoverable once via re-fetch. `Rejected`
/// is a business/validation refusal. `Network` is transient and is surfaced
/// immediately, never retried automatically.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),

    #[error("document not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rejected by store: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Payload(String),
}

impl StoreError {
    /// Whether this is a capability miss (the backend lacks the verb or the
    /// target), as opposed to a refusal or a fault.
    pub fn is_capability_miss(&self) -> bool {
        matches!(self, StoreError::NotFound | StoreError::MethodNotAllowed)
    }
}
