//! # monorec
//!
//! A client layer that makes a weak remote document store behave as if
//! exactly one authoritative record existed per logical report.
//!
//! The store offers no uniqueness guarantee per logical report, an
//! inconsistent set of update verbs, non-atomic writes, and patchy timestamp
//! metadata. This crate supplies the missing discipline on the client side:
//!
//! - **Timestamp resolution**: best-effort canonical instant extraction from
//!   whatever metadata a record happens to carry ([`record::timestamp`])
//! - **Reconciliation**: collapsing duplicate physical records into one
//!   canonical record per logical key, latest-wins ([`record::reconcile`])
//! - **Changelog merge**: latest-wins merge of per-item change histories
//!   ([`changelog`])
//! - **Idempotent upsert**: a cascade of write strategies that converges to
//!   one stored record per logical key without knowing in advance which
//!   verbs the backend accepts ([`upsert`])
//!
//! ## Example
//!
//! ```ignore
//! use monorec::{HttpDocumentStore, HttpStoreConfig, UpsertCoordinator};
//!
//! let store = HttpDocumentStore::new(HttpStoreConfig {
//!     base_url: "https://reports.example.com/api".into(),
//!     ..Default::default()
//! })?;
//! let coordinator = UpsertCoordinator::new(Arc::new(store));
//!
//! let canonical = coordinator.fetch_reconciled("returns").await?;
//! let current = canonical.get(&key);
//! let id = coordinator.save(&key, current, new_payload).await?;
//! ```
//!
//! Consumers (UI, export, navigation) go through [`Reconciler::reconcile`]
//! and [`UpsertCoordinator::save`]; they never talk to the store directly.

pub mod changelog;
pub mod record;
pub mod remote;
pub mod upsert;

// Re-exports
pub use changelog::{item_fingerprint, merge_entries, ChangeEntry, ChangeLog};
pub use record::timestamp::{decode_id_instant, resolve_record, resolve_value, ResolverOptions};
pub use record::{CanonicalRecord, LogicalKey, RawRecord, Reconciler, SortDirection};
pub use remote::{
    DocumentStore, HttpDocumentStore, HttpStoreConfig, SimBehavior, SimDocumentStore, StoreError,
    VerbSupport,
};
pub use upsert::{SaveError, UpsertCoordinator};
