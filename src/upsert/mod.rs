//! Idempotent upsert against a store with no native upsert primitive
//!
//! A save walks a cascade of write strategies (full replace, partial
//! update, delete-then-recreate, blind create with conflict recovery) until
//! one sticks, then re-fetches the logical key so the caller sees the
//! store's true state. Capability misses advance the cascade; business
//! refusals and network faults stop it.

pub mod coordinator;

pub use coordinator::UpsertCoordinator;

use thiserror::Error;

use crate::remote::StoreError;

/// Failures surfaced by [`UpsertCoordinator::save`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SaveError {
    /// The domain refused the write (validation). Nothing was retried.
    #[error("save rejected: {0}")]
    Rejected(String),

    /// Every applicable strategy was tried; the last underlying error,
    /// verbatim. No rollback was attempted, so a partial failure stays
    /// visible.
    #[error("all write strategies exhausted: {0}")]
    Exhausted(StoreError),

    /// A transient store fault, surfaced immediately and never retried
    /// automatically.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Map a terminal store failure onto the save taxonomy.
fn surface(err: StoreError) -> SaveError {
    match err {
        StoreError::Rejected(message) => SaveError::Rejected(message),
        StoreError::Network(_) => SaveError::Store(err),
        other => SaveError::Exhausted(other),
    }
}
