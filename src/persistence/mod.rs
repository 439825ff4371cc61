//! Persistence layer: versioned document storage with optimistic commits.
//!
//! [`DocumentStore`] is the storage capability the ledger core runs on.
//! It exposes three primitives: fetch a set of documents with their
//! versions, commit a batch of writes guarded by the versions that were
//! read, and scan a collection by a top-level field. Everything else
//! (read-validate-write-log, bounded retry) lives in [`transaction`].
//!
//! Two backends ship with the crate: [`MemoryStore`] for tests and
//! single-node deployments, and [`PostgresStore`] backed by `sqlx::PgPool`.

pub mod memory;
pub mod models;
pub mod postgres;
pub mod transaction;

use std::collections::HashMap;
use std::future::Future;

pub use memory::MemoryStore;
pub use models::{DocKey, DocWrite, Document, ReadStamp, Versioned};
pub use postgres::PostgresStore;
pub use transaction::{RetryPolicy, Transaction};

/// Failures reported by a [`DocumentStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A document changed (or appeared) between read and commit.
    #[error("write conflict on {0}")]
    Conflict(DocKey),

    /// A stored body could not be encoded or decoded.
    #[error("document codec error: {0}")]
    Codec(String),

    /// The backend failed (connection, query, ...).
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Versioned document storage with compare-and-swap commits.
///
/// Implementations must make [`DocumentStore::commit`] all-or-nothing:
/// either every read stamp and every write's expected version still
/// matches and all writes land, or nothing is written and
/// [`StoreError::Conflict`] is returned.
pub trait DocumentStore: Send + Sync + 'static {
    /// Returns the current version and body of each present key.
    /// Absent keys are simply missing from the map.
    fn fetch(
        &self,
        keys: &[DocKey],
    ) -> impl Future<Output = Result<HashMap<DocKey, Versioned>, StoreError>> + Send;

    /// Atomically validates `reads` and applies `writes`.
    fn commit(
        &self,
        reads: &[ReadStamp],
        writes: &[DocWrite],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns the bodies of all documents in `collection` whose top-level
    /// string field `field` equals `value`.
    fn find_by(
        &self,
        collection: &'static str,
        field: &'static str,
        value: &str,
    ) -> impl Future<Output = Result<Vec<serde_json::Value>, StoreError>> + Send;
}

/// Store selected at startup from configuration.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Process-local store.
    Memory(MemoryStore),
    /// PostgreSQL-backed store.
    Postgres(PostgresStore),
}

impl DocumentStore for Backend {
    async fn fetch(&self, keys: &[DocKey]) -> Result<HashMap<DocKey, Versioned>, StoreError> {
        match self {
            Self::Memory(store) => store.fetch(keys).await,
            Self::Postgres(store) => store.fetch(keys).await,
        }
    }

    async fn commit(&self, reads: &[ReadStamp], writes: &[DocWrite]) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.commit(reads, writes).await,
            Self::Postgres(store) => store.commit(reads, writes).await,
        }
    }

    async fn find_by(
        &self,
        collection: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        match self {
            Self::Memory(store) => store.find_by(collection, field, value).await,
            Self::Postgres(store) => store.find_by(collection, field, value).await,
        }
    }
}
