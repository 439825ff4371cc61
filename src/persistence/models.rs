//! Storage models: document keys, versioned bodies, and buffered writes.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A typed entity persisted as a JSON document in a named collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Collection (table partition) the document lives in.
    const COLLECTION: &'static str;
}

/// Address of a document: collection plus id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocKey {
    /// Collection name.
    pub collection: &'static str,
    /// Document id, unique within its collection.
    pub id: String,
}

impl DocKey {
    /// Builds the key of document type `T` with the given id.
    #[must_use]
    pub fn of<T: Document>(id: impl fmt::Display) -> Self {
        Self {
            collection: T::COLLECTION,
            id: id.to_string(),
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A stored document body with its version counter.
///
/// Versions start at 1 on insert and grow by one on every update. A key
/// that does not exist is treated as version 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    /// Monotonic version counter.
    pub version: i64,
    /// JSON body.
    pub body: serde_json::Value,
}

/// A buffered write produced by a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct DocWrite {
    /// Target document.
    pub key: DocKey,
    /// Version the document must still have at commit time (0 = absent).
    pub expected_version: i64,
    /// New JSON body.
    pub body: serde_json::Value,
}

/// A document observed by a transaction and the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadStamp {
    /// Document that was read.
    pub key: DocKey,
    /// Version observed (0 = absent).
    pub version: i64,
}
