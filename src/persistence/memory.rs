//! In-process document store.
//!
//! All documents live in one `HashMap` behind a [`tokio::sync::RwLock`].
//! Fetches take the read lock and clone bodies out; commits take the write
//! lock, validate every version stamp, and apply the batch before
//! releasing it, so a commit is observed entirely or not at all.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::models::{DocKey, DocWrite, ReadStamp, Versioned};
use super::{DocumentStore, StoreError};

/// Document store kept in process memory.
///
/// Cloning is cheap and clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<HashMap<DocKey, Versioned>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored documents across all collections.
    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    /// Returns `true` if the store holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

fn current_version(docs: &HashMap<DocKey, Versioned>, key: &DocKey) -> i64 {
    docs.get(key).map_or(0, |doc| doc.version)
}

impl DocumentStore for MemoryStore {
    async fn fetch(&self, keys: &[DocKey]) -> Result<HashMap<DocKey, Versioned>, StoreError> {
        let docs = self.docs.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| docs.get(key).map(|doc| (key.clone(), doc.clone())))
            .collect())
    }

    async fn commit(&self, reads: &[ReadStamp], writes: &[DocWrite]) -> Result<(), StoreError> {
        let mut docs = self.docs.write().await;

        for stamp in reads {
            if current_version(&docs, &stamp.key) != stamp.version {
                return Err(StoreError::Conflict(stamp.key.clone()));
            }
        }
        for write in writes {
            if current_version(&docs, &write.key) != write.expected_version {
                return Err(StoreError::Conflict(write.key.clone()));
            }
        }

        for write in writes {
            docs.insert(
                write.key.clone(),
                Versioned {
                    version: write.expected_version.saturating_add(1),
                    body: write.body.clone(),
                },
            );
        }
        Ok(())
    }

    async fn find_by(
        &self,
        collection: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs
            .iter()
            .filter(|(key, doc)| {
                key.collection == collection
                    && doc.body.get(field).and_then(serde_json::Value::as_str) == Some(value)
            })
            .map(|(_, doc)| doc.body.clone())
            .collect())
    }
}
