//! Optimistic read-validate-write transactions over a [`DocumentStore`].
//!
//! [`run`] is the single serialization boundary of the ledger core:
//!
//! 1. fetch the declared keys and remember the version of each,
//! 2. run the business closure against that snapshot (it may fail with any
//!    business error, in which case nothing is written),
//! 3. commit the buffered writes guarded by the remembered versions,
//! 4. on [`StoreError::Conflict`], back off and start again from step 1.
//!
//! The closure is synchronous and pure over the snapshot, so rerunning it
//! is always safe.

use std::collections::HashMap;
use std::time::Duration;

use super::models::{DocKey, DocWrite, Document, ReadStamp, Versioned};
use super::{DocumentStore, StoreError};
use crate::error::LedgerError;

/// Bounded retry budget for conflicting commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles on every further one.
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Backoff to wait after `attempt` (1-based) lost a race.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(6);
        self.base_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(10),
        }
    }
}

/// A snapshot of declared documents plus the writes buffered against it.
///
/// Reads see the transaction's own buffered writes first. Only keys
/// declared up front may be read or overwritten; brand-new keys (log
/// entries, fresh ids) are added with [`Transaction::insert`].
#[derive(Debug)]
pub struct Transaction {
    snapshot: HashMap<DocKey, Option<Versioned>>,
    writes: Vec<DocWrite>,
}

impl Transaction {
    fn new(keys: &[DocKey], mut fetched: HashMap<DocKey, Versioned>) -> Self {
        let snapshot = keys
            .iter()
            .map(|key| (key.clone(), fetched.remove(key)))
            .collect();
        Self {
            snapshot,
            writes: Vec::new(),
        }
    }

    fn pending(&self, key: &DocKey) -> Option<&DocWrite> {
        self.writes.iter().find(|w| &w.key == key)
    }

    /// Reads a document, returning `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if `key` was not declared for
    /// this transaction or the stored body does not decode as `T`.
    pub fn get<T: Document>(&self, key: &DocKey) -> Result<Option<T>, LedgerError> {
        let body = if let Some(write) = self.pending(key) {
            Some(&write.body)
        } else {
            self.snapshot
                .get(key)
                .ok_or_else(|| undeclared(key))?
                .as_ref()
                .map(|doc| &doc.body)
        };

        body.map(|b| serde_json::from_value(b.clone()))
            .transpose()
            .map_err(|e| LedgerError::Internal(format!("corrupt document {key}: {e}")))
    }

    /// Reads a document that must exist.
    ///
    /// # Errors
    ///
    /// Returns `missing()` if the document does not exist, or any error
    /// of [`Transaction::get`].
    pub fn require<T: Document>(
        &self,
        key: &DocKey,
        missing: impl FnOnce() -> LedgerError,
    ) -> Result<T, LedgerError> {
        self.get(key)?.ok_or_else(missing)
    }

    /// Buffers a create-or-replace of a declared document.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if `key` was not declared or the
    /// document does not serialize.
    pub fn put<T: Document>(&mut self, key: &DocKey, doc: &T) -> Result<(), LedgerError> {
        let expected_version = self
            .snapshot
            .get(key)
            .ok_or_else(|| undeclared(key))?
            .as_ref()
            .map_or(0, |d| d.version);
        self.buffer(key, expected_version, doc)
    }

    /// Buffers the insertion of a document that must not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if the document does not
    /// serialize or the key was already written in this transaction.
    pub fn insert<T: Document>(&mut self, key: &DocKey, doc: &T) -> Result<(), LedgerError> {
        if self.pending(key).is_some() {
            return Err(LedgerError::Internal(format!(
                "document {key} inserted twice in one transaction"
            )));
        }
        self.buffer(key, 0, doc)
    }

    fn buffer<T: Document>(
        &mut self,
        key: &DocKey,
        expected_version: i64,
        doc: &T,
    ) -> Result<(), LedgerError> {
        let body = serde_json::to_value(doc)
            .map_err(|e| LedgerError::Internal(format!("cannot encode {key}: {e}")))?;
        self.writes.retain(|w| &w.key != key);
        self.writes.push(DocWrite {
            key: key.clone(),
            expected_version,
            body,
        });
        Ok(())
    }

    fn into_parts(self) -> (Vec<ReadStamp>, Vec<DocWrite>) {
        let reads = self
            .snapshot
            .into_iter()
            .map(|(key, doc)| ReadStamp {
                key,
                version: doc.map_or(0, |d| d.version),
            })
            .collect();
        (reads, self.writes)
    }
}

fn undeclared(key: &DocKey) -> LedgerError {
    LedgerError::Internal(format!("document {key} was not declared for this transaction"))
}

/// Runs `body` as an optimistic transaction over `keys`.
///
/// Business errors returned by `body` abort immediately without writing.
/// Commit conflicts are retried with exponential backoff up to
/// [`RetryPolicy::max_attempts`]; after that the call fails with
/// [`LedgerError::Conflict`].
///
/// # Errors
///
/// Returns the closure's error, [`LedgerError::Conflict`] when retries are
/// exhausted, or [`LedgerError::Persistence`] on backend failure.
pub async fn run<S, T, F>(
    store: &S,
    policy: RetryPolicy,
    op: &'static str,
    keys: &[DocKey],
    mut body: F,
) -> Result<T, LedgerError>
where
    S: DocumentStore,
    T: Send,
    F: FnMut(&mut Transaction) -> Result<T, LedgerError> + Send,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);

        let fetched = store.fetch(keys).await?;
        let mut txn = Transaction::new(keys, fetched);
        let value = body(&mut txn)?;
        let (reads, writes) = txn.into_parts();

        if writes.is_empty() {
            return Ok(value);
        }

        match store.commit(&reads, &writes).await {
            Ok(()) => return Ok(value),
            Err(StoreError::Conflict(key)) if attempt < max_attempts => {
                let wait = policy.backoff(attempt);
                tracing::warn!(op, %key, attempt, ?wait, "commit conflict, retrying");
                tokio::time::sleep(wait).await;
            }
            Err(StoreError::Conflict(key)) => {
                tracing::warn!(op, %key, attempts = attempt, "commit conflict, giving up");
                return Err(LedgerError::Conflict { attempts: attempt });
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::persistence::MemoryStore;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Counter {
        n: i64,
    }

    impl Document for Counter {
        const COLLECTION: &'static str = "counters";
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
        }
    }

    async fn bump(store: &MemoryStore, key: &DocKey) -> Result<i64, LedgerError> {
        run(store, policy(), "bump", std::slice::from_ref(key), |txn| {
            let mut c = txn.get::<Counter>(key)?.unwrap_or(Counter { n: 0 });
            c.n += 1;
            txn.put(key, &c)?;
            Ok(c.n)
        })
        .await
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy {
            max_attempts: 5,
            base_backoff: Duration::from_millis(10),
        };
        assert_eq!(p.backoff(1), Duration::from_millis(10));
        assert_eq!(p.backoff(2), Duration::from_millis(20));
        assert_eq!(p.backoff(3), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn commits_and_reads_back() {
        let store = MemoryStore::new();
        let key = DocKey::of::<Counter>("c");
        assert_eq!(bump(&store, &key).await.ok(), Some(1));
        assert_eq!(bump(&store, &key).await.ok(), Some(2));
    }

    #[tokio::test]
    async fn business_error_writes_nothing() {
        let store = MemoryStore::new();
        let key = DocKey::of::<Counter>("c");
        let result: Result<(), LedgerError> =
            run(&store, policy(), "fail", std::slice::from_ref(&key), |txn| {
                txn.put(&key, &Counter { n: 7 })?;
                Err(LedgerError::Validation("nope".to_string()))
            })
            .await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn undeclared_key_is_internal_error() {
        let store = MemoryStore::new();
        let declared = DocKey::of::<Counter>("a");
        let other = DocKey::of::<Counter>("b");
        let result = run(&store, policy(), "undeclared", &[declared], |txn| {
            txn.get::<Counter>(&other)
        })
        .await;
        assert!(matches!(result, Err(LedgerError::Internal(_))));
    }

    #[tokio::test]
    async fn reads_see_buffered_writes() {
        let store = MemoryStore::new();
        let key = DocKey::of::<Counter>("c");
        let seen = run(&store, policy(), "ryw", std::slice::from_ref(&key), |txn| {
            txn.put(&key, &Counter { n: 3 })?;
            txn.require::<Counter>(&key, || LedgerError::NotFound("counter".to_string()))
        })
        .await;
        assert_eq!(seen.ok(), Some(Counter { n: 3 }));
    }

    #[tokio::test]
    async fn conflicting_writer_forces_rerun() {
        let store = MemoryStore::new();
        let key = DocKey::of::<Counter>("c");
        let runs = Arc::new(AtomicU32::new(0));

        let result = {
            let runs = Arc::clone(&runs);
            let store2 = store.clone();
            let key2 = key.clone();
            run(&store, policy(), "race", std::slice::from_ref(&key), move |txn| {
                let first = runs.fetch_add(1, Ordering::SeqCst) == 0;
                if first {
                    // Sneak a competing commit in between read and commit.
                    let competing = DocWrite {
                        key: key2.clone(),
                        expected_version: 0,
                        body: serde_json::json!({ "n": 100 }),
                    };
                    let handle = tokio::runtime::Handle::current();
                    let store3 = store2.clone();
                    std::thread::spawn(move || {
                        handle.block_on(async { store3.commit(&[], &[competing]).await })
                    })
                    .join()
                    .ok();
                }
                let mut c = txn.get::<Counter>(&key2)?.unwrap_or(Counter { n: 0 });
                c.n += 1;
                txn.put(&key2, &c)?;
                Ok(c.n)
            })
            .await
        };

        assert_eq!(result.ok(), Some(101));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_conflict() {
        let store = MemoryStore::new();
        let key = DocKey::of::<Counter>("c");
        let store2 = store.clone();
        let key2 = key.clone();
        let n = Arc::new(AtomicU32::new(0));
        let n2 = Arc::clone(&n);

        let result = run(&store, policy(), "hot", std::slice::from_ref(&key), move |txn| {
            // Every attempt loses against a competing writer.
            let version = i64::from(n2.fetch_add(1, Ordering::SeqCst));
            let competing = DocWrite {
                key: key2.clone(),
                expected_version: version,
                body: serde_json::json!({ "n": version }),
            };
            let handle = tokio::runtime::Handle::current();
            let store3 = store2.clone();
            std::thread::spawn(move || {
                handle.block_on(async { store3.commit(&[], &[competing]).await })
            })
            .join()
            .ok();
            txn.put(&key2, &Counter { n: -1 })?;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(LedgerError::Conflict { attempts: 3 })));
    }
}
