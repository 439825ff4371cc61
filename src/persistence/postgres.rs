//! PostgreSQL implementation of the document store.
//!
//! All collections share one `documents` table (see `migrations/`). A
//! commit runs inside a single SQL transaction: every stamped row is
//! locked with `SELECT … FOR UPDATE` in key order, its version compared
//! with the stamp, and only then are the writes applied. Inserts of keys
//! that were read as absent rely on the primary key to reject a
//! concurrent insert.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::models::{DocKey, DocWrite, ReadStamp, Versioned};
use super::{DocumentStore, StoreError};
use crate::config::LedgerConfig;

/// SQLSTATE codes that mean "another writer won, try again".
const RETRYABLE_SQLSTATES: [&str; 2] = ["40001", "40P01"];

/// PostgreSQL-backed document store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool from configuration and runs migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the database is unreachable or a
    /// migration fails.
    pub async fn connect(config: &LedgerConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(backend)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        tracing::info!(
            max_connections = config.database_max_connections,
            "connected to postgres document store"
        );
        Ok(Self::new(pool))
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Maps a write failure to [`StoreError::Conflict`] when the database
/// reports a lost race (duplicate key, serialization failure, deadlock).
fn classify(e: sqlx::Error, key: &DocKey) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        let retryable = db
            .code()
            .is_some_and(|code| RETRYABLE_SQLSTATES.contains(&&*code));
        if db.is_unique_violation() || retryable {
            return StoreError::Conflict(key.clone());
        }
    }
    backend(e)
}

impl DocumentStore for PostgresStore {
    async fn fetch(&self, keys: &[DocKey]) -> Result<HashMap<DocKey, Versioned>, StoreError> {
        let collections: Vec<String> = keys.iter().map(|k| k.collection.to_string()).collect();
        let ids: Vec<String> = keys.iter().map(|k| k.id.clone()).collect();

        let rows = sqlx::query_as::<_, (String, String, i64, serde_json::Value)>(
            "SELECT d.collection, d.id, d.version, d.body FROM documents d \
             JOIN UNNEST($1::text[], $2::text[]) AS k(collection, id) \
             ON d.collection = k.collection AND d.id = k.id",
        )
        .bind(&collections)
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .into_iter()
            .filter_map(|(collection, id, version, body)| {
                keys.iter()
                    .find(|k| k.collection == collection && k.id == id)
                    .map(|k| (k.clone(), Versioned { version, body }))
            })
            .collect())
    }

    async fn commit(&self, reads: &[ReadStamp], writes: &[DocWrite]) -> Result<(), StoreError> {
        // Every key the commit depends on, with the version it must have.
        // BTreeMap gives a stable lock order across concurrent commits.
        let mut guards: BTreeMap<&DocKey, i64> = BTreeMap::new();
        for stamp in reads {
            guards.insert(&stamp.key, stamp.version);
        }
        for write in writes {
            guards.insert(&write.key, write.expected_version);
        }

        let mut tx = self.pool.begin().await.map_err(backend)?;

        for (key, expected) in &guards {
            let current = sqlx::query_scalar::<_, i64>(
                "SELECT version FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
            )
            .bind(key.collection)
            .bind(&key.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| classify(e, key))?
            .unwrap_or(0);

            if current != *expected {
                return Err(StoreError::Conflict((*key).clone()));
            }
        }

        for write in writes {
            if write.expected_version == 0 {
                sqlx::query(
                    "INSERT INTO documents (collection, id, version, body) VALUES ($1, $2, 1, $3)",
                )
                .bind(write.key.collection)
                .bind(&write.key.id)
                .bind(&write.body)
                .execute(&mut *tx)
                .await
                .map_err(|e| classify(e, &write.key))?;
            } else {
                let result = sqlx::query(
                    "UPDATE documents SET body = $3, version = version + 1, updated_at = now() \
                     WHERE collection = $1 AND id = $2 AND version = $4",
                )
                .bind(write.key.collection)
                .bind(&write.key.id)
                .bind(&write.body)
                .bind(write.expected_version)
                .execute(&mut *tx)
                .await
                .map_err(|e| classify(e, &write.key))?;

                if result.rows_affected() != 1 {
                    return Err(StoreError::Conflict(write.key.clone()));
                }
            }
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn find_by(
        &self,
        collection: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT body FROM documents WHERE collection = $1 AND body ->> $2 = $3",
        )
        .bind(collection)
        .bind(field)
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }
}
