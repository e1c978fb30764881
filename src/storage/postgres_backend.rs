//! PostgreSQL-based document backend.
//!
//! Documents live in a single JSONB table keyed by `(namespace, collection,
//! doc_key)`:
//!
//! ```sql
//! CREATE TABLE documents (
//!     namespace  TEXT        NOT NULL,
//!     collection TEXT        NOT NULL,
//!     doc_key    TEXT        NOT NULL,
//!     body       JSONB       NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     PRIMARY KEY (namespace, collection, doc_key)
//! );
//! ```

use async_trait::async_trait;

use crate::postgres::{PostgresPool, PostgresPoolError};

use super::backend::{DocumentBackend, StorageError};

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        namespace  TEXT        NOT NULL,
        collection TEXT        NOT NULL,
        doc_key    TEXT        NOT NULL,
        body       JSONB       NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (namespace, collection, doc_key)
    )
"#;

// left() instead of LIKE so '%' and '_' in keys need no escaping. The "C"
// collation orders keys bytewise, like the other backends.
const SCAN_PREFIX_SQL: &str = r#"
    SELECT doc_key, body FROM documents
    WHERE namespace = $1 AND collection = $2
      AND left(doc_key, char_length($3)) = $3
    ORDER BY doc_key COLLATE "C"
"#;

pub struct PostgresBackend {
    pool: PostgresPool,
    namespace: String,
}

impl PostgresBackend {
    pub fn new(pool: PostgresPool, namespace: String) -> Self {
        Self { pool, namespace }
    }

    /// Create the documents table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        self.pool
            .execute(|pool| async move { sqlx::query(CREATE_TABLE_SQL).execute(&pool).await })
            .await
            .map_err(Self::map_error)?;

        tracing::info!(
            url = %self.pool.database_url_masked(),
            "PostgreSQL documents table ready"
        );
        Ok(())
    }

    pub(crate) fn map_error(err: PostgresPoolError) -> StorageError {
        match err {
            PostgresPoolError::Sqlx(e) => StorageError::Postgres(e),
            PostgresPoolError::CircuitOpen => {
                StorageError::Unavailable("PostgreSQL circuit breaker is open".to_string())
            }
        }
    }
}

#[async_trait]
impl DocumentBackend for PostgresBackend {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        document: serde_json::Value,
    ) -> Result<(), StorageError> {
        let namespace = self.namespace.clone();
        let collection = collection.to_string();
        let key = key.to_string();

        self.pool
            .execute(|pool| async move {
                sqlx::query(
                    r#"
                    INSERT INTO documents (namespace, collection, doc_key, body, updated_at)
                    VALUES ($1, $2, $3, $4, NOW())
                    ON CONFLICT (namespace, collection, doc_key)
                    DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()
                    "#,
                )
                .bind(&namespace)
                .bind(&collection)
                .bind(&key)
                .bind(&document)
                .execute(&pool)
                .await
            })
            .await
            .map_err(Self::map_error)?;

        Ok(())
    }

    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        let namespace = self.namespace.clone();
        let collection = collection.to_string();
        let key = key.to_string();

        let row: Option<(serde_json::Value,)> = self
            .pool
            .execute(|pool| async move {
                sqlx::query_as(
                    r#"
                    SELECT body FROM documents
                    WHERE namespace = $1 AND collection = $2 AND doc_key = $3
                    "#,
                )
                .bind(&namespace)
                .bind(&collection)
                .bind(&key)
                .fetch_optional(&pool)
                .await
            })
            .await
            .map_err(Self::map_error)?;

        Ok(row.map(|(body,)| body))
    }

    async fn scan_prefix(
        &self,
        collection: &str,
        prefix: &str,
    ) -> Result<Vec<(String, serde_json::Value)>, StorageError> {
        let namespace = self.namespace.clone();
        let collection = collection.to_string();
        let prefix = prefix.to_string();

        let rows: Vec<(String, serde_json::Value)> = self
            .pool
            .execute(|pool| async move {
                sqlx::query_as(SCAN_PREFIX_SQL)
                    .bind(&namespace)
                    .bind(&collection)
                    .bind(&prefix)
                    .fetch_all(&pool)
                    .await
            })
            .await
            .map_err(Self::map_error)?;

        Ok(rows)
    }
}
