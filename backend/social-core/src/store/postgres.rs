//! Postgres-backed document store.
//!
//! One JSONB table holds every collection; merge writes use the `||`
//! concatenation operator and counter transforms are clamped at zero in SQL.
//! A batch commits inside a single transaction, which gives readers the
//! all-or-nothing visibility the graph mutation path requires.

use super::{Document, DocumentStore, WriteOp};
use crate::config::DatabaseConfig;
use crate::error::CoreResult;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool per the configured bounds
    pub async fn connect(config: &DatabaseConfig) -> CoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    /// Apply the embedded schema migrations
    pub async fn run_migrations(&self) -> CoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::error::CoreError::StoreUnavailable(format!("migrate: {}", e)))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn execute_op<'c>(
        tx: &mut sqlx::Transaction<'c, sqlx::Postgres>,
        op: &WriteOp,
    ) -> CoreResult<()> {
        match op {
            WriteOp::Set {
                collection,
                key,
                doc,
            } => {
                sqlx::query(
                    r#"
                    INSERT INTO documents (collection, key, data)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (collection, key) DO UPDATE SET data = EXCLUDED.data
                    "#,
                )
                .bind(collection)
                .bind(key)
                .bind(serde_json::Value::Object(doc.clone()))
                .execute(&mut **tx)
                .await?;
            }
            WriteOp::Merge {
                collection,
                key,
                doc,
            } => {
                sqlx::query(
                    r#"
                    INSERT INTO documents (collection, key, data)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (collection, key)
                    DO UPDATE SET data = documents.data || EXCLUDED.data
                    "#,
                )
                .bind(collection)
                .bind(key)
                .bind(serde_json::Value::Object(doc.clone()))
                .execute(&mut **tx)
                .await?;
            }
            WriteOp::Delete { collection, key } => {
                sqlx::query("DELETE FROM documents WHERE collection = $1 AND key = $2")
                    .bind(collection)
                    .bind(key)
                    .execute(&mut **tx)
                    .await?;
            }
            WriteOp::Increment {
                collection,
                key,
                field,
                delta,
            } => {
                sqlx::query(
                    r#"
                    INSERT INTO documents (collection, key, data)
                    VALUES ($1, $2, jsonb_build_object($3::text, GREATEST($4::bigint, 0)))
                    ON CONFLICT (collection, key) DO UPDATE
                    SET data = jsonb_set(
                        documents.data,
                        ARRAY[$3::text],
                        to_jsonb(GREATEST(COALESCE((documents.data->>$3)::bigint, 0) + $4, 0)),
                        true
                    )
                    "#,
                )
                .bind(collection)
                .bind(key)
                .bind(field)
                .bind(delta)
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn get(&self, collection: &str, key: &str) -> CoreResult<Option<Document>> {
        let data: Option<serde_json::Value> = sqlx::query_scalar(
            "SELECT data FROM documents WHERE collection = $1 AND key = $2",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(data.and_then(|v| match v {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        }))
    }

    async fn list_keys(&self, collection: &str) -> CoreResult<Vec<String>> {
        let keys: Vec<String> =
            sqlx::query_scalar("SELECT key FROM documents WHERE collection = $1")
                .bind(collection)
                .fetch_all(&self.pool)
                .await?;
        Ok(keys)
    }

    async fn query_recent(
        &self,
        collection: &str,
        order_field: &str,
        limit: usize,
    ) -> CoreResult<Vec<Document>> {
        let rows: Vec<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT data FROM documents
            WHERE collection = $1
            ORDER BY (data->>$2)::bigint DESC NULLS LAST
            LIMIT $3
            "#,
        )
        .bind(collection)
        .bind(order_field)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    async fn query_recent_filtered(
        &self,
        collection: &str,
        filter_field: &str,
        values: &[String],
        order_field: &str,
        limit: usize,
    ) -> CoreResult<Vec<Document>> {
        let rows: Vec<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT data FROM documents
            WHERE collection = $1 AND data->>$2 = ANY($3)
            ORDER BY (data->>$4)::bigint DESC NULLS LAST
            LIMIT $5
            "#,
        )
        .bind(collection)
        .bind(filter_field)
        .bind(values)
        .bind(order_field)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    async fn commit(&self, batch: Vec<WriteOp>) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for op in &batch {
            Self::execute_op(&mut tx, op).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
