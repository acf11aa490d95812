//! Postgres store via SQLx.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{DurableStore, RecordRow, Seq, record_operation, rows_into_records};
use crate::error::Result;
use crate::model::{PersistenceRecord, TaskId};

const COLUMNS: &str = "seq, identifier, type_tag, payload, retry_attempts, finished_successfully, created_at, updated_at";

/// Database handle. Owns the connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/postgres").run(&self.pool).await?;
        Ok(())
    }

    /// Round-trip a `SELECT 1` to confirm the pool can reach the server.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for PgStore {
    async fn put(&self, record: &PersistenceRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO persistence_records
                (identifier, type_tag, payload, retry_attempts, finished_successfully, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (identifier) DO UPDATE SET
                type_tag = EXCLUDED.type_tag,
                payload = EXCLUDED.payload,
                retry_attempts = EXCLUDED.retry_attempts,
                finished_successfully = EXCLUDED.finished_successfully,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(record.identifier.as_str())
        .bind(&record.type_tag)
        .bind(record.payload_text())
        .bind(i32::try_from(record.retry_attempts).unwrap_or(i32::MAX))
        .bind(record.finished_successfully)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        record_operation("postgres", "put");
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<PersistenceRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM persistence_records WHERE identifier = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        record_operation("postgres", "get");
        row.map(|r| r.try_into_record().map(|(_, record)| record))
            .transpose()
    }

    async fn delete(&self, id: &TaskId) -> Result<bool> {
        let rows_affected = sqlx::query("DELETE FROM persistence_records WHERE identifier = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();
        record_operation("postgres", "delete");
        Ok(rows_affected > 0)
    }

    async fn scan(&self, after: Seq, limit: usize) -> Result<Vec<(Seq, PersistenceRecord)>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM persistence_records WHERE seq > $1 ORDER BY seq ASC LIMIT $2"
        ))
        .bind(after as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        record_operation("postgres", "scan");
        rows.into_iter().map(RecordRow::try_into_record).collect()
    }

    async fn query_by_type(&self, type_tag: &str) -> Result<Vec<PersistenceRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM persistence_records WHERE type_tag = $1 ORDER BY seq ASC"
        ))
        .bind(type_tag)
        .fetch_all(&self.pool)
        .await?;
        record_operation("postgres", "query");
        rows_into_records(rows)
    }

    async fn query_by_type_matching(
        &self,
        type_tag: &str,
        pattern: &str,
    ) -> Result<Vec<PersistenceRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM persistence_records
             WHERE type_tag = $1 AND strpos(payload, $2) > 0
             ORDER BY seq ASC"
        ))
        .bind(type_tag)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        record_operation("postgres", "query_matching");
        rows_into_records(rows)
    }

    async fn count(&self) -> Result<usize> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM persistence_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as usize)
    }
}
