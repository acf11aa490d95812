//! Embedded, file-backed store on SQLite via SQLx.
//!
//! WAL journal for concurrent readers; each statement touches a single
//! identifier, so SQLite's per-statement atomicity is all that is needed.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use super::{DurableStore, RecordRow, Seq, record_operation, rows_into_records};
use crate::error::Result;
use crate::model::{PersistenceRecord, TaskId};

const COLUMNS: &str = "seq, identifier, type_tag, payload, retry_attempts, finished_successfully, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database, e.g. `sqlite://durq.db`.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Private in-memory database (for testing).
    ///
    /// Pinned to one connection that never expires, since every SQLite
    /// `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite").run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn put(&self, record: &PersistenceRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO persistence_records
                (identifier, type_tag, payload, retry_attempts, finished_successfully, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(identifier) DO UPDATE SET
                type_tag = excluded.type_tag,
                payload = excluded.payload,
                retry_attempts = excluded.retry_attempts,
                finished_successfully = excluded.finished_successfully,
                updated_at = excluded.updated_at",
        )
        .bind(record.identifier.as_str())
        .bind(&record.type_tag)
        .bind(record.payload_text())
        .bind(record.retry_attempts as i64)
        .bind(record.finished_successfully)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        record_operation("sqlite", "put");
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<PersistenceRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM persistence_records WHERE identifier = ?1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        record_operation("sqlite", "get");
        row.map(|r| r.try_into_record().map(|(_, record)| record))
            .transpose()
    }

    async fn delete(&self, id: &TaskId) -> Result<bool> {
        let rows_affected = sqlx::query("DELETE FROM persistence_records WHERE identifier = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();
        record_operation("sqlite", "delete");
        Ok(rows_affected > 0)
    }

    async fn scan(&self, after: Seq, limit: usize) -> Result<Vec<(Seq, PersistenceRecord)>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM persistence_records WHERE seq > ?1 ORDER BY seq ASC LIMIT ?2"
        ))
        .bind(after as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        record_operation("sqlite", "scan");
        rows.into_iter().map(RecordRow::try_into_record).collect()
    }

    async fn query_by_type(&self, type_tag: &str) -> Result<Vec<PersistenceRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM persistence_records WHERE type_tag = ?1 ORDER BY seq ASC"
        ))
        .bind(type_tag)
        .fetch_all(&self.pool)
        .await?;
        record_operation("sqlite", "query");
        rows_into_records(rows)
    }

    async fn query_by_type_matching(
        &self,
        type_tag: &str,
        pattern: &str,
    ) -> Result<Vec<PersistenceRecord>> {
        // instr, not LIKE: SQLite's LIKE ignores ASCII case.
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM persistence_records
             WHERE type_tag = ?1 AND instr(payload, ?2) > 0
             ORDER BY seq ASC"
        ))
        .bind(type_tag)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        record_operation("sqlite", "query_matching");
        rows_into_records(rows)
    }

    async fn count(&self) -> Result<usize> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM persistence_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as usize)
    }
}
