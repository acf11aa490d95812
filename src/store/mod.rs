//! Durable store adapter.
//!
//! A flat identifier -> [`PersistenceRecord`] mapping with type-tag and
//! payload-substring queries. Backends only store and filter; lifecycle
//! rules live in the [`PersistentQueue`](crate::queue::PersistentQueue).
//!
//! Every operation is atomic per identifier. Nothing here spans records,
//! because nothing in the data model needs multi-record consistency.

pub mod memory;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{Error, Result};
use crate::model::{PersistenceRecord, TaskId};

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use sqlite::SqliteStore;

/// Position of a record in insertion order. Upserts keep the original.
pub type Seq = u64;

#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Insert or overwrite the record with the same identifier.
    async fn put(&self, record: &PersistenceRecord) -> Result<()>;

    async fn get(&self, id: &TaskId) -> Result<Option<PersistenceRecord>>;

    /// Returns whether a record existed. Deleting a missing id is a no-op.
    async fn delete(&self, id: &TaskId) -> Result<bool>;

    /// Up to `limit` records with a sequence number greater than `after`,
    /// in insertion order.
    async fn scan(&self, after: Seq, limit: usize) -> Result<Vec<(Seq, PersistenceRecord)>>;

    /// All pending records of one type, in insertion order.
    async fn query_by_type(&self, type_tag: &str) -> Result<Vec<PersistenceRecord>>;

    /// Like [`query_by_type`](Self::query_by_type), keeping only records whose
    /// compact payload JSON contains `pattern` (case-sensitive).
    ///
    /// Expensive: may scan and deserialize every record of the type.
    async fn query_by_type_matching(
        &self,
        type_tag: &str,
        pattern: &str,
    ) -> Result<Vec<PersistenceRecord>> {
        let records = self.query_by_type(type_tag).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.matches(type_tag, Some(pattern)))
            .collect())
    }

    async fn count(&self) -> Result<usize>;
}

/// Open a store from a URL: `memory:`, `sqlite:...` or `postgres://...`.
///
/// SQL backends are migrated before being returned.
pub async fn open_store(url: &SecretString) -> Result<Arc<dyn DurableStore>> {
    let url = url.expose_secret();

    if url.starts_with("memory:") {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if url.starts_with("sqlite:") {
        let store = SqliteStore::connect(url).await?;
        store.migrate().await?;
        return Ok(Arc::new(store));
    }
    if url.starts_with("postgres:") || url.starts_with("postgresql:") {
        let store = PgStore::connect(url).await?;
        store.migrate().await?;
        return Ok(Arc::new(store));
    }

    let scheme = url.split(':').next().unwrap_or_default();
    Err(Error::Config(format!("unsupported store scheme {scheme:?}")))
}

fn record_operation(backend: &'static str, operation: &'static str) {
    crate::telemetry::metrics::store_operations().add(
        1,
        &[
            opentelemetry::KeyValue::new("backend", backend),
            opentelemetry::KeyValue::new("operation", operation),
        ],
    );
}

/// Row shape shared by the SQL backends.
#[derive(sqlx::FromRow)]
struct RecordRow {
    seq: i64,
    identifier: String,
    type_tag: String,
    payload: String,
    retry_attempts: i32,
    finished_successfully: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl RecordRow {
    fn try_into_record(self) -> Result<(Seq, PersistenceRecord)> {
        Ok((
            self.seq.max(0) as Seq,
            PersistenceRecord {
                identifier: TaskId::new(self.identifier),
                type_tag: self.type_tag,
                payload: serde_json::from_str(&self.payload)?,
                retry_attempts: self.retry_attempts.max(0) as u32,
                finished_successfully: self.finished_successfully,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
        ))
    }
}

fn rows_into_records(rows: Vec<RecordRow>) -> Result<Vec<PersistenceRecord>> {
    rows.into_iter()
        .map(|row| row.try_into_record().map(|(_, record)| record))
        .collect()
}
