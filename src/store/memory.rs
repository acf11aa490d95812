//! In-memory store backed by a `DashMap`.
//!
//! Survives nothing but a dropped queue; share one `Arc<MemoryStore>`
//! between queue instances to simulate a restart in tests.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{DurableStore, Seq};
use crate::error::Result;
use crate::model::{PersistenceRecord, TaskId};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<TaskId, (Seq, PersistenceRecord)>,
    next_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn sorted(&self, keep: impl Fn(&PersistenceRecord) -> bool) -> Vec<(Seq, PersistenceRecord)> {
        let mut out: Vec<(Seq, PersistenceRecord)> = self
            .records
            .iter()
            .filter(|entry| keep(&entry.value().1))
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|(seq, _)| *seq);
        out
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn put(&self, record: &PersistenceRecord) -> Result<()> {
        match self.records.entry(record.identifier.clone()) {
            Entry::Occupied(mut slot) => {
                let (_, stored) = slot.get_mut();
                let created_at = stored.created_at;
                *stored = record.clone();
                stored.created_at = created_at;
            }
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
                slot.insert((seq, record.clone()));
            }
        }
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<PersistenceRecord>> {
        Ok(self.records.get(id).map(|entry| entry.value().1.clone()))
    }

    async fn delete(&self, id: &TaskId) -> Result<bool> {
        Ok(self.records.remove(id).is_some())
    }

    async fn scan(&self, after: Seq, limit: usize) -> Result<Vec<(Seq, PersistenceRecord)>> {
        let mut page: Vec<(Seq, PersistenceRecord)> = self
            .sorted(|_| true)
            .into_iter()
            .filter(|(seq, _)| *seq > after)
            .collect();
        page.truncate(limit);
        Ok(page)
    }

    async fn query_by_type(&self, type_tag: &str) -> Result<Vec<PersistenceRecord>> {
        Ok(self
            .sorted(|r| r.type_tag == type_tag)
            .into_iter()
            .map(|(_, r)| r)
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, tag: &str, body: serde_json::Value) -> PersistenceRecord {
        PersistenceRecord::new(id.into(), tag, body.as_object().cloned().unwrap())
    }

    #[tokio::test]
    async fn upsert_keeps_insertion_position() {
        let store = MemoryStore::new();
        store.put(&record("a", "t", json!({"v": 1}))).await.unwrap();
        store.put(&record("b", "t", json!({"v": 2}))).await.unwrap();
        store
            .put(&record("a", "t", json!({"v": 3})).with_retry_attempts(1))
            .await
            .unwrap();

        let page = store.scan(0, 10).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|(_, r)| r.identifier.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(page[0].1.payload["v"], 3);
        assert_eq!(page[0].1.retry_attempts, 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn scan_pages_after_cursor() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .put(&record(&format!("r{i}"), "t", json!({})))
                .await
                .unwrap();
        }

        let first = store.scan(0, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        let rest = store.scan(first[1].0, 10).await.unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0].1.identifier.as_str(), "r2");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store.put(&record("a", "t", json!({}))).await.unwrap();
        assert!(store.delete(&"a".into()).await.unwrap());
        assert!(!store.delete(&"a".into()).await.unwrap());
        assert!(store.get(&"a".into()).await.unwrap().is_none());
    }
}
