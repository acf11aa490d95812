//! Structured events emitted by the queue on every lifecycle transition.
//!
//! The queue owns the channel; collaborators subscribe explicitly via
//! [`PersistentQueue::subscribe`](crate::queue::PersistentQueue::subscribe).
//! Slow subscribers lag and skip events rather than block the queue.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::TaskId;

/// A structured event emitted by the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Enqueued {
        id: TaskId,
        type_tag: String,
        persisted: bool,
    },
    Recovered {
        id: TaskId,
        type_tag: String,
        retry_attempts: u32,
    },
    RecoveryFailed {
        id: TaskId,
        type_tag: String,
        reason: String,
    },
    Started {
        id: TaskId,
        retry_attempts: u32,
    },
    Succeeded {
        id: TaskId,
        duration_ms: u64,
    },
    Failed {
        id: TaskId,
        error: Option<String>,
        retry_attempts: u32,
    },
    RetryScheduled {
        id: TaskId,
        retry_attempts: u32,
        delay_ms: u64,
    },
    RetriesExhausted {
        id: TaskId,
        retry_attempts: u32,
    },
    Removed {
        id: TaskId,
        type_tag: String,
    },
    /// A live instance was superseded by an enqueue with the same identifier.
    Replaced {
        id: TaskId,
    },
    Cancelled {
        id: TaskId,
    },
    /// The pending set of this type changed; cached query results are stale.
    PendingChanged {
        type_tag: String,
    },
}

impl EventKind {
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            EventKind::Enqueued { id, .. }
            | EventKind::Recovered { id, .. }
            | EventKind::RecoveryFailed { id, .. }
            | EventKind::Started { id, .. }
            | EventKind::Succeeded { id, .. }
            | EventKind::Failed { id, .. }
            | EventKind::RetryScheduled { id, .. }
            | EventKind::RetriesExhausted { id, .. }
            | EventKind::Removed { id, .. }
            | EventKind::Replaced { id }
            | EventKind::Cancelled { id } => Some(id),
            EventKind::PendingChanged { .. } => None,
        }
    }
}

/// Sending half of the queue's event channel.
pub(crate) struct EventBus {
    tx: broadcast::Sender<QueueEvent>,
    seq: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            seq: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, kind: EventKind) {
        let event = QueueEvent {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp: Utc::now(),
            kind,
        };
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let kind = EventKind::RetriesExhausted {
            id: "job-9".into(),
            retry_attempts: 3,
        };
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], "retries_exhausted");
        assert_eq!(value["id"], "job-9");
    }

    #[tokio::test]
    async fn subscribers_see_monotonic_seq() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(EventKind::Cancelled { id: "a".into() });
        bus.emit(EventKind::PendingChanged {
            type_tag: "t".into(),
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(second.seq > first.seq);
        assert_eq!(second.kind.task_id(), None);
    }
}
