//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use durq::model::task::{from_payload, to_payload};
use durq::store::MemoryStore;
use durq::{
    DurableStore, EventKind, ExecutionFailure, HookError, Payload, PersistenceRecord,
    PersistentQueue, QueueConfig, QueueEvent, ReconstructionError, RetryPolicy, Task,
    TaskContext, TaskRegistry,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Labels passed to `Job::on_removed`, across all tests in the binary.
static REMOVED: Mutex<Vec<String>> = Mutex::new(Vec::new());

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Succeed,
    /// `run` returns an error.
    Fail,
    /// `run` returns Ok but the job reports it did not finish.
    Unfinished,
    /// Runs until cancelled.
    Block,
    /// Fails while `retry_attempts` is below the bound.
    FailUntil(u32),
    Panic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub label: String,
    pub x: i64,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "persist_by_default")]
    pub persist: bool,
    #[serde(skip)]
    finished: bool,
}

fn persist_by_default() -> bool {
    true
}

impl Job {
    pub fn new(label: &str, x: i64) -> Self {
        Self {
            label: label.to_string(),
            x,
            mode: Mode::Succeed,
            persist: true,
            finished: false,
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn ephemeral(mut self) -> Self {
        self.persist = false;
        self
    }
}

#[async_trait]
impl Task for Job {
    const TYPE_TAG: &'static str = "job";

    fn reconstruct(payload: &Payload) -> Result<Self, ReconstructionError> {
        from_payload(payload)
    }

    fn to_payload(&self) -> Payload {
        to_payload(self)
    }

    async fn run(&mut self, ctx: &TaskContext) -> Result<(), ExecutionFailure> {
        match self.mode {
            Mode::Succeed => {
                self.finished = true;
                Ok(())
            }
            Mode::Fail => Err("forced failure".into()),
            Mode::Unfinished => Ok(()),
            Mode::Block => {
                ctx.cancelled().await;
                Ok(())
            }
            Mode::FailUntil(bound) if ctx.retry_attempts < bound => {
                Err(format!("attempt {} failed", ctx.retry_attempts).into())
            }
            Mode::FailUntil(_) => {
                self.finished = true;
                Ok(())
            }
            Mode::Panic => panic!("job {} exploded", self.label),
        }
    }

    fn finished_successfully(&self) -> bool {
        self.finished
    }

    fn should_persist(&self) -> bool {
        self.persist
    }

    fn on_removed(payload: &Payload) -> Result<(), HookError> {
        let label = payload
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        REMOVED.lock().unwrap().push(label.clone());
        if label.starts_with("hook-fails") {
            return Err("cleanup failed".into());
        }
        Ok(())
    }
}

/// A second task type, to check queries stay scoped by type tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub label: String,
}

#[async_trait]
impl Task for Note {
    const TYPE_TAG: &'static str = "note";

    fn reconstruct(payload: &Payload) -> Result<Self, ReconstructionError> {
        from_payload(payload)
    }

    fn to_payload(&self) -> Payload {
        to_payload(self)
    }

    async fn run(&mut self, _ctx: &TaskContext) -> Result<(), ExecutionFailure> {
        Ok(())
    }

    fn finished_successfully(&self) -> bool {
        true
    }
}

pub fn payload(value: Value) -> Payload {
    value.as_object().cloned().expect("payload must be a JSON object")
}

pub fn job_record(id: &str, value: Value) -> PersistenceRecord {
    PersistenceRecord::new(id.into(), Job::TYPE_TAG, payload(value))
}

pub fn registry() -> TaskRegistry {
    TaskRegistry::new().with::<Job>().with::<Note>()
}

/// No in-process retries and a short cancellation grace.
pub fn config() -> QueueConfig {
    QueueConfig::default()
        .with_retry(RetryPolicy::no_retry())
        .with_cancel_grace(Duration::from_millis(200))
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

/// A queue that has completed (empty or not) recovery.
pub async fn ready_queue(store: Arc<dyn DurableStore>, config: QueueConfig) -> PersistentQueue {
    let queue = PersistentQueue::new(store, registry(), config);
    queue.recover().await.expect("recovery");
    queue
}

pub fn removed_count(label: &str) -> usize {
    REMOVED.lock().unwrap().iter().filter(|l| *l == label).count()
}

/// Wait for the first event matching `pred`, skipping others.
pub async fn wait_for(
    rx: &mut broadcast::Receiver<QueueEvent>,
    pred: impl Fn(&EventKind) -> bool,
) -> EventKind {
    let found = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event.kind) => return event.kind,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await;
    found.expect("timed out waiting for event")
}

/// Collect events up to and including the first one matching `until`.
pub async fn collect_until(
    rx: &mut broadcast::Receiver<QueueEvent>,
    until: impl Fn(&EventKind) -> bool,
) -> Vec<EventKind> {
    let mut seen = Vec::new();
    let done = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let stop = until(&event.kind);
                    seen.push(event.kind);
                    if stop {
                        return;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await;
    done.expect("timed out collecting events");
    seen
}
