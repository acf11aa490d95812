//! Persistent queue: keeps the durable store consistent with the lifecycle
//! of work submitted to the worker pool.
//!
//! ```text
//! SUBMITTED -> (persists) PERSISTED -> EXECUTING -> SUCCEEDED (record deleted)
//!                                                -> FAILED (retry_attempts++, record updated,
//!                                                           re-run or surfaced per policy)
//! SUBMITTED -> (opts out) EXECUTING -> SUCCEEDED | FAILED (no durable trace)
//! any persisted state -> REMOVED (on_removed fires, record deleted)
//! ```
//!
//! Every transition of one identifier runs under that identifier's lock.
//! A durable write always happens before the task becomes runnable.

mod locks;
mod recovery;

pub use recovery::{RecoveryFailure, RecoveryReport};

use std::any::Any;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use opentelemetry::KeyValue;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, warn};

use crate::error::{Error, Result};
use crate::event::{EventBus, EventKind, QueueEvent};
use crate::executor::{JobHandle, WorkerPool};
use crate::model::{
    Envelope, ExecutionFailure, Payload, PersistenceRecord, Task, TaskContext, TaskId,
};
use crate::registry::{DynTask, TaskRegistry};
use crate::retry::RetryPolicy;
use crate::store::DurableStore;
use crate::telemetry::metrics;
use crate::telemetry::task::{record_state_transition, start_task_span};

use locks::{KeyGuard, KeyedLocks};

/// What `enqueue` does with an identifier that is already in use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Overwrite the record and cancel any live instance.
    #[default]
    Replace,
    /// Fail with [`Error::DuplicateIdentifier`].
    Reject,
}

impl FromStr for DuplicatePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "reject" => Ok(Self::Reject),
            other => Err(Error::Config(format!(
                "unknown duplicate policy {other:?} (expected \"replace\" or \"reject\")"
            ))),
        }
    }
}

/// Configuration for the queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_workers: usize,
    pub retry: RetryPolicy,
    pub duplicate_policy: DuplicatePolicy,
    /// How long a cancelled task may keep running before it is aborted.
    pub cancel_grace: Duration,
    /// Records loaded per page during recovery.
    pub recovery_batch_size: usize,
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            retry: RetryPolicy::default(),
            duplicate_policy: DuplicatePolicy::default(),
            cancel_grace: Duration::from_secs(5),
            recovery_batch_size: 256,
            event_capacity: 1024,
        }
    }
}

impl QueueConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    pub fn with_recovery_batch_size(mut self, size: usize) -> Self {
        self.recovery_batch_size = size;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    Recovering,
    Ready,
    ShutDown,
}

/// A task the pool currently owns.
struct InFlight {
    /// Distinguishes a replacement from the instance it replaced.
    generation: u64,
    type_tag: &'static str,
    persisted: bool,
    /// Last payload written (or that would have been written).
    snapshot: Payload,
    handle: JobHandle,
}

struct Inner {
    store: Arc<dyn DurableStore>,
    registry: TaskRegistry,
    config: QueueConfig,
    pool: WorkerPool,
    locks: KeyedLocks,
    in_flight: DashMap<TaskId, InFlight>,
    events: EventBus,
    phase: Mutex<Phase>,
    generation: AtomicU64,
}

/// Durable task queue. Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct PersistentQueue {
    inner: Arc<Inner>,
}

impl PersistentQueue {
    /// Build a queue over `store`. Call [`recover`](Self::recover) before
    /// enqueueing; until then `enqueue` fails with
    /// [`Error::RecoveryPending`].
    pub fn new(store: Arc<dyn DurableStore>, registry: TaskRegistry, config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                registry,
                pool: WorkerPool::new(config.max_workers),
                events: EventBus::new(config.event_capacity),
                config,
                locks: KeyedLocks::new(),
                in_flight: DashMap::new(),
                phase: Mutex::new(Phase::Fresh),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Open the configured store and build a queue over it.
    pub async fn from_config(config: &crate::config::Config, registry: TaskRegistry) -> Result<Self> {
        let store = crate::store::open_store(&config.store_url).await?;
        Ok(Self::new(store, registry, config.queue_config()))
    }

    /// Submit a task.
    ///
    /// Assigns an identifier if the envelope has none. When the task
    /// persists, its record is written before it can run; if that write
    /// fails the task is not submitted and the storage error is returned.
    pub async fn enqueue<T: Task>(&self, item: impl Into<Envelope<T>>) -> Result<TaskId> {
        let Envelope {
            id,
            retry_attempts,
            task,
        } = item.into();
        let caller_supplied = id.is_some();
        let id = id.unwrap_or_else(TaskId::generate);

        let result = self
            .inner
            .admit(id, caller_supplied, retry_attempts, Box::new(task))
            .await;

        let label = match &result {
            Ok(_) => "ok",
            Err(Error::DuplicateIdentifier(_)) => "duplicate",
            Err(_) => "error",
        };
        metrics::tasks_enqueued().add(
            1,
            &[
                KeyValue::new("type_tag", T::TYPE_TAG),
                KeyValue::new("result", label),
            ],
        );
        result
    }

    /// Cancel the task if it is live, fire its type's `on_removed` hook with
    /// the stored payload and delete its record.
    ///
    /// Returns whether anything was removed. Identifiers with no record and
    /// no live task are a no-op.
    pub async fn remove(&self, id: &TaskId) -> Result<bool> {
        self.inner.remove(id).await
    }

    /// [`remove`](Self::remove) for each identifier, in order. Returns how
    /// many were removed.
    pub async fn remove_many<'a>(&self, ids: impl IntoIterator<Item = &'a TaskId>) -> Result<usize> {
        let mut removed = 0;
        for id in ids {
            if self.inner.remove(id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove by raw identifier. Works for records that were never
    /// reconstructed into a live task.
    pub async fn remove_by_identifier(&self, identifier: &str) -> Result<bool> {
        self.inner.remove(&TaskId::from(identifier)).await
    }

    /// Payloads of all pending records of `type_tag`, in insertion order.
    ///
    /// Reads the store directly and may be slow on large stores.
    pub async fn pending_payloads(&self, type_tag: &str) -> Result<Vec<Payload>> {
        let records = self.inner.store.query_by_type(type_tag).await?;
        Ok(records.into_iter().map(|r| r.payload).collect())
    }

    /// Like [`pending_payloads`](Self::pending_payloads), keeping only
    /// payloads whose compact JSON text contains `pattern` (case-sensitive).
    ///
    /// Potentially a full scan of the type.
    pub async fn pending_payloads_matching(
        &self,
        type_tag: &str,
        pattern: &str,
    ) -> Result<Vec<Payload>> {
        let records = self
            .inner
            .store
            .query_by_type_matching(type_tag, pattern)
            .await?;
        Ok(records.into_iter().map(|r| r.payload).collect())
    }

    /// The stored record for `id`, if any.
    pub async fn record(&self, id: &TaskId) -> Result<Option<PersistenceRecord>> {
        self.inner.store.get(id).await
    }

    /// Whether the pool currently owns a task with this identifier.
    pub fn is_live(&self, id: &TaskId) -> bool {
        self.inner.in_flight.contains_key(id)
    }

    pub fn live_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.phase.lock() == Phase::Ready
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.inner.store
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Cancel all live tasks and wait for them to stop. Records are left
    /// as they are, so the next [`recover`](Self::recover) resumes them.
    pub async fn shutdown(&self) {
        {
            let mut phase = self.inner.phase.lock();
            if *phase == Phase::ShutDown {
                return;
            }
            *phase = Phase::ShutDown;
        }
        info!(live = self.inner.in_flight.len(), "queue shutting down");
        self.inner.pool.shutdown().await;
        self.inner.in_flight.clear();
        info!("queue shut down");
    }
}

impl std::fmt::Debug for PersistentQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentQueue")
            .field("phase", &*self.inner.phase.lock())
            .field("live", &self.inner.in_flight.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

enum Attempt {
    Finished(Box<dyn DynTask>, std::result::Result<(), ExecutionFailure>),
    Panicked(String),
    /// Cancelled and did not stop within the grace period.
    Aborted,
}

impl Inner {
    fn ensure_ready(&self) -> Result<()> {
        match *self.phase.lock() {
            Phase::Ready => Ok(()),
            Phase::ShutDown => Err(Error::ShutDown),
            Phase::Fresh | Phase::Recovering => Err(Error::RecoveryPending),
        }
    }

    async fn admit(
        self: &Arc<Self>,
        id: TaskId,
        caller_supplied: bool,
        retry_attempts: u32,
        task: Box<dyn DynTask>,
    ) -> Result<TaskId> {
        self.ensure_ready()?;
        let type_tag = task.type_tag();
        let persist = task.should_persist();
        if persist && !self.registry.contains(type_tag) {
            return Err(Error::UnregisteredType(type_tag.to_string()));
        }

        let _guard = self.locks.lock(&id).await;
        self.ensure_ready()?;

        if self.config.duplicate_policy == DuplicatePolicy::Reject {
            let live = self.in_flight.contains_key(&id);
            if live || (caller_supplied && self.store.get(&id).await?.is_some()) {
                warn!(%id, type_tag, "rejected duplicate identifier");
                return Err(Error::DuplicateIdentifier(id));
            }
        }

        let payload = task.to_payload();
        if persist {
            let record = PersistenceRecord::new(id.clone(), type_tag, payload.clone())
                .with_retry_attempts(retry_attempts);
            self.store.put(&record).await?;
        } else if caller_supplied && self.store.delete(&id).await? {
            // A stale record would resurrect the old work on recovery.
            debug!(%id, "dropped stale record for non-persisting task");
        }

        {
            // A record written above stays if shutdown won the race; the
            // next recovery picks it up as it would after a crash.
            let _phase = self.admitting(Phase::Ready)?;
            if let Some((_, previous)) = self.in_flight.remove(&id) {
                previous.handle.cancel();
                info!(%id, previous_type = previous.type_tag, "replaced live task");
                self.events.emit(EventKind::Replaced { id: id.clone() });
            }
            self.events.emit(EventKind::Enqueued {
                id: id.clone(),
                type_tag: type_tag.to_string(),
                persisted: persist,
            });
            self.spawn(id.clone(), task, retry_attempts, persist, payload);
        }

        info!(%id, type_tag, persisted = persist, retry_attempts, "task enqueued");
        if persist {
            self.pending_changed(type_tag);
        }
        Ok(id)
    }

    /// Hold the phase while a task is handed to the pool, so shutdown
    /// either sees the new in-flight entry or refuses it.
    fn admitting(&self, expected: Phase) -> Result<MutexGuard<'_, Phase>> {
        let phase = self.phase.lock();
        if *phase == expected {
            Ok(phase)
        } else {
            Err(Error::ShutDown)
        }
    }

    /// Hand a task to the pool and track it. Caller holds the id's lock
    /// and the phase (see [`admitting`](Self::admitting)).
    fn spawn(
        self: &Arc<Self>,
        id: TaskId,
        task: Box<dyn DynTask>,
        retry_attempts: u32,
        persisted: bool,
        snapshot: Payload,
    ) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let type_tag = task.type_tag();
        let inner = Arc::clone(self);
        let job_id = id.clone();
        let handle = self.pool.submit(move |cancel| async move {
            inner
                .drive(job_id, generation, task, retry_attempts, cancel)
                .await
        });
        self.in_flight.insert(
            id,
            InFlight {
                generation,
                type_tag,
                persisted,
                snapshot,
                handle,
            },
        );
    }

    /// Run attempts until success, cancellation or exhaustion.
    async fn drive(
        &self,
        id: TaskId,
        generation: u64,
        mut task: Box<dyn DynTask>,
        mut retry_attempts: u32,
        cancel: CancellationToken,
    ) {
        let type_tag = task.type_tag();
        loop {
            let Some(permit) = self.pool.acquire(&cancel).await else {
                debug!(%id, "cancelled before start");
                return;
            };

            let span = start_task_span(type_tag, &id, retry_attempts);
            record_state_transition(&span, "pending", "executing");
            self.events.emit(EventKind::Started {
                id: id.clone(),
                retry_attempts,
            });

            let started = Instant::now();
            let ctx = TaskContext::new(id.clone(), retry_attempts, cancel.clone());
            let attempt = execute(
                task,
                ctx,
                &cancel,
                self.config.cancel_grace,
                span.clone(),
            )
            .await;
            drop(permit);

            let duration_ms = started.elapsed().as_millis() as u64;
            metrics::task_duration_ms()
                .record(duration_ms as f64, &[KeyValue::new("type_tag", type_tag)]);

            if cancel.is_cancelled() {
                // Whoever cancelled owns the record now.
                record_state_transition(&span, "executing", "cancelled");
                return;
            }

            let (returned, error, outcome) = match attempt {
                Attempt::Finished(task, Ok(())) if task.finished_successfully() => {
                    self.complete(&id, generation, type_tag, duration_ms, &span, &cancel)
                        .await;
                    return;
                }
                Attempt::Finished(task, Ok(())) => (Some(task), None, "failed"),
                Attempt::Finished(task, Err(failure)) => {
                    (Some(task), Some(failure.message), "failed")
                }
                Attempt::Panicked(message) => {
                    (None, Some(format!("panicked: {message}")), "panicked")
                }
                Attempt::Aborted => return,
            };
            metrics::task_outcomes().add(
                1,
                &[
                    KeyValue::new("type_tag", type_tag),
                    KeyValue::new("outcome", outcome),
                ],
            );

            retry_attempts += 1;
            let Some(next) = self
                .after_failure(
                    &id,
                    generation,
                    type_tag,
                    returned,
                    error,
                    retry_attempts,
                    &span,
                    &cancel,
                )
                .await
            else {
                return;
            };
            task = next;

            let delay = self.config.retry.delay_for(retry_attempts);
            let delay_ms = delay.as_millis() as u64;
            info!(%id, type_tag, retry_attempts, delay_ms, "retry scheduled");
            self.events.emit(EventKind::RetryScheduled {
                id: id.clone(),
                retry_attempts,
                delay_ms,
            });
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn lock_unless_cancelled(
        &self,
        id: &TaskId,
        cancel: &CancellationToken,
    ) -> Option<KeyGuard<'_>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            guard = self.locks.lock(id) => Some(guard),
        }
    }

    async fn complete(
        &self,
        id: &TaskId,
        generation: u64,
        type_tag: &'static str,
        duration_ms: u64,
        span: &Span,
        cancel: &CancellationToken,
    ) {
        let Some(_guard) = self.lock_unless_cancelled(id, cancel).await else {
            return;
        };
        let Some(persisted) = self
            .in_flight
            .get(id)
            .filter(|entry| entry.generation == generation)
            .map(|entry| entry.persisted)
        else {
            return;
        };

        if persisted && let Err(e) = self.store.delete(id).await {
            error!(
                %id,
                type_tag,
                error = %e,
                "failed to delete completed record, it will run again after recovery"
            );
        }
        self.in_flight
            .remove_if(id, |_, entry| entry.generation == generation);

        record_state_transition(span, "executing", "succeeded");
        info!(%id, type_tag, duration_ms, "task succeeded");
        metrics::task_outcomes().add(
            1,
            &[
                KeyValue::new("type_tag", type_tag),
                KeyValue::new("outcome", "succeeded"),
            ],
        );
        self.events.emit(EventKind::Succeeded {
            id: id.clone(),
            duration_ms,
        });
        if persisted {
            self.pending_changed(type_tag);
        }
    }

    /// Failure bookkeeping. Returns the task to re-run, or `None` when it is
    /// surfaced (retries exhausted), replaced or removed.
    #[allow(clippy::too_many_arguments)]
    async fn after_failure(
        &self,
        id: &TaskId,
        generation: u64,
        type_tag: &'static str,
        returned: Option<Box<dyn DynTask>>,
        error: Option<String>,
        retry_attempts: u32,
        span: &Span,
        cancel: &CancellationToken,
    ) -> Option<Box<dyn DynTask>> {
        let _guard = self.lock_unless_cancelled(id, cancel).await?;
        let (was_persisted, snapshot) = self
            .in_flight
            .get(id)
            .filter(|entry| entry.generation == generation)
            .map(|entry| (entry.persisted, entry.snapshot.clone()))?;

        record_state_transition(span, "executing", "failed");
        warn!(
            %id,
            type_tag,
            retry_attempts,
            error = error.as_deref().unwrap_or("did not finish successfully"),
            "task attempt failed"
        );
        self.events.emit(EventKind::Failed {
            id: id.clone(),
            error,
            retry_attempts,
        });

        // A panic loses the instance: rebuild from the last known payload.
        let task = match returned {
            Some(task) => Some(task),
            None => match self.registry.reconstruct(id, type_tag, &snapshot) {
                Ok(task) => Some(task),
                Err(e) => {
                    error!(%id, type_tag, error = %e, "cannot rebuild task after panic");
                    None
                }
            },
        };

        let persist = task.as_ref().map_or(was_persisted, |t| t.should_persist());
        let payload = task.as_ref().map_or(snapshot, |t| t.to_payload());

        let persisted = if persist && self.registry.contains(type_tag) {
            let record = PersistenceRecord::new(id.clone(), type_tag, payload.clone())
                .with_retry_attempts(retry_attempts);
            match self.store.put(&record).await {
                Ok(()) => true,
                Err(e) => {
                    error!(%id, type_tag, error = %e, "failed to record failed attempt");
                    was_persisted
                }
            }
        } else if was_persisted {
            match self.store.delete(id).await {
                Ok(_) => {
                    info!(%id, type_tag, "task stopped persisting, record deleted");
                    false
                }
                Err(e) => {
                    error!(%id, type_tag, error = %e, "failed to delete record of opted-out task");
                    true
                }
            }
        } else {
            false
        };

        if let Some(mut entry) = self.in_flight.get_mut(id)
            && entry.generation == generation
        {
            entry.persisted = persisted;
            entry.snapshot = payload;
        }
        if persisted || was_persisted {
            self.pending_changed(type_tag);
        }

        match task {
            Some(task) if self.config.retry.should_retry(retry_attempts) => Some(task),
            _ => {
                record_state_transition(span, "failed", "exhausted");
                warn!(%id, type_tag, retry_attempts, persisted, "retries exhausted");
                metrics::task_outcomes().add(
                    1,
                    &[
                        KeyValue::new("type_tag", type_tag),
                        KeyValue::new("outcome", "exhausted"),
                    ],
                );
                self.events.emit(EventKind::RetriesExhausted {
                    id: id.clone(),
                    retry_attempts,
                });
                self.in_flight
                    .remove_if(id, |_, entry| entry.generation == generation);
                None
            }
        }
    }

    async fn remove(&self, id: &TaskId) -> Result<bool> {
        let _guard = self.locks.lock(id).await;
        let stored = self.store.get(id).await?;

        let live = self.in_flight.remove(id).map(|(_, entry)| entry);
        if let Some(entry) = &live {
            entry.handle.cancel();
            if !entry
                .handle
                .finished_within(self.config.cancel_grace * 2)
                .await
            {
                warn!(%id, "removed task still running after grace period");
            }
            self.events.emit(EventKind::Cancelled { id: id.clone() });
        }

        let persisted = stored.is_some();
        let (type_tag, payload) = match (stored, live) {
            (Some(record), _) => (record.type_tag, record.payload),
            (None, Some(entry)) => (entry.type_tag.to_string(), entry.snapshot),
            (None, None) => {
                debug!(%id, "nothing to remove");
                return Ok(false);
            }
        };

        self.notify_removed(id, &type_tag, &payload);
        if persisted {
            self.store.delete(id).await?;
        }

        info!(%id, %type_tag, persisted, "task removed");
        metrics::tasks_removed().add(1, &[KeyValue::new("type_tag", type_tag.clone())]);
        self.events.emit(EventKind::Removed {
            id: id.clone(),
            type_tag: type_tag.clone(),
        });
        if persisted {
            self.pending_changed(&type_tag);
        }
        Ok(true)
    }

    /// Best effort: a failing hook never blocks the deletion.
    fn notify_removed(&self, id: &TaskId, type_tag: &str, payload: &Payload) {
        match self.registry.notify_removed(type_tag, payload) {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                warn!(%id, type_tag, error = %e, "on_removed hook failed");
                metrics::hook_failures().add(1, &[KeyValue::new("type_tag", type_tag.to_string())]);
            }
            None => warn!(%id, type_tag, "no task type registered, removing without hook"),
        }
    }

    fn pending_changed(&self, type_tag: &str) {
        self.events.emit(EventKind::PendingChanged {
            type_tag: type_tag.to_string(),
        });
    }
}

/// Run one attempt on its own tokio task so a panic stays contained.
async fn execute(
    mut task: Box<dyn DynTask>,
    ctx: TaskContext,
    cancel: &CancellationToken,
    grace: Duration,
    span: Span,
) -> Attempt {
    let mut running = tokio::spawn(
        async move {
            let result = task.run(&ctx).await;
            (task, result)
        }
        .instrument(span),
    );

    let joined = tokio::select! {
        joined = &mut running => joined,
        _ = cancel.cancelled() => match tokio::time::timeout(grace, &mut running).await {
            Ok(joined) => joined,
            Err(_) => {
                running.abort();
                return Attempt::Aborted;
            }
        },
    };

    match joined {
        Ok((task, result)) => Attempt::Finished(task, result),
        Err(e) if e.is_panic() => Attempt::Panicked(panic_message(e.into_panic())),
        Err(_) => Attempt::Aborted,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_policy_parses_case_insensitively() {
        assert_eq!("Reject".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Reject);
        assert_eq!(" replace ".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Replace);
        assert!(matches!(
            "overwrite".parse::<DuplicatePolicy>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn panic_messages_are_extracted() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7_u8)), "unknown panic payload");
    }
}
