//! Startup recovery: rebuild every pending record and hand it back to the pool.

use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::{error, info, warn};

use super::{Inner, Phase, PersistentQueue};
use crate::error::{Error, Result};
use crate::event::EventKind;
use crate::model::{PersistenceRecord, TaskId};
use crate::telemetry::metrics;

/// Outcome of [`PersistentQueue::recover`].
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Identifiers handed back to the pool, with their retry counts intact.
    pub resubmitted: Vec<TaskId>,
    /// Records that could not be rebuilt. They stay in the store.
    pub failures: Vec<RecoveryFailure>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub struct RecoveryFailure {
    pub id: TaskId,
    pub type_tag: String,
    pub error: Error,
}

impl PersistentQueue {
    /// Reconstruct and resubmit every record in the store. Runs once, before
    /// any `enqueue` is accepted.
    ///
    /// Records that fail reconstruction are reported and kept; an operator
    /// decides whether to fix or remove them. A storage error aborts
    /// recovery and leaves the queue able to retry it; records already
    /// resubmitted are not resubmitted twice. A concurrent
    /// [`shutdown`](Self::shutdown) makes it fail with [`Error::ShutDown`].
    pub async fn recover(&self) -> Result<RecoveryReport> {
        {
            let mut phase = self.inner.phase.lock();
            match *phase {
                Phase::Fresh => *phase = Phase::Recovering,
                Phase::Recovering | Phase::Ready => return Err(Error::AlreadyRecovered),
                Phase::ShutDown => return Err(Error::ShutDown),
            }
        }

        let result = self.inner.recover_all().await;

        let mut phase = self.inner.phase.lock();
        if *phase != Phase::Recovering {
            // Shut down underneath us: nothing resubmitted is still running.
            return Err(Error::ShutDown);
        }
        *phase = if result.is_ok() {
            Phase::Ready
        } else {
            Phase::Fresh
        };
        result
    }

    /// Resubmit a record that is not live, typically one surfaced after its
    /// retries were exhausted. Its retry count is preserved.
    ///
    /// Returns `false` when there is no such record or it is already live.
    pub async fn resume(&self, id: &TaskId) -> Result<bool> {
        self.inner.ensure_ready()?;
        let _guard = self.inner.locks.lock(id).await;
        if self.inner.in_flight.contains_key(id) {
            return Ok(false);
        }
        let Some(record) = self.inner.store.get(id).await? else {
            return Ok(false);
        };
        self.inner.resubmit(record, Phase::Ready).await?;
        Ok(true)
    }
}

impl Inner {
    async fn recover_all(self: &Arc<Self>) -> Result<RecoveryReport> {
        let batch = self.config.recovery_batch_size.max(1);
        let mut report = RecoveryReport::default();
        let mut after = 0;

        info!(batch, "recovery started");
        loop {
            let page = self.store.scan(after, batch).await?;
            let Some((last, _)) = page.last() else {
                break;
            };
            after = *last;
            let full = page.len() == batch;

            for (_, record) in page {
                self.recover_record(record, &mut report).await?;
            }
            if !full {
                break;
            }
        }

        info!(
            resubmitted = report.resubmitted.len(),
            failed = report.failures.len(),
            "recovery finished"
        );
        Ok(report)
    }

    async fn recover_record(
        self: &Arc<Self>,
        record: PersistenceRecord,
        report: &mut RecoveryReport,
    ) -> Result<()> {
        let id = record.identifier.clone();
        let _guard = self.locks.lock(&id).await;
        if self.in_flight.contains_key(&id) {
            return Ok(());
        }
        // Removal may have run since the page was read.
        let Some(record) = self.store.get(&id).await? else {
            return Ok(());
        };
        let type_tag = record.type_tag.clone();

        match self.resubmit(record, Phase::Recovering).await {
            Ok(()) => {
                metrics::recovery_records().add(1, &[KeyValue::new("result", "recovered")]);
                report.resubmitted.push(id);
                Ok(())
            }
            Err(e) if e.is_storage() || matches!(e, Error::ShutDown) => Err(e),
            Err(e) => {
                error!(%id, %type_tag, error = %e, "record kept: cannot reconstruct");
                metrics::recovery_records().add(1, &[KeyValue::new("result", "failed")]);
                self.events.emit(EventKind::RecoveryFailed {
                    id: id.clone(),
                    type_tag: type_tag.clone(),
                    reason: e.to_string(),
                });
                report.failures.push(RecoveryFailure {
                    id,
                    type_tag,
                    error: e,
                });
                Ok(())
            }
        }
    }

    /// Rebuild a stored record and hand it to the pool while the queue is
    /// still in `expected`. Caller holds the id's lock.
    async fn resubmit(self: &Arc<Self>, record: PersistenceRecord, expected: Phase) -> Result<()> {
        let PersistenceRecord {
            identifier: id,
            type_tag,
            payload,
            retry_attempts,
            ..
        } = record;

        let task = self.registry.reconstruct(&id, &type_tag, &payload)?;

        let persist = task.should_persist();
        if !persist {
            self.store.delete(&id).await?;
            warn!(%id, %type_tag, "recovered task stopped persisting, record deleted");
            self.pending_changed(&type_tag);
        }

        {
            let _phase = self.admitting(expected)?;
            self.events.emit(EventKind::Recovered {
                id: id.clone(),
                type_tag: type_tag.clone(),
                retry_attempts,
            });
            self.spawn(id.clone(), task, retry_attempts, persist, payload);
        }
        info!(%id, %type_tag, retry_attempts, "task recovered");
        Ok(())
    }
}
