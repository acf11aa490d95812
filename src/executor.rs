//! Bounded worker pool: the executing primitive under the queue.
//!
//! Exposes `submit(job) -> handle`, `cancel(handle)` and a completion
//! notification. Jobs are tracked so shutdown can drain them. Concurrency
//! is bounded per attempt: a job holds a permit only while it executes,
//! not while it sleeps between retries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Handle to a submitted job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

impl JobHandle {
    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    /// Resolves once the job has returned (or panicked).
    pub async fn finished(&self) {
        let mut done = self.done.clone();
        // A dropped sender means the job is gone too.
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// [`finished`](Self::finished) bounded by `timeout`. Returns whether
    /// the job finished in time.
    pub async fn finished_within(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.finished()).await.is_ok()
    }
}

pub struct WorkerPool {
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_workers.max(1))),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Spawn a job. The job receives its own cancellation token, which is
    /// also cancelled when the pool shuts down.
    pub fn submit<F, Fut>(&self, job: F) -> JobHandle
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.shutdown.child_token();
        let (done_tx, done_rx) = watch::channel(false);
        let fut = job(cancel.clone());
        self.tracker.spawn(async move {
            fut.await;
            let _ = done_tx.send(true);
        });
        JobHandle {
            cancel,
            done: done_rx,
        }
    }

    /// Wait for a free worker slot. `None` if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        }
    }

    /// Jobs submitted and not yet returned.
    pub fn jobs(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancel every job and wait for all of them to return.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn completion_is_observable() {
        let pool = WorkerPool::new(2);
        let handle = pool.submit(|_| async {});
        assert!(handle.finished_within(Duration::from_secs(1)).await);
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn cancel_reaches_the_job() {
        let pool = WorkerPool::new(1);
        let handle = pool.submit(|cancel| async move { cancel.cancelled().await });
        assert!(!handle.finished_within(Duration::from_millis(20)).await);
        handle.cancel();
        assert!(handle.finished_within(Duration::from_secs(1)).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn permits_bound_concurrency() {
        let pool = Arc::new(WorkerPool::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let pool_ref = Arc::clone(&pool);
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                pool.submit(move |cancel| async move {
                    let Some(_permit) = pool_ref.acquire(&cancel).await else {
                        return;
                    };
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in &handles {
            assert!(handle.finished_within(Duration::from_secs(5)).await);
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn shutdown_cancels_and_drains() {
        let pool = WorkerPool::new(1);
        let handle = pool.submit(|cancel| async move { cancel.cancelled().await });
        pool.shutdown().await;
        assert!(handle.is_finished());
        assert!(pool.is_shut_down());
        assert_eq!(pool.jobs(), 0);
    }
}
