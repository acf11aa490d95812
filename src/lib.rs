//! # durq
//!
//! Durable in-process task queue. Pending and in-flight work that opts into
//! persistence is written to a store before it runs and recovered on the
//! next start, with its retry count intact.
//!
//! Provides the task capability ([`Task`]), a type registry for
//! reconstruction, durable stores (in-memory, SQLite, Postgres via SQLx),
//! the [`PersistentQueue`] orchestrator over a bounded worker pool, and
//! OpenTelemetry observability.
//!
//! ```no_run
//! # use durq::*;
//! # async fn demo<T: Task>(task: T) -> durq::Result<()> {
//! let store = std::sync::Arc::new(store::MemoryStore::new());
//! let registry = TaskRegistry::new().with::<T>();
//! let queue = PersistentQueue::new(store, registry, QueueConfig::default());
//! queue.recover().await?;
//! let id = queue.enqueue(Envelope::new(task).id("job-1")).await?;
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod executor;
pub mod model;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod store;
pub mod telemetry;

pub use error::{Error, ReconstructionError, Result};
pub use event::{EventKind, QueueEvent};
pub use model::{
    Envelope, ExecutionFailure, HookError, Payload, PersistenceRecord, Task, TaskContext, TaskId,
};
pub use queue::{DuplicatePolicy, PersistentQueue, QueueConfig, RecoveryFailure, RecoveryReport};
pub use registry::TaskRegistry;
pub use retry::RetryPolicy;
pub use store::DurableStore;
