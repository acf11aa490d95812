//! Core data model.
//!
//! A task is a unit of work that may opt into durability. Its durable
//! projection is a [`PersistenceRecord`], addressed by a [`TaskId`] that is
//! stable across process restarts.

pub mod record;
pub mod task;

pub use record::{Payload, PersistenceRecord, TaskId};
pub use task::{Envelope, ExecutionFailure, HookError, Task, TaskContext};
