//! Task type registry.
//!
//! Maps each task's type tag to its reconstruction factory and removal
//! hook. Populated explicitly at startup; recovery, `resume` and removal of
//! records without a live instance all dispatch through it.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use crate::error::{Error, ReconstructionError, Result};
use crate::model::{ExecutionFailure, HookError, Payload, Task, TaskContext, TaskId};

/// Type-erased view of a [`Task`] so the queue can hold any of them.
#[async_trait]
pub(crate) trait DynTask: Send {
    fn type_tag(&self) -> &'static str;
    fn to_payload(&self) -> Payload;
    fn should_persist(&self) -> bool;
    fn finished_successfully(&self) -> bool;
    async fn run(&mut self, ctx: &TaskContext) -> std::result::Result<(), ExecutionFailure>;
}

#[async_trait]
impl<T: Task> DynTask for T {
    fn type_tag(&self) -> &'static str {
        T::TYPE_TAG
    }

    fn to_payload(&self) -> Payload {
        <T as Task>::to_payload(self)
    }

    fn should_persist(&self) -> bool {
        <T as Task>::should_persist(self)
    }

    fn finished_successfully(&self) -> bool {
        <T as Task>::finished_successfully(self)
    }

    async fn run(&mut self, ctx: &TaskContext) -> std::result::Result<(), ExecutionFailure> {
        <T as Task>::run(self, ctx).await
    }
}

type ReconstructFn = fn(&Payload) -> std::result::Result<Box<dyn DynTask>, ReconstructionError>;
type RemovedFn = fn(&Payload) -> std::result::Result<(), HookError>;

struct Entry {
    reconstruct: ReconstructFn,
    on_removed: RemovedFn,
}

fn reconstruct_erased<T: Task>(
    payload: &Payload,
) -> std::result::Result<Box<dyn DynTask>, ReconstructionError> {
    T::reconstruct(payload).map(|task| Box::new(task) as Box<dyn DynTask>)
}

/// Registry of task types, indexed by type tag.
#[derive(Default)]
pub struct TaskRegistry {
    entries: HashMap<&'static str, Entry>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task type under its `TYPE_TAG`. Re-registering replaces.
    pub fn register<T: Task>(&mut self) -> &mut Self {
        self.entries.insert(
            T::TYPE_TAG,
            Entry {
                reconstruct: reconstruct_erased::<T>,
                on_removed: T::on_removed,
            },
        );
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<T: Task>(mut self) -> Self {
        self.register::<T>();
        self
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.entries.contains_key(type_tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rebuild a live task from a stored payload.
    pub(crate) fn reconstruct(
        &self,
        id: &TaskId,
        type_tag: &str,
        payload: &Payload,
    ) -> Result<Box<dyn DynTask>> {
        let entry = self
            .entries
            .get(type_tag)
            .ok_or_else(|| Error::UnregisteredType(type_tag.to_string()))?;
        (entry.reconstruct)(payload).map_err(|source| Error::Reconstruction {
            id: id.clone(),
            type_tag: type_tag.to_string(),
            source,
        })
    }

    /// Run the type's removal hook.
    ///
    /// Returns `None` when the type is not registered.
    pub(crate) fn notify_removed(
        &self,
        type_tag: &str,
        payload: &Payload,
    ) -> Option<std::result::Result<(), HookError>> {
        self.entries
            .get(type_tag)
            .map(|entry| (entry.on_removed)(payload))
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("type_tags", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
