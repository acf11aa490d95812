//! The capability a unit of work implements to take part in durability.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use super::record::{Payload, TaskId};
use crate::error::ReconstructionError;

/// Error returned by an `on_removed` hook. Logged, never propagated.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// A unit of schedulable, potentially durable work.
///
/// `to_payload` and `reconstruct` must be inverses: rebuilding a task from
/// its payload yields a task that serializes to the same payload.
///
/// Implementations are registered by [`Task::TYPE_TAG`] in a
/// [`TaskRegistry`](crate::registry::TaskRegistry) so that recovery can
/// dispatch a stored payload back to the right type.
#[async_trait]
pub trait Task: Send + Sized + 'static {
    /// Stable name of this task type in persisted records.
    const TYPE_TAG: &'static str;

    /// Rebuild an instance from a previously persisted payload.
    ///
    /// Must fail on structurally invalid payloads rather than produce a
    /// partially initialized task.
    fn reconstruct(payload: &Payload) -> Result<Self, ReconstructionError>;

    /// Serialize current state.
    fn to_payload(&self) -> Payload;

    /// Execute the work. An `Err` is an unrecoverable fault for this attempt.
    async fn run(&mut self, ctx: &TaskContext) -> Result<(), ExecutionFailure>;

    /// Queried after `run` returns `Ok`. `false` counts as a failed attempt.
    fn finished_successfully(&self) -> bool;

    /// Opt out of durability. Checked at enqueue, after each failure and
    /// after recovery.
    fn should_persist(&self) -> bool {
        true
    }

    /// Called with the stored payload before a record is deleted out of
    /// band (explicit removal, not completion). No live instance is needed.
    fn on_removed(_payload: &Payload) -> Result<(), HookError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A task plus the identity and retry metadata the queue tracks for it.
pub struct Envelope<T> {
    pub(crate) id: Option<TaskId>,
    pub(crate) retry_attempts: u32,
    pub(crate) task: T,
}

impl<T: Task> Envelope<T> {
    pub fn new(task: T) -> Self {
        Self {
            id: None,
            retry_attempts: 0,
            task,
        }
    }

    /// Use a caller-chosen identifier instead of a generated one.
    pub fn id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn retry_attempts(mut self, n: u32) -> Self {
        self.retry_attempts = n;
        self
    }

    pub fn task(&self) -> &T {
        &self.task
    }
}

impl<T: Task> From<T> for Envelope<T> {
    fn from(task: T) -> Self {
        Envelope::new(task)
    }
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// What a running task can see about itself.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub id: TaskId,
    /// Failed attempts before this one.
    pub retry_attempts: u32,
    cancel: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(id: TaskId, retry_attempts: u32, cancel: CancellationToken) -> Self {
        Self {
            id,
            retry_attempts,
            cancel,
        }
    }

    /// Set once the task has been removed, replaced or the queue shuts down.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// A task's own logic failed. Routed into retry bookkeeping, never
/// surfaced as a queue error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionFailure {
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ExecutionFailure {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ExecutionFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

// ---------------------------------------------------------------------------
// Payload helpers
// ---------------------------------------------------------------------------

/// Read a required field, failing on absence or type mismatch.
pub fn require<V: DeserializeOwned>(payload: &Payload, field: &str) -> Result<V, ReconstructionError> {
    let value = payload
        .get(field)
        .ok_or_else(|| ReconstructionError::MissingField(field.to_string()))?;
    serde_json::from_value(value.clone()).map_err(|e| ReconstructionError::InvalidField {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

/// Read an optional field. Absent or `null` is `None`; a mismatch is an error.
pub fn optional<V: DeserializeOwned>(
    payload: &Payload,
    field: &str,
) -> Result<Option<V>, ReconstructionError> {
    match payload.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(_) => require(payload, field).map(Some),
    }
}

/// Reconstruct a serde-derived task from its payload.
pub fn from_payload<V: DeserializeOwned>(payload: &Payload) -> Result<V, ReconstructionError> {
    serde_json::from_value(serde_json::Value::Object(payload.clone()))
        .map_err(|e| ReconstructionError::Malformed(e.to_string()))
}

/// Serialize a serde-derived task into a payload.
///
/// Types that serialize to anything but a JSON object yield an empty
/// payload, which will then fail reconstruction loudly.
pub fn to_payload<V: Serialize>(value: &V) -> Payload {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => Payload::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Resize {
        image: String,
        width: u32,
    }

    #[test]
    fn require_reports_missing_and_mistyped_fields() {
        let payload = json!({"width": "wide"}).as_object().cloned().unwrap();

        assert_eq!(
            require::<String>(&payload, "image"),
            Err(ReconstructionError::MissingField("image".into()))
        );
        assert!(matches!(
            require::<u32>(&payload, "width"),
            Err(ReconstructionError::InvalidField { field, .. }) if field == "width"
        ));
    }

    #[test]
    fn optional_treats_null_as_absent() {
        let payload = json!({"note": null}).as_object().cloned().unwrap();
        assert_eq!(optional::<String>(&payload, "note"), Ok(None));
        assert_eq!(optional::<String>(&payload, "other"), Ok(None));
    }

    #[test]
    fn serde_payload_helpers_round_trip() {
        let task = Resize {
            image: "cat.png".into(),
            width: 640,
        };
        let payload = to_payload(&task);
        let back: Resize = from_payload(&payload).unwrap();
        assert_eq!(back, task);
        assert_eq!(to_payload(&back), payload);
    }

    #[test]
    fn from_payload_rejects_structural_garbage() {
        let payload = json!({"image": 7}).as_object().cloned().unwrap();
        assert!(matches!(
            from_payload::<Resize>(&payload),
            Err(ReconstructionError::Malformed(_))
        ));
    }
}
