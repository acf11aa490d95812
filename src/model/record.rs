//! Identity and the durable record format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flat serialized form of a task: string keys to JSON values.
pub type Payload = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Process-stable task identifier.
///
/// Callers may pick their own (`"job-1"`); otherwise the queue assigns a
/// UUID before the first durable write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Persistence Record
// ---------------------------------------------------------------------------

/// The durable projection of a task.
///
/// Exists in the store exactly while its task is pending or executing and
/// has opted into persistence. At most one record per identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceRecord {
    pub identifier: TaskId,

    /// Which registered task type rebuilds this payload.
    pub type_tag: String,

    pub payload: Payload,

    /// Failed execution cycles so far. Survives restarts.
    pub retry_attempts: u32,

    #[serde(default)]
    pub finished_successfully: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl PersistenceRecord {
    pub fn new(identifier: TaskId, type_tag: impl Into<String>, payload: Payload) -> Self {
        let now = Utc::now();
        Self {
            identifier,
            type_tag: type_tag.into(),
            payload,
            retry_attempts: 0,
            finished_successfully: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    /// Compact JSON text of the payload. Pattern queries match against this.
    pub fn payload_text(&self) -> String {
        payload_text(&self.payload)
    }

    /// Same type tag, and the payload text contains `pattern` (case-sensitive).
    pub fn matches(&self, type_tag: &str, pattern: Option<&str>) -> bool {
        self.type_tag == type_tag
            && pattern.is_none_or(|p| self.payload_text().contains(p))
    }
}

pub(crate) fn payload_text(payload: &Payload) -> String {
    serde_json::Value::Object(payload.clone()).to_string()
}
