//! Task execution span helpers.
//!
//! Provides span creation and state-transition recording for tasks
//! flowing through the queue.

use tracing::Span;

use crate::model::TaskId;

/// Start a span for one execution attempt.
///
/// The `task.state` field is declared empty and is updated by
/// [`record_state_transition`].
pub fn start_task_span(type_tag: &str, id: &TaskId, retry_attempts: u32) -> Span {
    tracing::info_span!(
        "task.execute",
        "task.type_tag" = type_tag,
        "task.id" = %id,
        "task.retry_attempts" = retry_attempts,
        "task.state" = tracing::field::Empty,
    )
}

/// Record a state transition on the span, as a field and as an event.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("task.state", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
