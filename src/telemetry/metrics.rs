//! Metric instrument factories for durq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"durq"` meter. Without a
//! provider installed they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for durq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("durq")
}

/// Counter: enqueue calls.
/// Labels: `type_tag`, `result` ("ok" | "duplicate" | "error").
pub fn tasks_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("durq.tasks.enqueued")
        .with_description("Number of tasks enqueued")
        .build()
}

/// Counter: finished attempts.
/// Labels: `type_tag`, `outcome` ("succeeded" | "failed" | "panicked" | "exhausted").
pub fn task_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("durq.tasks.outcomes")
        .with_description("Number of task execution outcomes")
        .build()
}

/// Counter: durable store calls.
/// Labels: `backend`, `operation`.
pub fn store_operations() -> Counter<u64> {
    meter()
        .u64_counter("durq.store.operations")
        .with_description("Number of durable store operations")
        .build()
}

/// Counter: records visited by recovery.
/// Labels: `result` ("recovered" | "failed").
pub fn recovery_records() -> Counter<u64> {
    meter()
        .u64_counter("durq.recovery.records")
        .with_description("Number of records processed by recovery")
        .build()
}

/// Counter: explicit removals.
/// Labels: `type_tag`.
pub fn tasks_removed() -> Counter<u64> {
    meter()
        .u64_counter("durq.tasks.removed")
        .with_description("Number of tasks removed out of band")
        .build()
}

/// Counter: `on_removed` hooks that returned an error.
/// Labels: `type_tag`.
pub fn hook_failures() -> Counter<u64> {
    meter()
        .u64_counter("durq.hooks.failures")
        .with_description("Number of failed removal hooks")
        .build()
}

/// Histogram: attempt duration in milliseconds.
/// Labels: `type_tag`.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("durq.task.duration_ms")
        .with_description("Task attempt duration in milliseconds")
        .with_unit("ms")
        .build()
}
