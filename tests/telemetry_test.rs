//! Integration tests for telemetry initialization and span helpers.

use durq::TaskId;

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    // This may return Err if a global subscriber was already set by
    // another test in this process; that is acceptable.
    let config = durq::telemetry::TelemetryConfig {
        service_name: "durq-test".to_string(),
        log_level: "debug".to_string(),
        ..Default::default()
    };
    if let Ok(guard) = durq::telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn telemetry_config_follows_queue_config() {
    let config = durq::config::Config::from_toml_str(
        "store_url = \"memory:\"\notel_endpoint = \"http://localhost:4317\"\nlog_level = \"warn\"",
    )
    .unwrap();
    let telemetry = durq::telemetry::TelemetryConfig::from(&config);
    assert_eq!(telemetry.endpoint.as_deref(), Some("http://localhost:4317"));
    assert_eq!(telemetry.log_level, "warn");
    assert_eq!(telemetry.service_name, "durq");
}

#[test]
fn task_span_creates_and_records_transition() {
    let id = TaskId::generate();
    let span = durq::telemetry::task::start_task_span("job", &id, 0);
    durq::telemetry::task::record_state_transition(&span, "pending", "executing");
    durq::telemetry::task::record_state_transition(&span, "executing", "succeeded");
}

#[test]
fn metric_instruments_work_without_provider() {
    use opentelemetry::KeyValue;

    durq::telemetry::metrics::tasks_enqueued()
        .add(1, &[KeyValue::new("type_tag", "job"), KeyValue::new("result", "ok")]);
    durq::telemetry::metrics::task_duration_ms().record(1.5, &[KeyValue::new("type_tag", "job")]);
    durq::telemetry::metrics::hook_failures().add(1, &[]);
}
