use std::time::Duration;

use durq::config::Config;
use durq::config::secrets::ExposeSecret;
use durq::{DuplicatePolicy, Error};

// Environment variables are process-global; every env-driven case lives in
// this one test so they cannot race each other.
#[test]
fn config_from_env() {
    unsafe {
        std::env::remove_var("DURQ_STORE_URL");
    }
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    unsafe {
        std::env::set_var("DURQ_STORE_URL", "sqlite://durq-test.db");
        std::env::set_var("DURQ_MAX_WORKERS", "8");
        std::env::set_var("DURQ_MAX_RETRIES", "5");
        std::env::set_var("DURQ_RETRY_INITIAL_MS", "250");
        std::env::set_var("DURQ_DUPLICATE_POLICY", "reject");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.store_url.expose_secret(), "sqlite://durq-test.db");
    assert_eq!(config.max_workers, 8);
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry.initial_interval, Duration::from_millis(250));
    assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
    assert!(!config.log_level.is_empty());
    // No .env in the crate root: load falls through to the environment.
    assert_eq!(Config::load().unwrap().max_workers, 8);

    unsafe {
        std::env::set_var("DURQ_MAX_WORKERS", "many");
    }
    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("DURQ_MAX_WORKERS"));

    unsafe {
        for name in [
            "DURQ_STORE_URL",
            "DURQ_MAX_WORKERS",
            "DURQ_MAX_RETRIES",
            "DURQ_RETRY_INITIAL_MS",
            "DURQ_DUPLICATE_POLICY",
        ] {
            std::env::remove_var(name);
        }
    }
}

#[test]
fn config_from_toml_applies_defaults() {
    let config = Config::from_toml_str(
        r#"
        store_url = "memory:"
        duplicate_policy = "reject"

        [retry]
        max_retries = 1
        "#,
    )
    .unwrap();

    assert_eq!(config.store_url.expose_secret(), "memory:");
    assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
    assert_eq!(config.retry.max_retries, 1);
    assert_eq!(config.retry.initial_interval, Duration::from_secs(1));
    assert_eq!(config.log_level, "info");
    assert!(config.otel_endpoint.is_none());

    let queue = config.queue_config();
    assert_eq!(queue.duplicate_policy, DuplicatePolicy::Reject);
    assert_eq!(queue.cancel_grace, Duration::from_millis(config.cancel_grace_ms));
}

#[test]
fn config_from_toml_rejects_unknown_keys() {
    let err = Config::from_toml_str("store_url = \"memory:\"\nworkers = 3").unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn config_debug_redacts_store_url() {
    let config =
        Config::from_toml_str("store_url = \"postgres://durq:hunter2@db/durq\"").unwrap();
    assert!(!format!("{config:?}").contains("hunter2"));
}

#[test]
fn config_from_missing_file_is_io_error() {
    let err = Config::from_file("/nonexistent/durq.toml").unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn config_from_invalid_file_names_the_file_once() {
    let path = std::env::temp_dir().join(format!("durq-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, "store_url = \"memory:\"\nmax_workers = \"many\"").unwrap();

    let err = Config::from_file(&path).unwrap_err();
    let message = err.to_string();
    let _ = std::fs::remove_file(&path);

    assert!(matches!(err, Error::Config(_)));
    assert!(message.contains(&path.display().to_string()));
    assert_eq!(message.matches("config error").count(), 1);
}

#[tokio::test]
async fn queue_from_config_opens_store() {
    let config = Config::from_toml_str("store_url = \"memory:\"\nmax_workers = 2").unwrap();
    let queue = durq::PersistentQueue::from_config(&config, durq::TaskRegistry::new())
        .await
        .unwrap();
    assert_eq!(queue.config().max_workers, 2);
    assert!(queue.recover().await.unwrap().is_clean());
}
