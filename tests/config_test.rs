//! Configuration file to running registry, including live reload from disk.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use observer_core::builtin::builtin_catalog;
use observer_core::collectors::create_collector;
use observer_core::config::ConfigManager;
use observer_core::constants::{observers, system, HealthState};
use observer_core::health::MemoryHealthReporter;
use observer_core::orchestration::{EngineContext, ObserverManager};

const AGENT_TOML: &str = r#"
[manager]
node_name = "node-under-test"
loop_sleep_seconds = 10
execution_timeout_seconds = 120

[observers.cpu-check]
execution_timeout_seconds = 15

[observers.cpu-check.parameters]
cpu_percent_warning = "80"
cpu_percent_error = "95"

[observers.disk-check]
run_interval_seconds = 300

[observers.disk-check.parameters]
disk_space_percent_warning = "85"
disk_space_percent_error = "95"

[observers.unknown-check]
enabled = true
"#;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

fn rewrite(file: &tempfile::NamedTempFile, contents: &str) {
    std::fs::write(file.path(), contents).expect("rewrite temp config");
}

fn build(config: &ConfigManager) -> (ObserverManager, Arc<MemoryHealthReporter>) {
    let reporter = Arc::new(MemoryHealthReporter::new());
    let context = EngineContext::builder(config.config().manager.clone())
        .health_reporter(reporter.clone())
        .catalog(builtin_catalog(create_collector()))
        .build();
    let manager = ObserverManager::new(context, &config.config().snapshot())
        .expect("builtin observers register");
    (manager, reporter)
}

#[test]
fn test_file_sections_drive_registration() {
    let file = write_config(AGENT_TOML);
    let config = ConfigManager::load_from_path_with_env(Some(file.path().to_path_buf()), "test")
        .expect("config should load");
    let (manager, _) = build(&config);

    let status = manager.status();
    assert_eq!(status.node_name, "node-under-test");

    // Catalog order, only configured observers, unknown sections ignored
    let names: Vec<&str> = status.observers.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec![observers::DISK_CHECK, observers::CPU_CHECK]);

    let disk = &status.observers[0];
    assert_eq!(disk.execution_timeout, Duration::from_secs(120));
    assert_eq!(disk.run_interval_minimum, Duration::from_secs(300));

    let cpu = &status.observers[1];
    assert_eq!(cpu.execution_timeout, Duration::from_secs(15));
}

#[test]
fn test_bad_thresholds_fail_startup() {
    let file = write_config(
        r#"
[manager]
node_name = "node-under-test"

[observers.memory-check.parameters]
memory_percent_warning = "95"
memory_percent_error = "80"
"#,
    );
    let config = ConfigManager::load_from_path_with_env(Some(file.path().to_path_buf()), "test")
        .expect("file itself is well formed");

    let context = EngineContext::builder(config.config().manager.clone())
        .catalog(builtin_catalog(create_collector()))
        .build();
    assert!(ObserverManager::new(context, &config.config().snapshot()).is_err());
}

#[tokio::test]
async fn test_reload_from_rewritten_file() {
    let file = write_config(AGENT_TOML);
    let config = ConfigManager::load_from_path_with_env(Some(file.path().to_path_buf()), "test")
        .expect("config should load");
    let (manager, reporter) = build(&config);
    let coordinator = manager.reload_coordinator();

    rewrite(
        &file,
        r#"
[manager]
node_name = "node-under-test"

[observers.cpu-check.parameters]
cpu_percent_warning = "70"

[observers.memory-check.parameters]
memory_percent_error = "90"
"#,
    );
    let snapshot = config.reload_snapshot().expect("reload should parse");
    let summary = coordinator.apply(snapshot).await.expect("reload should apply");

    assert_eq!(summary.updated, vec![observers::CPU_CHECK.to_string()]);
    assert_eq!(summary.added, vec![observers::MEMORY_CHECK.to_string()]);
    assert_eq!(summary.deactivated, vec![observers::DISK_CHECK.to_string()]);

    // Inverted thresholds are rejected and nothing changes
    rewrite(
        &file,
        r#"
[observers.cpu-check.parameters]
cpu_percent_warning = "99"
cpu_percent_error = "50"
"#,
    );
    let snapshot = config.reload_snapshot().expect("reload should parse");
    assert!(coordinator.apply(snapshot).await.is_err());
    assert_eq!(manager.status().reload_generation, 1);

    let errors = reporter.reports_with_property(system::CONFIGURATION_ERROR_PROPERTY);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].state, HealthState::Warning);
    assert!(errors[0].message.contains("cpu_percent_warning"));
}

#[test]
fn test_reload_of_missing_file_is_an_error() {
    let file = write_config(AGENT_TOML);
    let path = file.path().to_path_buf();
    let config =
        ConfigManager::load_from_path_with_env(Some(path), "test").expect("config should load");
    drop(file);

    assert!(config.reload_snapshot().is_err());
}
