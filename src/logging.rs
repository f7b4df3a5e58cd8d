//! # Structured Logging Module
//!
//! Environment-aware console logging using the tracing ecosystem. Logs go to
//! stdout so the agent behaves well under systemd and in containers.
//!
//! This module provides:
//! - One-shot subscriber initialisation with environment-based levels
//! - Optional JSON output (`OBSERVER_LOG_FORMAT=json`)
//! - Domain-specific structured logging helpers
//! - The [`TelemetrySink`] seam the engine uses for fire-and-forget notices

use chrono::Utc;
use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize console tracing with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber and
/// an already-installed global subscriber is left untouched.
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json_output = use_json_format();
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let result = if json_output {
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(EnvFilter::new(&log_level));
            tracing_subscriber::registry().with(layer).try_init()
        } else {
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(EnvFilter::new(&log_level));
            tracing_subscriber::registry().with(layer).try_init()
        };

        if result.is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                log_level = %log_level,
                json_output = json_output,
                ansi_colors = use_ansi,
                "🔧 LOGGING: Console tracing initialized"
            );
        }
    });
}

fn get_environment() -> String {
    std::env::var("OBSERVER_ENV").unwrap_or_else(|_| "development".to_string())
}

/// Log level from `RUST_LOG`, falling back to environment defaults
fn get_log_level(environment: &str) -> String {
    if let Ok(level) = std::env::var("RUST_LOG") {
        return level.to_lowercase();
    }

    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "info".to_string(),
    }
}

fn use_json_format() -> bool {
    std::env::var("OBSERVER_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log structured data for a single observer invocation
pub fn log_observer_operation(
    operation: &str,
    observer: &str,
    run_id: Option<u64>,
    status: &str,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        observer = %observer,
        run_id = run_id,
        status = %status,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔭 OBSERVER_OPERATION"
    );
}

/// Log structured data for manager-level events (passes, reloads, shutdown)
pub fn log_manager_operation(
    operation: &str,
    epoch: Option<u64>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        epoch = epoch,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🗂️ MANAGER_OPERATION"
    );
}

/// Fire-and-forget log channel used by the engine for operator-facing notices.
///
/// Implementations must never block and must swallow their own failures.
pub trait TelemetrySink: Send + Sync {
    fn log_info(&self, message: &str);
    fn log_warning(&self, message: &str);
    fn log_error(&self, message: &str);
}

/// [`TelemetrySink`] that forwards to the global tracing subscriber
#[derive(Debug, Clone, Default)]
pub struct TracingTelemetrySink {
    source: String,
}

impl TracingTelemetrySink {
    pub fn new<S: Into<String>>(source: S) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl TelemetrySink for TracingTelemetrySink {
    fn log_info(&self, message: &str) {
        tracing::info!(source = %self.source, "{}", message);
    }

    fn log_warning(&self, message: &str) {
        tracing::warn!(source = %self.source, "{}", message);
    }

    fn log_error(&self, message: &str) {
        tracing::error!(source = %self.source, "{}", message);
    }
}
