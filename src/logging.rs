//! # Structured Logging Module
//!
//! Environment-aware structured logging to the console and, when a log directory is
//! configured, to a JSON file for post-mortem analysis of worker crashes and
//! shutdown drains.

use chrono::Utc;
use std::fs;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{ConfigManager, LoggingConfig};
use crate::constants::{Tier, WorkerStatus};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let directive = std::env::var("RUST_LOG")
            .ok()
            .or_else(|| config.level.clone())
            .unwrap_or_else(|| get_log_level(&environment).to_string());

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(EnvFilter::new(&directive));

        let mut log_file = None;
        let file_layer = config.log_dir.as_ref().and_then(|log_dir| {
            if let Err(e) = fs::create_dir_all(log_dir) {
                eprintln!("relay-engine: cannot create log directory {}: {e}", log_dir.display());
                return None;
            }

            let pid = process::id();
            let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
            let file_name = format!("{environment}.{pid}.{timestamp}.log");
            log_file = Some(log_dir.join(&file_name));

            let appender = tracing_appender::rolling::never(log_dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            // The writer flushes on drop of the guard; logging lives for the process
            std::mem::forget(guard);

            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(&directive)),
            )
        });

        if tracing_subscriber::registry()
            .with(console)
            .with(file_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - keeping it");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            filter = %directive,
            log_file = ?log_file,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Default filter directive for an environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log a task lifecycle event
pub fn log_task_operation(
    operation: &str,
    task_id: &str,
    tier: Tier,
    attempt: u32,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_id = %task_id,
        tier = %tier,
        attempt = attempt,
        status = %status,
        details = details,
        "📋 TASK_OPERATION"
    );
}

/// Log a worker lifecycle transition
pub fn log_worker_event(
    worker_id: &str,
    tier: Tier,
    status: WorkerStatus,
    restart_count: u32,
    details: Option<&str>,
) {
    tracing::info!(
        worker_id = %worker_id,
        tier = %tier,
        status = %status,
        restart_count = restart_count,
        details = details,
        "👷 WORKER_EVENT"
    );
}

/// Log an error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        init_structured_logging(&config);
        init_structured_logging(&config);
        log_task_operation("dispatch", "t-1", Tier::Main, 1, "ok", None);
    }
}
