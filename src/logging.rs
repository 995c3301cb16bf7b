//! # Structured Logging Module
//!
//! Two layers live here:
//!
//! - [`init_structured_logging`] installs a process-wide `tracing` subscriber with
//!   an environment-derived level, console output and optional JSON formatting.
//! - [`Logger`] is the injectable sink a schema reports secondary-path failures
//!   to. It is fire-and-forget: implementations must never panic into the
//!   dispatch path. [`NoopLogger`] is the default, [`TracingLogger`] forwards to
//!   `tracing`.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::constants::current_environment;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Logging capability handed to a schema
///
/// Mirrors the `log` / `info` / `error` triple callers already provide. The
/// `detail` passed to [`Logger::error`] is either the error's display form or
/// its full debug chain, depending on the schema's `hide_error_trace` setting.
pub trait Logger: Send + Sync {
    fn log(&self, message: &str);

    fn info(&self, message: &str);

    fn error(&self, message: &str, detail: &str);
}

/// Logger that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _message: &str) {}

    fn info(&self, _message: &str) {}

    fn error(&self, _message: &str, _detail: &str) {}
}

/// Logger that forwards to the `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, message: &str) {
        tracing::debug!(target: "dualwrite", "{}", message);
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "dualwrite", "{}", message);
    }

    fn error(&self, message: &str, detail: &str) {
        tracing::error!(target: "dualwrite", detail = %detail, "{}", message);
    }
}

/// Initialize structured logging with environment-specific configuration
///
/// Safe to call more than once; only the first call installs a subscriber, and
/// an already-installed global subscriber (e.g. from a host application) is left
/// in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = current_environment();
        let filter = std::env::var("RUST_LOG")
            .map(EnvFilter::new)
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let json = matches!(
            std::env::var("DUALWRITE_LOG_FORMAT").as_deref(),
            Ok("json")
        );

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(filter)
                .boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "Structured logging initialized"
        );
    });
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}
