//! # Observability
//!
//! Centralized logging layer for the action relay workspace.
//!
//! Services are **log producers**: they call `observability::init()` once at
//! startup and use standard `tracing` macros everywhere else. Where the logs
//! end up is decided here:
//!
//! - a structured JSONL file (one object per event, append-only, flushed per
//!   line) when `LogConfig::log_path` is set or `init` is used,
//! - a compact human-readable stderr stream when `also_stderr` is set.
//!
//! Fields naming credentials (signatures, signing keys, tokens) are redacted
//! before they reach the JSONL file.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "relay-receiver".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!
//!     tracing::info!("service started");
//! }
//! ```

mod file_writer;
mod json_layer;
mod redact;

use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use file_writer::{default_log_path, CentralLogWriter};
pub use json_layer::{JsonLayer, LogEntry};
pub use redact::{redact_fields, REDACTED};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "relay-receiver").
    /// Included in every JSONL line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// JSONL log file. `None` disables the file layer.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the observability layer with default settings.
///
/// Logs go to the central JSONL file (`~/.action-relay/logs/dev.jsonl`)
/// and to stderr.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        log_path: default_log_path(),
        also_stderr: true,
        ..Default::default()
    });
}

/// Initialize the observability layer with custom configuration.
///
/// Installing a global subscriber twice is a no-op: the second call logs a
/// warning through the already-installed subscriber and returns.
pub fn init_with_config(config: LogConfig) {
    let json_layer = config.log_path.as_ref().and_then(|path| {
        match CentralLogWriter::new(path) {
            Ok(writer) => Some(
                JsonLayer::new(config.service_name.clone(), writer)
                    .with_filter(env_filter(&config.default_level)),
            ),
            Err(e) => {
                eprintln!("failed to open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init();

    match installed {
        Ok(()) => tracing::info!(
            service = %config.service_name,
            log_path = ?config.log_path,
            "observability initialized"
        ),
        Err(e) => tracing::warn!(error = %e, "observability already initialized"),
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// Re-export tracing macros for convenience.
/// Services can use `observability::info!()` or `tracing::info!()`.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
