//! # Observability
//!
//! Logging initialisation shared by the Beacon binaries.
//!
//! Libraries in the workspace only emit `tracing` events; they never install a
//! subscriber. A binary calls [`init`] or [`init_with_config`] once at startup.
//!
//! Two sinks are available:
//! - a JSON-lines file (one object per event), enabled by setting
//!   [`LogConfig::log_path`]
//! - compact human-readable output on stderr
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "beacon".into(),
//!     default_level: "debug".into(),
//!     log_path: Some(paths.log_file()),
//!     also_stderr: true,
//! });
//! tracing::info!("ready");
//! ```

mod file;
mod json_layer;

pub use file::LogFileWriter;
pub use json_layer::{JsonLinesLayer, LogLine};

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, written into every JSON line.
    pub service_name: String,

    /// Default filter directive (e.g. "info", "beacon_outbox=debug").
    /// `RUST_LOG` takes precedence when set.
    pub default_level: String,

    /// JSON-lines log file. `None` disables the file sink.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialise logging to stderr only, at `info`.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialise logging with explicit configuration.
///
/// Safe to call more than once; only the first call installs a subscriber.
/// A log file that cannot be opened is reported on stderr and skipped.
pub fn init_with_config(config: LogConfig) {
    let file_layer = config.log_path.as_ref().and_then(|path| {
        match LogFileWriter::open(path) {
            Ok(writer) => Some(
                JsonLinesLayer::new(config.service_name.clone(), writer)
                    .with_filter(env_filter(&config.default_level)),
            ),
            Err(e) => {
                eprintln!("observability: cannot open {}: {}", path.display(), e);
                None
            }
        }
    });

    let stderr_layer = if config.also_stderr || file_layer.is_none() {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .compact()
                .with_writer(io::stderr)
                .with_filter(env_filter(&config.default_level)),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            service = %config.service_name,
            log_path = ?config.log_path,
            "observability initialized"
        );
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Parse a log level string, falling back to INFO for unknown input.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_ascii_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

pub use tracing::{debug, error, info, trace, warn, Level};
